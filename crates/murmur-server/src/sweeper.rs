use std::time::Duration;

use tracing::{info, warn};

use murmur_api::state::AppState;

/// Background task that reclaims blobs no message references.
///
/// Such blobs come from a response that lost a race, or from cleanup that
/// failed or timed out. Anything younger than `grace` is left alone.
pub async fn run_sweep_loop(state: AppState, interval: Duration, grace: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match state.messages.sweep_orphans(grace).await {
            Ok(count) if count > 0 => info!("Sweep: released {} orphaned blobs", count),
            Ok(_) => {}
            Err(e) => warn!("Sweep error: {}", e),
        }
    }
}
