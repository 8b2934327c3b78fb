mod config;
mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use murmur_api::auth::Authenticator;
use murmur_api::lifecycle::{LifecycleConfig, MessageService};
use murmur_api::state::{AppState, AppStateInner};
use murmur_db::Database;
use murmur_storage::{LocalBlobStore, UrlSigner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    // Repository and blob store are built once here and injected.
    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = Arc::new(
        LocalBlobStore::new(
            config.blob_dir.clone(),
            &config.public_url,
            UrlSigner::new(&config.blob_secret),
        )
        .await?,
    );

    let state: AppState = Arc::new(AppStateInner {
        auth: Authenticator::new(db.clone(), config.jwt_secret.clone(), config.call_timeout),
        messages: MessageService::new(
            db,
            blobs.clone(),
            LifecycleConfig {
                call_timeout: config.call_timeout,
                playback_ttl: config.playback_ttl,
            },
        ),
    });

    for (handle, password) in &config.moderators {
        state
            .auth
            .seed_moderator(handle, password)
            .await
            .map_err(|e| anyhow::anyhow!("seeding moderator {}: {}", handle, e))?;
    }

    if !config.sweep_interval.is_zero() {
        tokio::spawn(sweeper::run_sweep_loop(
            state.clone(),
            config.sweep_interval,
            config.sweep_grace,
        ));
    }

    let app = murmur_api::router(state, blobs)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Murmur server listening on {}", addr);
    info!("Playback URLs valid for {}s, served from {}", config.playback_ttl.as_secs(), config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
