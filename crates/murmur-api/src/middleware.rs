use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ServiceError;
use crate::state::AppState;

/// Extract and validate the bearer token, then expose its claims to the
/// handler as an `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ServiceError::Unauthorized)?;

    let claims = state.auth.verify_token(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
