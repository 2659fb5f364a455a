//! services/api/src/web/middleware.rs
//!
//! Token middleware guarding the admin route group.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// The header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Middleware that admits only admins.
///
/// When `ADMIN_TOKEN` is configured the request must carry it in `x-admin-token`;
/// without one every caller is treated as an admin (single-device deployments).
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(expected) = state.config.admin_token.as_deref() {
        let provided = req
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!("Rejected admin request to {}", req.uri().path());
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(next.run(req).await)
}
