pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_admin;
pub use state::AppState;
pub use ws_handler::ws_handler;

use rest::*;

/// Builds the API router. The binary layers CORS and Swagger UI on top; tests
/// drive this router directly.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Roster views and self check-in (no token required)
    let public_routes = Router::new()
        .route("/rosters/{roster_id}/members", get(list_members_handler))
        .route(
            "/rosters/{roster_id}/sessions/{date}/{slot}",
            get(get_session_handler),
        )
        .route("/rosters/{roster_id}/checkin", post(check_in_handler))
        .route(
            "/rosters/{roster_id}/checkin/cancel",
            post(cancel_check_in_handler),
        )
        .route(
            "/rosters/{roster_id}/checkin/register",
            post(register_handler),
        )
        .route("/checkin-context", get(checkin_context_handler))
        .route("/rosters/{roster_id}/ws", get(ws_handler));

    // Administrative editing and reporting
    let admin_routes = Router::new()
        .route("/rosters/{roster_id}/members", post(add_member_handler))
        .route(
            "/rosters/{roster_id}/members/{member_id}",
            delete(remove_member_handler),
        )
        .route(
            "/rosters/{roster_id}/sessions/{date}/{slot}/toggle",
            post(toggle_presence_handler),
        )
        .route(
            "/rosters/{roster_id}/sessions/{date}/{slot}/reset",
            post(reset_session_handler),
        )
        .route(
            "/rosters/{roster_id}/sessions/{date}/{slot}/ingest",
            post(ingest_handler),
        )
        .route("/rosters/{roster_id}/reports/{month}", get(report_handler))
        .route("/rosters/{roster_id}/links", get(links_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_admin,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(app_state)
}
