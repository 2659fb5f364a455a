//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use attendance_core::{AttendanceRepository, Clock, Reconciler, RosterId};
use axum::http::StatusCode;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn AttendanceRepository>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Binds the reconciliation service to the roster named in the request path.
    pub fn reconciler(&self, roster_id: &str) -> Result<Reconciler, (StatusCode, String)> {
        let roster = RosterId::new(roster_id)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        Ok(Reconciler::new(roster, self.repo.clone(), self.clock.clone()))
    }
}
