//! Route definitions for run control.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// POST /           -> start_run
/// POST /stop       -> stop_run
/// GET  /current    -> current_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(runs::start_run))
        .route("/stop", post(runs::stop_run))
        .route("/current", get(runs::current_run))
}
