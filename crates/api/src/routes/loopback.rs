//! Ingestion endpoints called by driver processes on the same host.

use axum::routing::post;
use axum::Router;

use crate::handlers::loopback;
use crate::state::AppState;

/// ```text
/// POST /log-step        -> log_step
/// POST /module-status   -> module_status
/// POST /metric          -> metric
/// POST /run-complete    -> run_complete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/log-step", post(loopback::log_step))
        .route("/module-status", post(loopback::module_status))
        .route("/metric", post(loopback::metric))
        .route("/run-complete", post(loopback::run_complete))
}
