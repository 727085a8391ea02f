use axum::routing::get;
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// ```text
/// GET /artifacts       -> list_artifacts
/// GET /device-status   -> device_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/artifacts", get(artifacts::list_artifacts))
        .route("/device-status", get(artifacts::device_status))
}
