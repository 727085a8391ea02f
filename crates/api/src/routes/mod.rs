pub mod artifacts;
pub mod health;
pub mod loopback;
pub mod runs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                  WebSocket (run events)
///
/// /runs                                start a run (POST)
/// /runs/stop                           stop the current run (POST)
/// /runs/current                        run status + latest result (GET)
///
/// /artifacts                           stored artifacts (GET)
/// /device-status                       device presence check (GET)
///
/// /log-step                            driver log line (POST)
/// /module-status                       driver module status (POST)
/// /metric                              device metrics (POST)
/// /run-complete                        report ready (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        // Run control
        .nest("/runs", runs::router())
        // Artifacts and device
        .merge(artifacts::router())
        // Loopback ingestion from driver processes
        .merge(loopback::router())
}
