//! Handlers the driver process calls to publish step-level detail.
//!
//! Each request is republished verbatim on the event bus.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use testdeck_core::status::{ModuleStatus, Severity};
use testdeck_events::RunEvent;

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogStep {
    pub message: String,
    #[serde(default)]
    pub status: Severity,
}

#[derive(Debug, Deserialize)]
pub struct ModuleStatusUpdate {
    pub module: String,
    pub status: ModuleStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RunComplete {
    pub report_url: String,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

fn ack() -> Json<DataResponse<Ack>> {
    Json(DataResponse {
        data: Ack { status: "ok" },
    })
}

/// POST /api/v1/log-step
pub async fn log_step(
    State(state): State<AppState>,
    Json(input): Json<LogStep>,
) -> Json<DataResponse<Ack>> {
    state.event_bus.publish(RunEvent::log(input.message, input.status));
    ack()
}

/// POST /api/v1/module-status
pub async fn module_status(
    State(state): State<AppState>,
    Json(input): Json<ModuleStatusUpdate>,
) -> Json<DataResponse<Ack>> {
    state
        .event_bus
        .publish(RunEvent::module(input.module, input.status, input.message));
    ack()
}

/// POST /api/v1/metric
pub async fn metric(
    State(state): State<AppState>,
    Json(input): Json<serde_json::Value>,
) -> Json<DataResponse<Ack>> {
    state.event_bus.publish(RunEvent::Metric(input));
    ack()
}

/// POST /api/v1/run-complete
///
/// Lets an externally driven run announce its report.
pub async fn run_complete(
    State(state): State<AppState>,
    Json(input): Json<RunComplete>,
) -> Json<DataResponse<Ack>> {
    state.event_bus.publish(RunEvent::RunComplete {
        report_url: input.report_url,
    });
    ack()
}
