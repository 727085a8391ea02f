//! Handlers for stored artifacts and the device check.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use testdeck_core::device::{device_connected, DEFAULT_PROBE_TIMEOUT};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
}

/// GET /api/v1/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let names = state.artifacts.list().await?;
    Ok(Json(DataResponse { data: names }))
}

/// GET /api/v1/device-status
///
/// Whether at least one device is attached and ready. Probe failures
/// report `connected: false`.
pub async fn device_status(State(state): State<AppState>) -> Json<DataResponse<DeviceStatus>> {
    let connected = device_connected(&state.config.adb_command, DEFAULT_PROBE_TIMEOUT).await;
    Json(DataResponse {
        data: DeviceStatus { connected },
    })
}
