//! Handlers for starting, stopping and inspecting test runs.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use testdeck_core::catalog::ModuleSelection;
use testdeck_core::run::RunResult;
use testdeck_core::status::Severity;
use testdeck_core::types::RunId;
use testdeck_events::RunEvent;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /runs`.
#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    /// File name of a stored artifact.
    pub artifact_name: String,
    /// Modules to run, in order. Absent or empty runs the default list.
    #[serde(default)]
    pub tests_to_run: Option<Vec<ModuleSelection>>,
}

/// A run that has been accepted and is executing in the background.
#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub artifact_path: String,
    pub modules: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// `"stopped"` or `"no-process"`.
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CurrentRun {
    pub running: bool,
    pub latest: Option<RunResult>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/runs
///
/// Validates the request, claims the run slot, and executes the run on a
/// background task. Responds 202 before any module starts.
pub async fn start_run(
    State(state): State<AppState>,
    Json(input): Json<StartRunRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<RunAccepted>>)> {
    if input.artifact_name.trim().is_empty() {
        return Err(AppError::BadRequest("artifact_name is required".to_string()));
    }

    let artifact = state.artifacts.resolve(&input.artifact_name)?;
    let modules = state.catalog.specs(input.tests_to_run.as_deref())?;
    let prepared = state.orchestrator.prepare(&artifact, modules).await?;

    let accepted = RunAccepted {
        run_id: prepared.run_id(),
        artifact_path: prepared.artifact_path().display().to_string(),
        modules: prepared
            .modules()
            .iter()
            .map(|m| m.name().to_string())
            .collect(),
    };

    tracing::info!(
        run_id = %accepted.run_id,
        artifact = %input.artifact_name,
        modules = ?accepted.modules,
        "Run accepted",
    );

    tokio::spawn(async move {
        let result = prepared.execute().await;
        tracing::debug!(run_id = %result.run_id, outcome = ?result.overall_outcome, "Background run finished");
    });

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// POST /api/v1/runs/stop
///
/// Stops the active module process, if any.
pub async fn stop_run(State(state): State<AppState>) -> Json<DataResponse<StopResponse>> {
    let stopped = state.orchestrator.request_stop();
    if stopped {
        state.event_bus.publish(RunEvent::log(
            "Backend: test process stopped on user request.",
            Severity::Failed,
        ));
    }

    Json(DataResponse {
        data: StopResponse {
            status: if stopped { "stopped" } else { "no-process" },
        },
    })
}

/// GET /api/v1/runs/current
pub async fn current_run(State(state): State<AppState>) -> Json<DataResponse<CurrentRun>> {
    Json(DataResponse {
        data: CurrentRun {
            running: state.orchestrator.is_running(),
            latest: state.orchestrator.latest_result(),
        },
    })
}
