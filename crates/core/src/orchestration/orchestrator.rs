//! Run entry point: validate, sequence, aggregate, report.
//!
//! A run is split in two so callers can answer a request before the
//! modules execute: [`RunOrchestrator::prepare`] does every check that can
//! fail and claims the single run slot; [`PreparedRun::execute`] runs to
//! completion and always produces a [`RunResult`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::command::CommandContext;
use super::process::{ProcessRunner, DEFAULT_STOP_GRACE};
use super::report::ReportGenerator;
use super::results_area::ResultsArea;
use super::sequencer::ModuleSequencer;
use super::state::{RunGuard, RunState};
use crate::error::CoreError;
use crate::module::ModuleSpec;
use crate::run::{OverallOutcome, RunResult};
use crate::status::{Severity, StatusReporter};
use crate::types::RunId;

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("A test run is already in progress")]
    AlreadyInProgress,

    #[error("Invalid module list: {0}")]
    InvalidModules(String),
}

impl From<RunError> for CoreError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::ArtifactNotFound(path) => CoreError::NotFound {
                entity: "Artifact",
                id: path.display().to_string(),
            },
            RunError::AlreadyInProgress => {
                CoreError::Conflict("A test run is already in progress".to_string())
            }
            RunError::InvalidModules(msg) => CoreError::Validation(msg),
        }
    }
}

/// Static settings for a [`RunOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Shared accumulation directory handed to modules as `{results}`.
    pub results_dir: PathBuf,
    /// Directory module processes run in; relative executables and scripts
    /// resolve against it.
    pub working_directory: Option<PathBuf>,
    /// Grace period between terminate and kill on stop.
    pub stop_grace: Duration,
}

impl OrchestratorConfig {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            working_directory: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Coordinates test runs. Cheap to clone; clones share one [`RunState`].
#[derive(Clone)]
pub struct RunOrchestrator {
    state: Arc<RunState>,
    runner: ProcessRunner,
    results: ResultsArea,
    reporter: Arc<dyn StatusReporter>,
    reports: Arc<dyn ReportGenerator>,
    latest: Arc<Mutex<Option<RunResult>>>,
}

impl RunOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        reporter: Arc<dyn StatusReporter>,
        reports: Arc<dyn ReportGenerator>,
    ) -> Self {
        let state = Arc::new(RunState::new());
        let mut runner = ProcessRunner::new(Arc::clone(&state)).with_stop_grace(config.stop_grace);
        if let Some(dir) = config.working_directory {
            runner = runner.with_working_directory(dir);
        }

        Self {
            state,
            runner,
            results: ResultsArea::new(config.results_dir),
            reporter,
            reports,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_run_active()
    }

    /// The most recently finished run, if any.
    pub fn latest_result(&self) -> Option<RunResult> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and execute a whole run.
    pub async fn start_run(
        &self,
        artifact: impl AsRef<Path>,
        modules: Vec<ModuleSpec>,
    ) -> Result<RunResult, RunError> {
        Ok(self.prepare(artifact, modules).await?.execute().await)
    }

    /// Validate the run and claim the run slot without executing anything.
    ///
    /// Publishes no events and spawns no process on failure.
    pub async fn prepare(
        &self,
        artifact: impl AsRef<Path>,
        modules: Vec<ModuleSpec>,
    ) -> Result<PreparedRun, RunError> {
        let artifact = artifact.as_ref();
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            tracing::warn!(artifact = %artifact.display(), "Artifact not found");
            return Err(RunError::ArtifactNotFound(artifact.to_path_buf()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = modules.iter().find(|m| !seen.insert(m.name())) {
            return Err(RunError::InvalidModules(format!(
                "duplicate module name '{}'",
                dup.name()
            )));
        }

        let guard = self.state.begin_run().ok_or(RunError::AlreadyInProgress)?;

        Ok(PreparedRun {
            orchestrator: self.clone(),
            guard,
            run_id: Uuid::new_v4(),
            artifact: artifact.to_path_buf(),
            modules,
        })
    }

    /// Stop the current run.
    ///
    /// Returns `true` if a module process was active and has been told to
    /// terminate, `false` if there was nothing to stop.
    pub fn request_stop(&self) -> bool {
        match self.state.signal_stop() {
            Some(handle) => {
                tracing::info!(module = handle.module(), pid = ?handle.pid(), "Stop requested");
                self.reporter
                    .publish_log("Stopping tests on user request...", Severity::Failed);
                self.runner.cancel(&handle);
                true
            }
            None => {
                tracing::debug!(run_active = self.state.is_run_active(), "Stop requested with no active process");
                false
            }
        }
    }

    /// Stop whatever is running and wait for the run to finish.
    ///
    /// Waits even when no process was active, since a run between modules
    /// still holds the slot. Returns `true` if the orchestrator went idle
    /// within `limit`.
    pub async fn stop_and_drain(&self, limit: Duration) -> bool {
        if self.request_stop() {
            tracing::info!("Stopped the active test process");
        }

        let deadline = tokio::time::Instant::now() + limit;
        while self.is_running() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(limit_secs = limit.as_secs(), "Run still active after drain limit");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    fn store_latest(&self, result: RunResult) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }
}

/// A validated run holding the run slot. Dropping it without executing
/// releases the slot.
pub struct PreparedRun {
    orchestrator: RunOrchestrator,
    guard: RunGuard,
    run_id: RunId,
    artifact: PathBuf,
    modules: Vec<ModuleSpec>,
}

impl PreparedRun {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    pub fn modules(&self) -> &[ModuleSpec] {
        &self.modules
    }

    /// Execute every module, aggregate, and hand off to report generation.
    pub async fn execute(self) -> RunResult {
        let Self {
            orchestrator,
            guard,
            run_id,
            artifact,
            modules,
        } = self;
        let reporter = orchestrator.reporter.as_ref();
        let started_at = Utc::now();

        tracing::info!(
            run_id = %run_id,
            artifact = %artifact.display(),
            modules = modules.len(),
            "Run started",
        );
        reporter.publish_log(
            &format!("Running tests for artifact: {}", artifact.display()),
            Severity::Info,
        );

        let ctx = CommandContext::new(&artifact, orchestrator.results.path());
        let module_results = ModuleSequencer::new(&orchestrator.runner, reporter, &orchestrator.results)
            .run(&modules, &ctx, guard.cancel_token())
            .await;

        let overall_outcome = OverallOutcome::aggregate(&module_results);
        let (summary, severity) = match overall_outcome {
            OverallOutcome::Success => ("All modules passed", Severity::Success),
            OverallOutcome::Failure => ("Some modules failed", Severity::Failed),
            OverallOutcome::StoppedByUser => ("Run stopped by user", Severity::Failed),
            OverallOutcome::Aborted => ("No modules were executed; run aborted", Severity::Warning),
        };
        reporter.publish_log(summary, severity);

        let report_location = if overall_outcome.wants_report() {
            match orchestrator.reports.generate(orchestrator.results.path()).await {
                Ok(location) => {
                    reporter.publish_run_complete(&location);
                    Some(location)
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Report generation failed");
                    reporter.publish_log(
                        &format!("Report generation failed: {e}"),
                        Severity::Warning,
                    );
                    None
                }
            }
        } else {
            None
        };

        let result = RunResult {
            run_id,
            artifact_path: artifact.display().to_string(),
            module_results,
            overall_outcome,
            started_at,
            finished_at: Utc::now(),
            report_location,
        };

        tracing::info!(
            run_id = %run_id,
            outcome = ?result.overall_outcome,
            elapsed_ms = (result.finished_at - result.started_at).num_milliseconds(),
            "Run finished",
        );

        orchestrator.store_latest(result.clone());
        drop(guard);
        result
    }
}
