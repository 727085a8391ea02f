//! Report generation hand-off.
//!
//! After a run finishes (not stopped, at least one module executed) the
//! orchestrator asks a [`ReportGenerator`] to turn the accumulated results
//! into a viewable report. Failures here never change the run outcome.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{anchor, RESULTS_PLACEHOLDER};

/// Replaced with the report output directory in the report command.
pub const REPORT_PLACEHOLDER: &str = "{report}";

/// Default timeout for one report generation.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report command is empty")]
    InvalidCommand,

    #[error("Failed to launch report generator: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Report generation timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    #[error("Report generator exited with code {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Produces a viewable report from a results directory.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Generate the report and return where observers can view it.
    async fn generate(&self, results_dir: &Path) -> Result<String, ReportError>;
}

/// Runs an external report tool, e.g. `allure generate`.
#[derive(Debug, Clone)]
pub struct CommandReportGenerator {
    command: Vec<String>,
    report_dir: PathBuf,
    location: String,
    timeout: Duration,
    working_directory: Option<PathBuf>,
}

impl CommandReportGenerator {
    /// `command` may contain `{results}` and `{report}`; `location` is what
    /// gets announced once generation succeeds.
    pub fn new(
        command: Vec<String>,
        report_dir: impl Into<PathBuf>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            command,
            report_dir: report_dir.into(),
            location: location.into(),
            timeout: DEFAULT_REPORT_TIMEOUT,
            working_directory: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    fn render(&self, results_dir: &Path) -> Vec<String> {
        let results = results_dir.to_string_lossy();
        let report = self.report_dir.to_string_lossy();
        self.command
            .iter()
            .map(|arg| {
                arg.replace(RESULTS_PLACEHOLDER, &results)
                    .replace(REPORT_PLACEHOLDER, &report)
            })
            .collect()
    }
}

#[async_trait]
impl ReportGenerator for CommandReportGenerator {
    async fn generate(&self, results_dir: &Path) -> Result<String, ReportError> {
        let start = Instant::now();
        let argv = self.render(results_dir);
        let (program, args) = argv.split_first().ok_or(ReportError::InvalidCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        tracing::info!(
            program = %program,
            results_dir = %anchor(results_dir, self.working_directory.as_deref()).display(),
            "Generating report",
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ReportError::Timeout {
                elapsed_secs: start.elapsed().as_secs(),
            })??;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(elapsed_ms, stderr = %stderr, "Report generation failed");
            return Err(ReportError::Failed {
                exit_code: output.status.code(),
                stderr,
            });
        }

        tracing::info!(elapsed_ms, location = %self.location, "Report generated");
        Ok(self.location.clone())
    }
}
