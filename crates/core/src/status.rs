//! Observer-facing status vocabulary and the [`StatusReporter`] sink.
//!
//! The orchestrator never talks to a transport directly. It emits log lines
//! and module transitions through a `StatusReporter`; the concrete fan-out
//! (broadcast bus, WebSocket) lives in `testdeck-events`.

use serde::{Deserialize, Serialize};

use crate::module::ModuleOutcome;

/// Severity attached to a published log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Failed,
}

/// Module state as announced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Running,
    Completed,
    Failed,
    Stopped,
    Skipped,
}

impl From<ModuleOutcome> for ModuleStatus {
    fn from(outcome: ModuleOutcome) -> Self {
        match outcome {
            ModuleOutcome::Completed => Self::Completed,
            ModuleOutcome::Failed => Self::Failed,
            ModuleOutcome::Stopped => Self::Stopped,
            ModuleOutcome::Skipped => Self::Skipped,
        }
    }
}

/// One-way sink for log lines and status transitions.
///
/// Implementations are fire-and-forget: they must swallow their own
/// failures so an observer outage can never fail a test run. Methods are
/// synchronous and must not block.
pub trait StatusReporter: Send + Sync {
    /// Publish one log line.
    fn publish_log(&self, line: &str, severity: Severity);

    /// Publish a module state transition.
    fn publish_module_status(&self, module: &str, status: ModuleStatus, message: &str);

    /// Announce that a report for the finished run is available.
    fn publish_run_complete(&self, report_location: &str);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
