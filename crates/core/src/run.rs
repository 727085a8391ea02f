//! Whole-run results and outcome aggregation.

use serde::{Deserialize, Serialize};

use crate::module::{ModuleOutcome, ModuleResult};
use crate::types::{RunId, Timestamp};

/// Aggregate verdict for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallOutcome {
    /// Every executed module completed.
    Success,
    /// At least one module failed and none was stopped.
    Failure,
    /// A stop request halted the run.
    StoppedByUser,
    /// No module executed at all (empty list, or every module skipped).
    Aborted,
}

impl OverallOutcome {
    /// Fold per-module outcomes into the run verdict.
    ///
    /// Precedence: any `Stopped` wins, then "nothing executed", then any
    /// `Failed`, otherwise `Success`.
    pub fn aggregate(results: &[ModuleResult]) -> Self {
        if results.iter().any(|r| r.outcome == ModuleOutcome::Stopped) {
            Self::StoppedByUser
        } else if !results.iter().any(|r| r.outcome.executed()) {
            Self::Aborted
        } else if results.iter().any(|r| r.outcome == ModuleOutcome::Failed) {
            Self::Failure
        } else {
            Self::Success
        }
    }

    /// Whether a report should be generated for a run with this outcome.
    pub fn wants_report(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Finalized record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub artifact_path: String,
    pub module_results: Vec<ModuleResult>,
    pub overall_outcome: OverallOutcome,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Set when report generation succeeded.
    pub report_location: Option<String>,
}

impl RunResult {
    /// Look up a module result by name.
    pub fn module(&self, name: &str) -> Option<&ModuleResult> {
        self.module_results.iter().find(|r| r.name == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
