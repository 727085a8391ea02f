//! Test run orchestration.
//!
//! Leaves first: [`state`] holds the single-flight run state, [`process`]
//! runs one module process, [`sequencer`] walks the module list, and
//! [`orchestrator`] is the entry point that ties them together with the
//! [`report`] hand-off.

pub mod command;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod results_area;
pub mod sequencer;
pub mod state;

pub use command::CommandContext;
pub use orchestrator::{OrchestratorConfig, PreparedRun, RunError, RunOrchestrator};
pub use process::{
    OutputStream, ProcessError, ProcessExit, ProcessHandle, ProcessRunner, RunningProcess,
};
pub use report::{CommandReportGenerator, ReportError, ReportGenerator};
pub use results_area::ResultsArea;
pub use sequencer::ModuleSequencer;
pub use state::{RunGuard, RunState};
