//! Module definitions and per-module results.
//!
//! A *module* is one independently runnable unit of test checks. The caller
//! supplies an ordered list of [`ModuleSpec`]s; the sequencer produces one
//! [`ModuleResult`] per attempted module.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Immutable description of one module to execute.
///
/// Not `Deserialize`: every instance goes through [`ModuleSpec::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSpec {
    name: String,
    command: Vec<String>,
    requires_clean_slate: bool,
    script: Option<PathBuf>,
}

impl ModuleSpec {
    /// Build a spec, rejecting an empty name or an empty command.
    ///
    /// `command[0]` is the executable; the remaining entries are its
    /// arguments and may contain `{artifact}` / `{results}` placeholders.
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Validation("module name is required".to_string()));
        }
        match command.first() {
            None => {
                return Err(CoreError::Validation(format!(
                    "module '{name}' has an empty command"
                )))
            }
            Some(program) if program.trim().is_empty() => {
                return Err(CoreError::Validation(format!(
                    "module '{name}' has an empty executable"
                )))
            }
            Some(_) => {}
        }

        Ok(Self {
            name,
            command,
            requires_clean_slate: false,
            script: None,
        })
    }

    /// Request that the shared results area is wiped before this module runs.
    pub fn with_clean_slate(mut self, clean: bool) -> Self {
        self.requires_clean_slate = clean;
        self
    }

    /// Attach the test script this module exercises.
    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The executable, i.e. `command[0]`.
    pub fn program(&self) -> &str {
        // `new` guarantees a non-empty command.
        &self.command[0]
    }

    pub fn requires_clean_slate(&self) -> bool {
        self.requires_clean_slate
    }

    pub fn script(&self) -> Option<&PathBuf> {
        self.script.as_ref()
    }
}

/// Terminal state of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOutcome {
    /// The process exited with code zero.
    Completed,
    /// The process exited non-zero, or could not be launched.
    Failed,
    /// A stop request halted the module (or arrived before it started).
    Stopped,
    /// The module's executable or script did not resolve; never started.
    Skipped,
}

impl ModuleOutcome {
    /// Whether the module actually ran to a pass/fail verdict.
    pub fn executed(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Outcome record for one module. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleResult {
    pub name: String,
    pub outcome: ModuleOutcome,
    /// Process exit code; `None` when the module never ran or was killed by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock time from spawn to exit (0 when never started).
    pub duration_ms: u64,
    /// Extra context, e.g. the spawn error or skip reason.
    pub message: Option<String>,
}

impl ModuleResult {
    pub(crate) fn new(name: &str, outcome: ModuleOutcome, exit_code: Option<i32>) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            exit_code,
            duration_ms: 0,
            message: None,
        }
    }

    pub(crate) fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
