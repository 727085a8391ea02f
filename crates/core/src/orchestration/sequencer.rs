//! Walks the module list one module at a time.
//!
//! Per module: `Pending -> Running -> {Completed | Failed | Stopped}`, or
//! `Pending -> Skipped` when its executable or script does not resolve.
//! The run's cancel token is checked before each module, again atomically
//! with the process-slot reservation right before spawning, and between
//! output lines. Once it fires no further process is launched.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::command::{resolve_executable, resolve_script, CommandContext};
use super::process::{ProcessError, ProcessRunner};
use super::results_area::ResultsArea;
use crate::module::{ModuleOutcome, ModuleResult, ModuleSpec};
use crate::status::{ModuleStatus, Severity, StatusReporter};

const STOPPED_BEFORE_START: &str = "Stopped before start";

/// Drives the modules of one run through the [`ProcessRunner`].
pub struct ModuleSequencer<'a> {
    runner: &'a ProcessRunner,
    reporter: &'a dyn StatusReporter,
    results: &'a ResultsArea,
}

impl<'a> ModuleSequencer<'a> {
    pub fn new(
        runner: &'a ProcessRunner,
        reporter: &'a dyn StatusReporter,
        results: &'a ResultsArea,
    ) -> Self {
        Self {
            runner,
            reporter,
            results,
        }
    }

    /// Execute `modules` in order and return one result per attempted module.
    ///
    /// Modules after a stopped one are absent from the returned list.
    pub async fn run(
        &self,
        modules: &[ModuleSpec],
        ctx: &CommandContext,
        cancel: &CancellationToken,
    ) -> Vec<ModuleResult> {
        let mut results = Vec::with_capacity(modules.len());
        let mut attempted_any = false;

        for spec in modules {
            if cancel.is_cancelled() {
                results.push(self.stopped_before_start(spec.name()));
                break;
            }

            if let Some(reason) = self.unresolved(spec).await {
                tracing::warn!(module = spec.name(), reason = %reason, "Skipping module");
                self.announce(spec.name(), ModuleOutcome::Skipped, &reason, None);
                self.reporter.publish_log(
                    &format!("Skipping {} tests: {reason}", spec.name()),
                    Severity::Warning,
                );
                results.push(
                    ModuleResult::new(spec.name(), ModuleOutcome::Skipped, None)
                        .with_message(reason),
                );
                continue;
            }

            self.prepare_results(spec, !attempted_any).await;
            attempted_any = true;

            let result = self.run_module(spec, ctx, cancel).await;
            let stopped = result.outcome == ModuleOutcome::Stopped;
            results.push(result);
            if stopped {
                break;
            }
        }

        results
    }

    /// Why `spec` cannot be started, if it cannot.
    async fn unresolved(&self, spec: &ModuleSpec) -> Option<String> {
        let working_dir = self.runner.working_directory();
        if resolve_executable(spec.program(), working_dir).await.is_none() {
            return Some(format!("executable '{}' not found", spec.program()));
        }
        if let Some(script) = spec.script() {
            if resolve_script(script, working_dir).await.is_none() {
                return Some(format!("test script '{}' not found", script.display()));
            }
        }
        None
    }

    /// Reset the results area for the first attempted module if it asks
    /// for a clean slate; everyone else appends.
    async fn prepare_results(&self, spec: &ModuleSpec, first: bool) {
        let outcome = if spec.requires_clean_slate() && first {
            tracing::debug!(module = spec.name(), dir = %self.results.path().display(), "Resetting results area");
            self.results.reset().await
        } else {
            if spec.requires_clean_slate() {
                tracing::warn!(module = spec.name(), "Clean slate ignored for non-first module");
                self.reporter.publish_log(
                    &format!(
                        "{} requested a clean results area; appending to this run's results instead",
                        spec.name()
                    ),
                    Severity::Warning,
                );
            }
            self.results.ensure().await
        };

        if let Err(e) = outcome {
            tracing::warn!(module = spec.name(), error = %e, "Failed to prepare results area");
            self.reporter.publish_log(
                &format!("Could not prepare results directory: {e}"),
                Severity::Warning,
            );
        }
    }

    async fn run_module(
        &self,
        spec: &ModuleSpec,
        ctx: &CommandContext,
        cancel: &CancellationToken,
    ) -> ModuleResult {
        let name = spec.name();
        let started = Instant::now();

        let mut process = match self.runner.start(spec, ctx, cancel) {
            Ok(process) => process,
            Err(ProcessError::Cancelled { .. }) => return self.stopped_before_start(name),
            Err(e) => {
                let message = e.to_string();
                tracing::error!(module = name, error = %e, "Module failed to start");
                self.announce(name, ModuleOutcome::Failed, &message, Some(Severity::Failed));
                return ModuleResult::new(name, ModuleOutcome::Failed, None)
                    .with_duration_ms(started.elapsed().as_millis() as u64)
                    .with_message(message);
            }
        };

        self.reporter.publish_module_status(
            name,
            ModuleStatus::Running,
            &format!("Starting {name} tests"),
        );
        self.reporter
            .publish_log(&format!("==== Running {name} tests ===="), Severity::Info);

        let mut output = self.runner.stream_output(&mut process);
        let mut stopped = false;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    stopped = true;
                    break;
                }
                line = output.next_line() => match line {
                    Some(line) => self.reporter.publish_log(&line, Severity::Info),
                    None => break,
                },
            }
        }
        drop(output);

        if stopped {
            self.runner.cancel(process.handle());
        }

        let exit = match self.runner.wait(process).await {
            Ok(exit) => exit,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(module = name, error = %e, "Lost track of module process");
                let outcome = if stopped {
                    ModuleOutcome::Stopped
                } else {
                    ModuleOutcome::Failed
                };
                self.announce(name, outcome, &message, Some(Severity::Failed));
                return ModuleResult::new(name, outcome, None)
                    .with_duration_ms(started.elapsed().as_millis() as u64)
                    .with_message(message);
            }
        };

        let duration_ms = exit.duration.as_millis() as u64;

        if stopped || exit.terminated {
            tracing::info!(module = name, duration_ms, "Module stopped");
            self.announce(name, ModuleOutcome::Stopped, &format!("{name} tests stopped"), None);
            self.reporter
                .publish_log("Test process terminated.", Severity::Failed);
            return ModuleResult::new(name, ModuleOutcome::Stopped, exit.code)
                .with_duration_ms(duration_ms);
        }

        let (outcome, message, severity) = if exit.success() {
            tracing::info!(module = name, duration_ms, "Module passed");
            (ModuleOutcome::Completed, format!("{name} tests passed"), Severity::Success)
        } else {
            tracing::info!(module = name, exit_code = ?exit.code, duration_ms, "Module failed");
            (ModuleOutcome::Failed, format!("{name} tests failed"), Severity::Failed)
        };
        self.announce(name, outcome, &message, Some(severity));
        ModuleResult::new(name, outcome, exit.code).with_duration_ms(duration_ms)
    }

    /// The run was stopped before `name` got a process. Nothing was
    /// launched and no "running" status was published.
    fn stopped_before_start(&self, name: &str) -> ModuleResult {
        tracing::info!(module = name, "Stop requested before module start");
        self.announce(name, ModuleOutcome::Stopped, STOPPED_BEFORE_START, None);
        ModuleResult::new(name, ModuleOutcome::Stopped, None).with_message(STOPPED_BEFORE_START)
    }

    /// Publish the terminal status for `outcome`, plus `message` as a log
    /// line when `log` is set.
    fn announce(&self, name: &str, outcome: ModuleOutcome, message: &str, log: Option<Severity>) {
        self.reporter
            .publish_module_status(name, ModuleStatus::from(outcome), message);
        if let Some(severity) = log {
            self.reporter.publish_log(message, severity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::orchestration::state::RunState;
    use crate::orchestration::test_helpers::{sh_module, RecordingReporter};

    struct Fixture {
        _tmp: tempfile::TempDir,
        state: Arc<RunState>,
        runner: ProcessRunner,
        reporter: RecordingReporter,
        results: ResultsArea,
        ctx: CommandContext,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().expect("temp dir");
        let state = Arc::new(RunState::new());
        let runner = ProcessRunner::new(Arc::clone(&state))
            .with_stop_grace(Duration::from_secs(2))
            .with_working_directory(tmp.path());
        let results = ResultsArea::new(tmp.path().join("results"));
        let ctx = CommandContext::new(tmp.path().join("app.apk"), results.path());
        Fixture {
            _tmp: tmp,
            state,
            runner,
            reporter: RecordingReporter::default(),
            results,
            ctx,
        }
    }

    #[tokio::test]
    async fn runs_modules_in_order() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let modules = vec![
            sh_module("Login", "echo login"),
            sh_module("Onboarding", "echo onboarding"),
        ];

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Login", "Onboarding"]);
        assert!(results.iter().all(|r| r.outcome == ModuleOutcome::Completed));
        assert!(f.reporter.logs().contains(&"login".to_string()));
        assert!(f.state.active_process().is_none());
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_modules() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let modules = vec![
            sh_module("A", "exit 0"),
            sh_module("B", "exit 2"),
            sh_module("C", "exit 0"),
        ];

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        let outcomes: Vec<_> = results.iter().map(|r| (r.outcome, r.exit_code)).collect();
        assert_eq!(
            outcomes,
            vec![
                (ModuleOutcome::Completed, Some(0)),
                (ModuleOutcome::Failed, Some(2)),
                (ModuleOutcome::Completed, Some(0)),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_stops_first_module_only() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let modules = vec![sh_module("A", "exit 0"), sh_module("B", "exit 0")];

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, ModuleOutcome::Stopped);
        assert_eq!(
            f.reporter.statuses(),
            vec![("A".to_string(), ModuleStatus::Stopped)]
        );
    }

    #[tokio::test]
    async fn missing_executable_is_skipped_and_run_continues() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let missing = ModuleSpec::new("Ghost", vec!["./no-such-driver".to_string()])
            .expect("valid spec");
        let modules = vec![missing, sh_module("Login", "exit 0")];

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert_eq!(results[0].outcome, ModuleOutcome::Skipped);
        assert!(results[0]
            .message
            .as_deref()
            .is_some_and(|m| m.contains("no-such-driver")));
        assert_eq!(results[1].outcome, ModuleOutcome::Completed);
        assert!(f
            .reporter
            .entries()
            .iter()
            .any(|(_, severity)| *severity == Severity::Warning));
    }

    #[tokio::test]
    async fn missing_script_is_skipped() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let modules = vec![sh_module("Login", "exit 0").with_script("tests/test_missing.py")];

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert_eq!(results[0].outcome, ModuleOutcome::Skipped);
    }

    #[tokio::test]
    async fn only_first_attempted_module_gets_a_clean_slate() {
        let f = fixture();
        f.results.ensure().await.expect("ensure");
        std::fs::write(f.results.path().join("stale.json"), "{}").expect("write stale");
        let cancel = CancellationToken::new();

        let modules = vec![
            sh_module("Login", "touch {results}/login.json").with_clean_slate(true),
            sh_module("Onboarding", "touch {results}/onboarding.json").with_clean_slate(true),
        ];

        ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert!(!f.results.path().join("stale.json").exists());
        assert!(f.results.path().join("login.json").exists());
        assert!(f.results.path().join("onboarding.json").exists());
    }

    #[tokio::test]
    async fn cancel_while_running_stops_the_module() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let modules = vec![
            sh_module("Login", "echo started; exec sleep 30"),
            sh_module("Onboarding", "exit 0"),
        ];

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let results = ModuleSequencer::new(&f.runner, &f.reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Login");
        assert_eq!(results[0].outcome, ModuleOutcome::Stopped);
        assert!(f.reporter.logs().contains(&"Test process terminated.".to_string()));
        assert!(f.state.active_process().is_none());
    }

    /// Stops the run the first time a WARNING line is published.
    struct StopOnWarning {
        inner: RecordingReporter,
        cancel: CancellationToken,
    }

    impl StatusReporter for StopOnWarning {
        fn publish_log(&self, line: &str, severity: Severity) {
            if severity == Severity::Warning {
                self.cancel.cancel();
            }
            self.inner.publish_log(line, severity);
        }

        fn publish_module_status(&self, module: &str, status: ModuleStatus, message: &str) {
            self.inner.publish_module_status(module, status, message);
        }

        fn publish_run_complete(&self, report_location: &str) {
            self.inner.publish_run_complete(report_location);
        }
    }

    #[tokio::test]
    async fn stop_between_preparation_and_spawn_launches_nothing() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let reporter = StopOnWarning {
            inner: RecordingReporter::default(),
            cancel: cancel.clone(),
        };
        let marker = f.results.path().join("onboarding-ran");
        // The second clean-slate request warns after the loop's stop check
        // and before the process is spawned.
        let modules = vec![
            sh_module("Login", "exit 0"),
            sh_module("Onboarding", &format!("touch {}", marker.display()))
                .with_clean_slate(true),
        ];

        let results = ModuleSequencer::new(&f.runner, &reporter, &f.results)
            .run(&modules, &f.ctx, &cancel)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].outcome, ModuleOutcome::Completed);
        assert_eq!(results[1].outcome, ModuleOutcome::Stopped);
        assert_eq!(results[1].message.as_deref(), Some(STOPPED_BEFORE_START));
        let onboarding: Vec<_> = reporter
            .inner
            .statuses()
            .into_iter()
            .filter(|(module, _)| module == "Onboarding")
            .map(|(_, status)| status)
            .collect();
        assert_eq!(onboarding, vec![ModuleStatus::Stopped]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists(), "no process may be launched after a stop");
        assert!(f.state.active_process().is_none());
    }
}
