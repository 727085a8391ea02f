#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use testdeck_core::module::ModuleSpec;
use testdeck_core::orchestration::{
    OrchestratorConfig, ReportError, ReportGenerator, RunOrchestrator,
};
use testdeck_core::status::{ModuleStatus, Severity, StatusReporter};

/// One published event, in publication order.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Log(String, Severity),
    Module(String, ModuleStatus),
    RunComplete(String),
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn module_statuses(&self, module: &str) -> Vec<ModuleStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Module(name, status) if name == module => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn has_log(&self, line: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Recorded::Log(l, _) if l == line))
    }
}

impl StatusReporter for RecordingReporter {
    fn publish_log(&self, line: &str, severity: Severity) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Log(line.to_string(), severity));
    }

    fn publish_module_status(&self, module: &str, status: ModuleStatus, _message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Module(module.to_string(), status));
    }

    fn publish_run_complete(&self, report_location: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::RunComplete(report_location.to_string()));
    }
}

/// Counts `generate` calls and always succeeds.
#[derive(Default)]
pub struct CountingReports {
    calls: AtomicUsize,
}

impl CountingReports {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportGenerator for CountingReports {
    async fn generate(&self, _results_dir: &Path) -> Result<String, ReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("http://localhost:8000/reports/index.html".to_string())
    }
}

pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub artifact: PathBuf,
    pub orchestrator: RunOrchestrator,
    pub reporter: Arc<RecordingReporter>,
    pub reports: Arc<CountingReports>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("temp dir");
        let artifact = tmp.path().join("app.apk");
        std::fs::write(&artifact, b"apk").expect("write artifact");

        let reporter = Arc::new(RecordingReporter::default());
        let reports = Arc::new(CountingReports::default());
        let mut config = OrchestratorConfig::new(tmp.path().join("results"));
        config.working_directory = Some(tmp.path().to_path_buf());
        config.stop_grace = Duration::from_secs(2);

        let orchestrator = RunOrchestrator::new(config, reporter.clone(), reports.clone());

        Self {
            tmp,
            artifact,
            orchestrator,
            reporter,
            reports,
        }
    }

    pub fn results_dir(&self) -> PathBuf {
        self.tmp.path().join("results")
    }
}

/// A module that runs `script` through `sh -c`.
pub fn sh_module(name: &str, script: &str) -> ModuleSpec {
    ModuleSpec::new(
        name,
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    )
    .expect("valid spec")
}

/// Poll until `cond` holds, failing the test after `limit`.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
