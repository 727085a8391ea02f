use std::path::PathBuf;
use std::time::Duration;

use testdeck_core::catalog::{parse_command, parse_modules, ModuleSelection};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Where stored artifacts live.
    pub artifacts_dir: PathBuf,
    /// Shared results directory modules write into.
    pub results_dir: PathBuf,
    /// Generated report output, served under `/reports`.
    pub report_dir: PathBuf,
    /// Working directory for module processes; `None` means inherit.
    pub working_dir: Option<PathBuf>,
    /// Driver command template; `{script}`, `{artifact}`, `{results}` are substituted.
    pub module_command: Vec<String>,
    /// Modules run when a request does not select any.
    pub modules: Vec<ModuleSelection>,
    /// Report command template; `{results}` and `{report}` are substituted.
    pub report_command: Vec<String>,
    /// Public location announced once a report is ready.
    pub report_url: String,
    pub report_timeout_secs: u64,
    /// Grace period between terminate and kill when stopping a module.
    pub stop_grace_secs: u64,
    /// `adb` executable used by the device check.
    pub adb_command: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                        |
    /// |------------------------|------------------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                                      |
    /// | `PORT`                 | `8000`                                         |
    /// | `CORS_ORIGINS`         | `http://localhost:5173,http://127.0.0.1:5173`  |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                           |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                                           |
    /// | `ARTIFACTS_DIR`        | `./artifacts`                                  |
    /// | `RESULTS_DIR`          | `./results`                                    |
    /// | `REPORT_DIR`           | `./report`                                     |
    /// | `WORKING_DIR`          | (current directory)                            |
    /// | `MODULE_COMMAND`       | `pytest -s -vv {script} --apk={artifact} --alluredir={results}` |
    /// | `MODULES`              | `Login=tests/test_cases/test_login_pytest.py,Onboarding=...` |
    /// | `REPORT_COMMAND`       | `allure generate {results} -o {report} --clean` |
    /// | `REPORT_URL`           | `http://localhost:8000/reports/index.html`     |
    /// | `REPORT_TIMEOUT_SECS`  | `120`                                          |
    /// | `STOP_GRACE_SECS`      | `5`                                            |
    /// | `ADB_COMMAND`          | `adb`                                          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = env_u64("SHUTDOWN_TIMEOUT_SECS", 30);

        let artifacts_dir = env_path("ARTIFACTS_DIR", "./artifacts");
        let results_dir = env_path("RESULTS_DIR", "./results");
        let report_dir = env_path("REPORT_DIR", "./report");
        let working_dir = std::env::var("WORKING_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let module_command = parse_command(
            &std::env::var("MODULE_COMMAND").unwrap_or_else(|_| {
                "pytest -s -vv {script} --apk={artifact} --alluredir={results}".into()
            }),
        );
        assert!(!module_command.is_empty(), "MODULE_COMMAND must not be empty");

        let modules = parse_modules(&std::env::var("MODULES").unwrap_or_else(|_| {
            "Login=tests/test_cases/test_login_pytest.py,\
             Onboarding=tests/test_cases/test_onboarding_pytest.py"
                .into()
        }))
        .expect("MODULES must be a comma-separated list of Name=path");

        let report_command = parse_command(
            &std::env::var("REPORT_COMMAND")
                .unwrap_or_else(|_| "allure generate {results} -o {report} --clean".into()),
        );

        let report_url = std::env::var("REPORT_URL")
            .unwrap_or_else(|_| "http://localhost:8000/reports/index.html".into());

        let report_timeout_secs = env_u64("REPORT_TIMEOUT_SECS", 120);
        let stop_grace_secs = env_u64("STOP_GRACE_SECS", 5);
        let adb_command = std::env::var("ADB_COMMAND").unwrap_or_else(|_| "adb".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            artifacts_dir,
            results_dir,
            report_dir,
            working_dir,
            module_command,
            modules,
            report_command,
            report_url,
            report_timeout_secs,
            stop_grace_secs,
            adb_command,
        }
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid u64")),
        Err(_) => default,
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.into()))
}
