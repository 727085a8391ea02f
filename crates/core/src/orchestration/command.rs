//! Command rendering and executable resolution.
//!
//! Module commands are templates: `{artifact}` and `{results}` are replaced
//! per run. Resolution decides up front whether a module can be started at
//! all; unresolved modules are skipped rather than failed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::module::ModuleSpec;

/// Replaced with the artifact path in every command argument.
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// Replaced with the shared results directory in every command argument.
pub const RESULTS_PLACEHOLDER: &str = "{results}";

/// Per-run values substituted into module commands.
#[derive(Debug, Clone)]
pub struct CommandContext {
    artifact: PathBuf,
    results_dir: PathBuf,
}

impl CommandContext {
    pub fn new(artifact: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            results_dir: results_dir.into(),
        }
    }

    /// Render `spec.command` with placeholders substituted.
    pub fn render(&self, spec: &ModuleSpec) -> Vec<String> {
        spec.command().iter().map(|arg| self.render_arg(arg)).collect()
    }

    fn render_arg(&self, arg: &str) -> String {
        arg.replace(ARTIFACT_PLACEHOLDER, &self.artifact.to_string_lossy())
            .replace(RESULTS_PLACEHOLDER, &self.results_dir.to_string_lossy())
    }

    /// Environment variables exported to every module process.
    pub fn env_vars(&self, spec: &ModuleSpec) -> Vec<(&'static str, OsString)> {
        vec![
            ("TESTDECK_ARTIFACT", self.artifact.clone().into_os_string()),
            ("TESTDECK_RESULTS_DIR", self.results_dir.clone().into_os_string()),
            ("TESTDECK_MODULE", OsString::from(spec.name())),
        ]
    }
}

/// Anchor a relative path at `working_dir` (if any).
pub(crate) fn anchor(path: &Path, working_dir: Option<&Path>) -> PathBuf {
    match working_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Resolve `program` to an executable file.
///
/// A program containing a path separator is checked in place (relative
/// paths are anchored at `working_dir`); a bare name is searched on `PATH`.
pub async fn resolve_executable(program: &str, working_dir: Option<&Path>) -> Option<PathBuf> {
    if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
        let path = anchor(Path::new(program), working_dir);
        return is_executable(&path).await.then_some(path);
    }

    let search_path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&search_path) {
        let candidate = dir.join(program);
        if is_executable(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

/// Resolve a module's test script; it only needs to exist as a file.
pub async fn resolve_script(script: &Path, working_dir: Option<&Path>) -> Option<PathBuf> {
    let path = anchor(script, working_dir);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}

async fn is_executable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && has_exec_bit(&meta),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn has_exec_bit(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &std::fs::Metadata) -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
