//! Artifacts already stored on the server, available for a run.

use std::path::{Component, Path, PathBuf};

use crate::error::CoreError;

/// File extensions accepted as installable artifacts (compared case-insensitively).
pub const ARTIFACT_EXTENSIONS: &[&str] = &["apk", "apks"];

/// A directory of stored artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Names of stored artifacts, sorted. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<String>, CoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read artifacts directory {}: {e}",
                    self.dir.display()
                )))
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to list artifacts: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_artifact_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a bare artifact name to its path inside the store.
    ///
    /// Rejects names that would escape the directory. Existence is checked
    /// by the orchestrator, not here.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, CoreError> {
        let trimmed = name.trim();
        let mut components = Path::new(trimmed).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(trimmed)),
            _ => Err(CoreError::Validation(format!(
                "invalid artifact name '{name}'"
            ))),
        }
    }
}

fn is_artifact_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARTIFACT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}
