//! Shared results directory that every module of a run appends to.

use std::io;
use std::path::{Path, PathBuf};

/// The accumulation area for structured test results.
///
/// Reset at most once per run, by the first attempted module; later
/// modules only make sure it exists.
#[derive(Debug, Clone)]
pub struct ResultsArea {
    dir: PathBuf,
}

impl ResultsArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Delete everything accumulated so far and recreate the directory.
    pub async fn reset(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Create the directory if it is missing, keeping existing content.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_removes_previous_results() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let area = ResultsArea::new(tmp.path().join("results"));
        area.ensure().await.expect("ensure");
        std::fs::write(area.path().join("old.json"), "{}").expect("write");

        area.reset().await.expect("reset");

        assert!(area.path().is_dir());
        assert!(!area.path().join("old.json").exists());
    }

    #[tokio::test]
    async fn ensure_keeps_existing_results() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let area = ResultsArea::new(tmp.path().join("results"));
        area.ensure().await.expect("ensure");
        std::fs::write(area.path().join("keep.json"), "{}").expect("write");

        area.ensure().await.expect("ensure again");

        assert!(area.path().join("keep.json").exists());
    }

    #[tokio::test]
    async fn reset_creates_missing_directory() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let area = ResultsArea::new(tmp.path().join("nested/results"));
        area.reset().await.expect("reset");
        assert!(area.path().is_dir());
    }
}
