//! Per-run artifact directory layout.
//!
//! Large captures stay out of the database: each run gets its own
//! directory under the artifacts root holding `stdout.txt`, `stderr.txt`
//! and, when the workspace changed, `diff.patch`.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::adapters::ExecutionArtifacts;

/// Writes per-run artifacts under a common root directory.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The artifacts root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one run's artifacts.
    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Persists stdout, stderr and (when non-empty) the workspace diff
    /// for one run. Written unconditionally on the success path,
    /// regardless of pass/fail.
    pub fn store_run(
        &self,
        run_id: Uuid,
        artifacts: &ExecutionArtifacts,
        diff: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(dir.join("stdout.txt"), &artifacts.stdout)?;
        std::fs::write(dir.join("stderr.txt"), &artifacts.stderr)?;
        if !diff.is_empty() {
            std::fs::write(dir.join("diff.patch"), diff)?;
        }

        debug!("Stored artifacts for run {} in {}", run_id, dir.display());
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_run_writes_layout() {
        let root = TempDir::new().unwrap();
        let store = ArtifactStore::new(root.path());
        let run_id = Uuid::new_v4();

        let artifacts = ExecutionArtifacts {
            stdout: "agent said things".to_string(),
            stderr: "warnings".to_string(),
            ..ExecutionArtifacts::default()
        };

        let dir = store
            .store_run(run_id, &artifacts, "--- a/x\n+++ b/x\n")
            .unwrap();

        assert_eq!(dir, root.path().join(run_id.to_string()));
        assert_eq!(
            std::fs::read_to_string(dir.join("stdout.txt")).unwrap(),
            "agent said things"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("stderr.txt")).unwrap(),
            "warnings"
        );
        assert!(dir.join("diff.patch").exists());
    }

    #[test]
    fn test_empty_diff_writes_no_patch() {
        let root = TempDir::new().unwrap();
        let store = ArtifactStore::new(root.path());
        let run_id = Uuid::new_v4();

        let dir = store
            .store_run(run_id, &ExecutionArtifacts::default(), "")
            .unwrap();

        assert!(dir.join("stdout.txt").exists());
        assert!(dir.join("stderr.txt").exists());
        assert!(!dir.join("diff.patch").exists());
    }
}
