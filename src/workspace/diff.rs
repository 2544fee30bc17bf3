//! Read-only change tracking against the workspace baseline commit.
//!
//! All helpers are side-effect-free and return empty/zero values rather
//! than raising when no baseline exists (e.g. git missing, baseline init
//! failed). A run must never fail because its diff could not be computed.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Aggregate statistics over the workspace diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Lines added since the baseline commit.
    pub lines_added: usize,
    /// Lines removed since the baseline commit.
    pub lines_removed: usize,
    /// Size of the unified diff in bytes.
    pub diff_size: usize,
}

/// Paths of files changed since the baseline commit.
pub async fn changed_files(workspace: &Path) -> Vec<String> {
    match run_git_diff(&["diff", "--name-only", "HEAD"], workspace).await {
        Some(output) => output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Unified diff of the workspace against the baseline commit.
pub async fn diff_output(workspace: &Path) -> String {
    run_git_diff(&["diff", "HEAD"], workspace)
        .await
        .unwrap_or_default()
}

/// Added/removed line counts and diff byte size.
pub async fn diff_stats(workspace: &Path) -> DiffStats {
    let diff = diff_output(workspace).await;

    let mut stats = DiffStats {
        diff_size: diff.len(),
        ..DiffStats::default()
    };

    for line in diff.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            stats.lines_added += 1;
        }
        if line.starts_with('-') && !line.starts_with("---") {
            stats.lines_removed += 1;
        }
    }

    stats
}

async fn run_git_diff(args: &[&str], workspace: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// git is required for the baseline tests; skip quietly where absent.
    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init"],
            vec!["add", "-A"],
            vec!["commit", "-m", "initial", "--allow-empty"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(dir)
                .env("GIT_AUTHOR_NAME", "bench")
                .env("GIT_AUTHOR_EMAIL", "bench@test")
                .env("GIT_COMMITTER_NAME", "bench")
                .env("GIT_COMMITTER_EMAIL", "bench@test")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .unwrap();
            assert!(status.success());
        }
    }

    #[tokio::test]
    async fn test_no_baseline_returns_empty() {
        let dir = TempDir::new().unwrap();
        assert!(changed_files(dir.path()).await.is_empty());
        assert!(diff_output(dir.path()).await.is_empty());
        assert_eq!(diff_stats(dir.path()).await, DiffStats::default());
    }

    #[tokio::test]
    async fn test_changed_files_and_stats_against_baseline() {
        if !git_available().await {
            return;
        }

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        init_repo(dir.path()).await;

        std::fs::write(dir.path().join("a.txt"), "one\nthree\n").unwrap();

        let changed = changed_files(dir.path()).await;
        assert_eq!(changed, vec!["a.txt".to_string()]);

        let stats = diff_stats(dir.path()).await;
        assert_eq!(stats.lines_added, 1);
        assert_eq!(stats.lines_removed, 1);
        assert!(stats.diff_size > 0);

        let diff = diff_output(dir.path()).await;
        assert!(diff.contains("-two"));
        assert!(diff.contains("+three"));
    }
}
