//! Materializes isolated run directories from task context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schema::Task;

/// Bound on dependency installation; installs are preparatory work and
/// must not stall a batch indefinitely.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur while provisioning a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to clone '{url}': {message}")]
    CloneFailed { url: String, message: String },

    #[error("Failed to write seed file '{path}': {message}")]
    SeedFileFailed { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An ephemeral, run-scoped directory. Owned exclusively by one run.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Absolute path of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively removes the workspace directory.
    ///
    /// Best-effort and idempotent: an uncleaned temp directory must never
    /// abort a benchmark batch, so failures are logged and swallowed.
    pub fn cleanup(&self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}

/// Creates isolated workspaces under a common root directory.
pub struct WorkspaceProvisioner {
    root: PathBuf,
}

impl Default for WorkspaceProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceProvisioner {
    /// Creates a provisioner rooted at the system temp directory.
    pub fn new() -> Self {
        Self {
            root: std::env::temp_dir().join("harness-bench"),
        }
    }

    /// Creates a provisioner rooted at a custom directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Materializes a fresh workspace for one run.
    ///
    /// The directory is keyed by `run_id` so concurrent batches cannot
    /// collide. Clone failures are fatal for the run; dependency install
    /// and baseline-commit failures degrade (logged, never propagated).
    pub async fn create_workspace(
        &self,
        task: &Task,
        run_id: Uuid,
    ) -> Result<Workspace, WorkspaceError> {
        let dir = self.root.join(run_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        if let Some(ref url) = task.context.repo_url {
            clone_repository(url, task.context.repo_commit.as_deref(), &dir).await?;
        }

        // Seed files go in last so they override repository content.
        if let Some(ref files) = task.context.files {
            write_seed_files(files, &dir).await?;
        }

        install_dependencies(task, &dir).await;

        // A baseline commit is what diff tracking measures against. Cloned
        // repositories already have HEAD; everything else gets initialized
        // here. Failure degrades diff tracking to empty output.
        if task.context.repo_url.is_none() {
            if let Err(e) = init_baseline(&dir).await {
                warn!(
                    "Failed to initialize baseline commit in {}: {} (diff tracking degraded)",
                    dir.display(),
                    e
                );
            }
        }

        debug!("Provisioned workspace {} for run {}", dir.display(), run_id);
        Ok(Workspace { path: dir })
    }
}

/// Shallow-clones a repository into `dir`, checking out `commit` when given.
async fn clone_repository(
    url: &str,
    commit: Option<&str>,
    dir: &Path,
) -> Result<(), WorkspaceError> {
    let mut args: Vec<&str> = vec!["clone", "--depth", "1"];
    if let Some(commit) = commit {
        args.push("--branch");
        args.push(commit);
    }
    let dir_str = dir.to_string_lossy();
    args.push(url);
    args.push(&dir_str);

    let output = Command::new("git")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| WorkspaceError::CloneFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(WorkspaceError::CloneFailed {
            url: url.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

async fn write_seed_files(
    files: &BTreeMap<String, String>,
    dir: &Path,
) -> Result<(), WorkspaceError> {
    for (rel_path, content) in files {
        let full_path = dir.join(rel_path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::SeedFileFailed {
                    path: rel_path.clone(),
                    message: e.to_string(),
                })?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .map_err(|e| WorkspaceError::SeedFileFailed {
                path: rel_path.clone(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

/// Installs language-specific dependencies before the agent starts.
///
/// Install time is preparatory work and is excluded from the run's
/// measured duration. Failures are warnings: a task may still be
/// attemptable without a fully resolved dependency graph.
async fn install_dependencies(task: &Task, dir: &Path) {
    let deps = match task.context.dependencies {
        Some(ref deps) if !deps.is_empty() => deps,
        _ => return,
    };

    match task.context.language.to_lowercase().as_str() {
        "typescript" | "javascript" => {
            if let Err(e) = install_node_dependencies(deps, dir).await {
                warn!("npm install failed in workspace: {}", e);
            }
        }
        "python" => {
            if let Err(e) = install_python_dependencies(deps, dir).await {
                warn!("pip install failed in workspace: {}", e);
            }
        }
        other => {
            debug!("No dependency installer for language '{}'", other);
        }
    }
}

/// Merges task dependencies into package.json and runs `npm install`.
async fn install_node_dependencies(
    deps: &BTreeMap<String, String>,
    dir: &Path,
) -> Result<(), String> {
    let pkg_path = dir.join("package.json");
    let mut pkg: serde_json::Value = match tokio::fs::read_to_string(&pkg_path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !pkg.is_object() {
        pkg = serde_json::json!({});
    }

    let existing = pkg
        .get("dependencies")
        .and_then(|d| d.as_object())
        .cloned()
        .unwrap_or_default();
    let mut merged = existing;
    for (name, version) in deps {
        merged.insert(name.clone(), serde_json::Value::String(version.clone()));
    }
    pkg["dependencies"] = serde_json::Value::Object(merged);

    let rendered = serde_json::to_string_pretty(&pkg).map_err(|e| e.to_string())?;
    tokio::fs::write(&pkg_path, rendered)
        .await
        .map_err(|e| e.to_string())?;

    run_install_command(Command::new("npm").args(["install", "--no-save"]), dir).await
}

async fn install_python_dependencies(
    deps: &BTreeMap<String, String>,
    dir: &Path,
) -> Result<(), String> {
    let specs: Vec<String> = deps
        .iter()
        .map(|(name, version)| {
            if version == "latest" {
                name.clone()
            } else {
                format!("{}{}", name, version)
            }
        })
        .collect();

    run_install_command(Command::new("pip").arg("install").args(&specs), dir).await
}

async fn run_install_command(cmd: &mut Command, dir: &Path) -> Result<(), String> {
    let child = cmd
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| e.to_string())?;

    let output = tokio::time::timeout(INSTALL_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| format!("install timed out after {:?}", INSTALL_TIMEOUT))?
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Initializes a git repository with a baseline commit of the current state.
async fn init_baseline(dir: &Path) -> Result<(), String> {
    run_git(&["init"], dir).await?;
    run_git(&["add", "-A"], dir).await?;
    run_git(&["commit", "-m", "initial", "--allow-empty"], dir).await?;
    Ok(())
}

async fn run_git(args: &[&str], dir: &Path) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "bench")
        .env("GIT_AUTHOR_EMAIL", "bench@test")
        .env("GIT_COMMITTER_NAME", "bench")
        .env("GIT_COMMITTER_EMAIL", "bench@test")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// Copies grading-only test files into the workspace.
///
/// Test sources live next to the task YAML as `<task-id>.test.<ext>` and
/// are placed at the destinations listed in `validation.test_files`, so
/// the agent never sees them during execution.
pub fn inject_test_files(task: &Task, workspace: &Path, data_dir: &Path) -> std::io::Result<()> {
    let destinations = match task.validation.test_files {
        Some(ref files) if !files.is_empty() => files,
        _ => return Ok(()),
    };

    let suite_dir = data_dir.join("tasks").join(&task.suite_id);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&suite_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| {
                    let name = name.to_string_lossy();
                    name.starts_with(&task.id) && name.contains(".test.")
                })
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    for (dest_rel, source) in destinations.iter().zip(candidates.iter()) {
        let dest = workspace.join(dest_rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &dest)?;
        debug!("Injected test file {} -> {}", source.display(), dest.display());
    }

    Ok(())
}
