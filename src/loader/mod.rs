//! YAML definition loading.
//!
//! Tasks, suites, harnesses and models live as YAML files under a data
//! directory:
//!
//! ```text
//! data/
//!   tasks/<suite-id>/<task>.yaml      (+ suite.yaml, + <task-id>.test.<ext>)
//!   harnesses/*.yaml
//!   models/*.yaml
//! ```
//!
//! Loading is strict: files that fail typed deserialization or the
//! post-parse validation checks are rejected here, so the orchestrator
//! only ever sees well-formed definitions.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::schema::{Harness, Model, Suite, Task};

/// Errors that can occur while loading definitions.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Invalid definition in '{path}': {message}")]
    Validation { path: String, message: String },
}

fn load_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, LoaderError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|e| LoaderError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn validated<T>(
    path: &Path,
    value: T,
    validate: impl Fn(&T) -> Result<(), String>,
) -> Result<T, LoaderError> {
    validate(&value).map_err(|message| LoaderError::Validation {
        path: path.display().to_string(),
        message,
    })?;
    Ok(value)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn yaml_files_in(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml(path))
        .collect();
    files.sort();
    files
}

/// Loads every task definition under `data/tasks/`, flat or per-suite.
pub fn load_tasks(data_dir: &Path) -> Result<Vec<Task>, LoaderError> {
    let tasks_dir = data_dir.join("tasks");
    if !tasks_dir.exists() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::new();
    for entry in WalkDir::new(&tasks_dir)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !path.is_file() || !is_yaml(path) {
            continue;
        }
        // Suite manifests live alongside the tasks.
        if path.file_stem().and_then(|s| s.to_str()) == Some("suite") {
            continue;
        }

        let task: Task = load_yaml_file(path)?;
        tasks.push(validated(path, task, Task::validate)?);
    }

    debug!("Loaded {} task(s) from {}", tasks.len(), tasks_dir.display());
    Ok(tasks)
}

/// Loads every `suite.yaml` under `data/tasks/<suite-id>/`.
pub fn load_suites(data_dir: &Path) -> Result<Vec<Suite>, LoaderError> {
    let tasks_dir = data_dir.join("tasks");
    if !tasks_dir.exists() {
        return Ok(Vec::new());
    }

    let mut suites = Vec::new();
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&tasks_dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let suite_file = dir.join("suite.yaml");
        if suite_file.exists() {
            let suite: Suite = load_yaml_file(&suite_file)?;
            suites.push(validated(&suite_file, suite, Suite::validate)?);
        }
    }

    Ok(suites)
}

/// Loads every harness definition under `data/harnesses/`.
pub fn load_harnesses(data_dir: &Path) -> Result<Vec<Harness>, LoaderError> {
    let mut harnesses = Vec::new();
    for path in yaml_files_in(&data_dir.join("harnesses")) {
        let harness: Harness = load_yaml_file(&path)?;
        harnesses.push(validated(&path, harness, Harness::validate)?);
    }
    Ok(harnesses)
}

/// Loads every model definition under `data/models/`.
pub fn load_models(data_dir: &Path) -> Result<Vec<Model>, LoaderError> {
    let mut models = Vec::new();
    for path in yaml_files_in(&data_dir.join("models")) {
        let model: Model = load_yaml_file(&path)?;
        models.push(validated(&path, model, Model::validate)?);
    }
    Ok(models)
}

/// Resolves (and creates if missing) the data directory.
pub fn resolve_data_dir(base: Option<&Path>) -> std::io::Result<PathBuf> {
    let base = match base {
        Some(base) => base.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let data_dir = base.join("data");
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
    }
    Ok(data_dir)
}
