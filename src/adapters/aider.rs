//! Aider adapter.
//!
//! Runs aider in scripted mode (no git, no auto-commits) and scrapes its
//! stderr summary lines for token counts and cost.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use super::exec::{BoundedCommand, ProcessOutcome};
use super::{
    result_from_outcome, AdapterMetrics, ExecutionConfig, ExecutionResult, HarnessAdapter,
    SetupStatus,
};
use crate::schema::Task;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for the Aider CLI.
#[derive(Debug)]
pub struct AiderAdapter {
    command: String,
}

impl AiderAdapter {
    pub fn new() -> Self {
        Self {
            command: "aider".to_string(),
        }
    }

    /// Creates with a custom binary path.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for AiderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HarnessAdapter for AiderAdapter {
    fn id(&self) -> &str {
        "aider"
    }

    fn name(&self) -> &str {
        "Aider"
    }

    async fn setup(&self) -> SetupStatus {
        let outcome = BoundedCommand::new(&self.command)
            .arg("--version")
            .with_timeout(VERSION_PROBE_TIMEOUT)
            .run()
            .await;

        match outcome {
            ProcessOutcome::Completed {
                exit_code: 0,
                stdout,
                ..
            } => SetupStatus::ready(stdout.trim()),
            _ => SetupStatus::not_ready("Aider CLI not found"),
        }
    }

    async fn run(&self, task: &Task, config: &ExecutionConfig) -> ExecutionResult {
        let start = Instant::now();

        info!(
            "Starting aider on task {} in {}",
            task.id,
            config.workspace.display()
        );

        // Workspace changes are tracked by the provisioner's baseline, so
        // aider's own git integration stays off.
        let outcome = BoundedCommand::new(&self.command)
            .args([
                "--message",
                task.prompt.as_str(),
                "--model",
                config.model.as_str(),
                "--yes-always",
                "--no-git",
                "--no-auto-commits",
            ])
            .current_dir(&config.workspace)
            .envs(&config.env)
            .with_timeout(config.timeout)
            .run()
            .await;

        result_from_outcome(outcome, start.elapsed())
    }

    async fn collect_metrics(&self, artifacts: &super::ExecutionArtifacts) -> AdapterMetrics {
        let mut metrics = AdapterMetrics {
            turns: 1,
            ..AdapterMetrics::default()
        };

        if let Ok(tokens) = Regex::new(r"(?is)Tokens:\s*([\d,]+)\s*sent.*?([\d,]+)\s*received") {
            if let Some(caps) = tokens.captures(&artifacts.stderr) {
                metrics.tokens_input = parse_count(&caps[1]);
                metrics.tokens_output = parse_count(&caps[2]);
            }
        }

        if let Ok(cost) = Regex::new(r"(?i)Cost:\s*\$?([\d.]+)") {
            if let Some(caps) = cost.captures(&artifacts.stderr) {
                metrics.cost_usd = caps[1].parse().unwrap_or(0.0);
            }
        }

        metrics
    }
}

fn parse_count(raw: &str) -> u64 {
    raw.replace(',', "").parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ExecutionArtifacts;

    #[tokio::test]
    async fn test_collect_metrics_scrapes_summary() {
        let adapter = AiderAdapter::new();
        let artifacts = ExecutionArtifacts {
            stderr: "Tokens: 12,450 sent, 2,831 received.\nCost: $0.0861 session.\n".to_string(),
            ..ExecutionArtifacts::default()
        };

        let metrics = adapter.collect_metrics(&artifacts).await;
        assert_eq!(metrics.tokens_input, 12_450);
        assert_eq!(metrics.tokens_output, 2_831);
        assert_eq!(metrics.cost_usd, 0.0861);
        assert_eq!(metrics.turns, 1);
    }

    #[tokio::test]
    async fn test_collect_metrics_zeroes_without_summary() {
        let adapter = AiderAdapter::new();
        let artifacts = ExecutionArtifacts {
            stderr: "aider crashed before printing anything useful".to_string(),
            ..ExecutionArtifacts::default()
        };

        let metrics = adapter.collect_metrics(&artifacts).await;
        assert_eq!(metrics.tokens_input, 0);
        assert_eq!(metrics.tokens_output, 0);
        assert_eq!(metrics.cost_usd, 0.0);
    }
}
