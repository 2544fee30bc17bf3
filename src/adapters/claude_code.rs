//! Claude Code adapter.
//!
//! Invokes the `claude` CLI in non-interactive print mode and reads the
//! JSON result envelope it emits for token usage and cost.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use super::exec::{BoundedCommand, ProcessOutcome};
use super::{
    result_from_outcome, AdapterMetrics, ExecutionConfig, ExecutionResult, HarnessAdapter,
    SetupStatus,
};
use crate::schema::Task;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for the Claude Code CLI.
#[derive(Debug)]
pub struct ClaudeCodeAdapter {
    command: String,
}

impl ClaudeCodeAdapter {
    pub fn new() -> Self {
        Self {
            command: "claude".to_string(),
        }
    }

    /// Creates with a custom binary path.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for ClaudeCodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HarnessAdapter for ClaudeCodeAdapter {
    fn id(&self) -> &str {
        "claude-code"
    }

    fn name(&self) -> &str {
        "Claude Code CLI"
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
            _ => SetupStatus::not_ready("Claude Code CLI not found"),
        }
    }

    async fn run(&self, task: &Task, config: &ExecutionConfig) -> ExecutionResult {
        let start = Instant::now();

        info!(
            "Starting claude-code on task {} in {}",
            task.id,
            config.workspace.display()
        );

        let outcome = BoundedCommand::new(&self.command)
            .args([
                "--print",
                task.prompt.as_str(),
                "--model",
                config.model.as_str(),
                "--output-format",
                "json",
            ])
            .current_dir(&config.workspace)
            .envs(&config.env)
            .with_timeout(config.timeout)
            .run()
            .await;

        result_from_outcome(outcome, start.elapsed())
    }

    async fn collect_metrics(&self, artifacts: &super::ExecutionArtifacts) -> AdapterMetrics {
        match serde_json::from_str::<serde_json::Value>(&artifacts.stdout) {
            Ok(data) => {
                let usage = data.get("usage");
                let count = |value: Option<&serde_json::Value>| {
                    value.and_then(|v| v.as_u64()).unwrap_or(0)
                };

                AdapterMetrics {
                    tokens_input: count(usage.and_then(|u| u.get("input_tokens"))),
                    tokens_output: count(usage.and_then(|u| u.get("output_tokens"))),
                    tokens_cache_write: usage
                        .and_then(|u| u.get("cache_creation_input_tokens"))
                        .and_then(|v| v.as_u64()),
                    tokens_cache_read: usage
                        .and_then(|u| u.get("cache_read_input_tokens"))
                        .and_then(|v| v.as_u64()),
                    tool_calls: count(data.get("num_tool_uses")),
                    tool_calls_by_type: None,
                    turns: data.get("num_turns").and_then(|v| v.as_u64()).unwrap_or(1),
                    cost_usd: data.get("cost_usd").and_then(|v| v.as_f64()).unwrap_or(0.0),
                }
            }
            Err(_) => AdapterMetrics {
                turns: 1,
                ..AdapterMetrics::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ExecutionArtifacts;

    #[tokio::test]
    async fn test_collect_metrics_parses_result_envelope() {
        let adapter = ClaudeCodeAdapter::new();
        let artifacts = ExecutionArtifacts {
            stdout: r#"{
                "usage": {
                    "input_tokens": 1500,
                    "output_tokens": 320,
                    "cache_creation_input_tokens": 800,
                    "cache_read_input_tokens": 12000
                },
                "num_tool_uses": 9,
                "num_turns": 4,
                "cost_usd": 0.42
            }"#
            .to_string(),
            ..ExecutionArtifacts::default()
        };

        let metrics = adapter.collect_metrics(&artifacts).await;
        assert_eq!(metrics.tokens_input, 1500);
        assert_eq!(metrics.tokens_output, 320);
        assert_eq!(metrics.tokens_cache_write, Some(800));
        assert_eq!(metrics.tokens_cache_read, Some(12000));
        assert_eq!(metrics.tool_calls, 9);
        assert_eq!(metrics.turns, 4);
        assert_eq!(metrics.cost_usd, 0.42);
    }

    #[tokio::test]
    async fn test_collect_metrics_zeroes_on_garbage() {
        let adapter = ClaudeCodeAdapter::new();
        let artifacts = ExecutionArtifacts {
            stdout: "not json at all".to_string(),
            ..ExecutionArtifacts::default()
        };

        let metrics = adapter.collect_metrics(&artifacts).await;
        assert_eq!(metrics.tokens_input, 0);
        assert_eq!(metrics.tokens_output, 0);
        assert_eq!(metrics.tool_calls, 0);
        assert_eq!(metrics.turns, 1);
        assert_eq!(metrics.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_setup_reports_missing_binary() {
        let adapter = ClaudeCodeAdapter::with_command("harness-bench-no-such-claude");
        let status = adapter.setup().await;
        assert!(!status.ready);
        assert!(status.error.is_some());
    }
}
