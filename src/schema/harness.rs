//! Harness definitions: the external agents a benchmark can invoke.

use serde::{Deserialize, Serialize};

/// How a harness is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarnessExecutor {
    Cli,
    Api,
    Docker,
    Manual,
}

impl std::fmt::Display for HarnessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HarnessExecutor::Cli => "cli",
            HarnessExecutor::Api => "api",
            HarnessExecutor::Docker => "docker",
            HarnessExecutor::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Feature flags describing what a harness can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessCapabilities {
    pub streaming: bool,
    pub multifile: bool,
    pub code_execution: bool,
    pub web_search: bool,
    pub shell_access: bool,
}

impl HarnessCapabilities {
    /// Names of the capabilities that are enabled.
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut caps = Vec::new();
        if self.streaming {
            caps.push("streaming");
        }
        if self.multifile {
            caps.push("multifile");
        }
        if self.code_execution {
            caps.push("code-execution");
        }
        if self.web_search {
            caps.push("web-search");
        }
        if self.shell_access {
            caps.push("shell-access");
        }
        caps
    }
}

/// A harness definition loaded from `data/harnesses/*.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Harness {
    pub id: String,
    pub name: String,
    pub version: String,
    pub provider: String,
    pub executor: HarnessExecutor,
    /// Binary invoked for CLI executors.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    pub capabilities: HarnessCapabilities,
}

impl Harness {
    /// Checks invariants that typed deserialization cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("harness id must be non-empty".to_string());
        }
        Ok(())
    }
}
