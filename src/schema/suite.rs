//! Suite definitions: named collections of related tasks.

use serde::{Deserialize, Serialize};

/// Broad category of work a suite exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteCategory {
    BugFix,
    FeatureAdd,
    Refactor,
    Optimization,
    TestWriting,
    Docs,
    Mixed,
}

/// Difficulty classification shared by suites and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        };
        f.write_str(name)
    }
}

/// A named collection of related tasks, defined in `suite.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: SuiteCategory,
    pub difficulty: Difficulty,
    pub author: String,
    pub tags: Vec<String>,
    pub task_ids: Vec<String>,
    pub version: String,
}

impl Suite {
    /// Checks invariants that typed deserialization cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("suite id must be non-empty".to_string());
        }
        Ok(())
    }
}
