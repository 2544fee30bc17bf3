//! Model definitions: the LLMs a harness can be paired with.

use serde::{Deserialize, Serialize};

/// Model vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Anthropic,
    Openai,
    Google,
    Other,
}

/// Per-million-token pricing used for cost estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default)]
    pub cache_write_per_million: Option<f64>,
    #[serde(default)]
    pub cache_read_per_million: Option<f64>,
}

/// A model definition loaded from `data/models/*.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub family: String,
    pub pricing: ModelPricing,
    pub context_window: u64,
    pub max_output: u64,
}

impl Model {
    /// Checks invariants that typed deserialization cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("model id must be non-empty".to_string());
        }
        Ok(())
    }
}
