//! Adapter registry: explicit harness-id → adapter wiring.
//!
//! The registry is a plain value constructed at startup and passed into
//! the orchestrator, so tests can register doubles and parallel batches
//! cannot interfere through process-wide state.

use std::collections::BTreeMap;

use thiserror::Error;

use super::{AiderAdapter, ClaudeCodeAdapter, HarnessAdapter};

/// Builds a fresh adapter instance per run.
pub type AdapterFactory = Box<dyn Fn() -> Box<dyn HarnessAdapter> + Send + Sync>;

/// Errors that can occur resolving harness ids.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown harness adapter '{id}'. Available: {available}")]
    UnknownHarness { id: String, available: String },
}

/// Maps harness ids to adapter factories.
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry with the built-in adapters registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("claude-code", || Box::new(ClaudeCodeAdapter::new()));
        registry.register("aider", || Box::new(AiderAdapter::new()));
        registry
    }

    /// Registers (or replaces) an adapter factory under `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn HarnessAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    /// Instantiates the adapter registered under `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn HarnessAdapter>, RegistryError> {
        match self.factories.get(id) {
            Some(factory) => Ok(factory()),
            None => Err(RegistryError::UnknownHarness {
                id: id.to_string(),
                available: self.ids().join(", "),
            }),
        }
    }

    /// Registered harness ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::GenericAdapter;

    #[test]
    fn test_builtin_registry() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(registry.ids(), vec!["aider", "claude-code"]);

        let adapter = registry.create("claude-code").unwrap();
        assert_eq!(adapter.id(), "claude-code");
    }

    #[test]
    fn test_unknown_id_lists_available() {
        let registry = AdapterRegistry::with_builtin();
        let err = registry.create("kiro").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("kiro"));
        assert!(message.contains("claude-code"));
        assert!(message.contains("aider"));
    }

    #[test]
    fn test_register_custom_adapter() {
        let mut registry = AdapterRegistry::new();
        registry.register("my-agent", || {
            Box::new(GenericAdapter::new("my-agent", "my-agent-cli"))
        });

        let adapter = registry.create("my-agent").unwrap();
        assert_eq!(adapter.id(), "my-agent");
        assert_eq!(registry.ids(), vec!["my-agent"]);
    }
}
