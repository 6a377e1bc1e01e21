//! Agent registry for managing and loading agents
//!
//! Loads agents from:
//! 1. Built-in agents (calendar, conversation, design, ...)
//! 2. YAML overrides: ~/.config/bmo/agents/*.yaml and .bmo/agents/*.yaml

use super::builtins::get_builtin_agents;
use super::config::AgentConfig;
use super::config_loader::{apply_overrides, load_agent_overrides};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Agent registry - manages all available agent definitions
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, AgentConfig>>>,
}

impl AgentRegistry {
    /// Create a new agent registry with built-in agents only
    pub fn new() -> Self {
        Self::from_agents(get_builtin_agents())
    }

    /// Create registry and apply overrides from config directories
    ///
    /// Loading order (later overrides earlier):
    /// 1. Built-in agents
    /// 2. YAML configs: ~/.config/bmo/agents/*.yaml (global)
    /// 3. YAML configs: .bmo/agents/*.yaml (project)
    ///
    /// A malformed YAML file fails the whole load.
    pub fn new_with_config(working_dir: &Path) -> anyhow::Result<Self> {
        let mut agents = get_builtin_agents();
        let overrides = load_agent_overrides(working_dir)?;
        if !overrides.is_empty() {
            tracing::debug!(count = overrides.len(), "Applying agent overrides");
        }
        apply_overrides(&mut agents, overrides);
        Ok(Self::from_agents(agents))
    }

    fn from_agents(agents: HashMap<String, AgentConfig>) -> Self {
        Self {
            agents: Arc::new(RwLock::new(agents)),
        }
    }

    /// Get an agent by name
    pub async fn get(&self, name: &str) -> Option<AgentConfig> {
        let agents = self.agents.read().await;
        agents.get(name).cloned()
    }

    /// Get all agents, sorted by name
    pub async fn get_all(&self) -> Vec<AgentConfig> {
        let agents = self.agents.read().await;
        let mut all: Vec<_> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn exists(&self, name: &str) -> bool {
        let agents = self.agents.read().await;
        agents.contains_key(name)
    }

    pub async fn count(&self) -> usize {
        let agents = self.agents.read().await;
        agents.len()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
