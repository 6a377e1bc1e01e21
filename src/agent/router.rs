//! Agent selection
//!
//! The router owns one `BaseAgent` per name and picks which one handles a
//! message. An explicit hint always wins; otherwise a `RoutingPolicy`
//! decides, falling back to the default agent.

use super::base::BaseAgent;
use super::config::AgentConfig;
use crate::error::AgentError;
use crate::provider::ChatModel;
use crate::service::ServiceRegistry;
use crate::tool::ToolRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Picks an agent for a message. Must be deterministic.
pub trait RoutingPolicy: Send + Sync {
    /// `agents` are sorted by name. `None` means "use the default agent".
    fn choose(&self, message: &str, agents: &[&AgentConfig]) -> Option<String>;
}

/// Scores agents by whole-word, case-insensitive keyword hits.
/// Ties go to the alphabetically first agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPolicy;

impl KeywordPolicy {
    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    /// Occurrences of `keyword` (possibly several words) in `words`
    fn hits(words: &[String], keyword: &str) -> usize {
        let phrase = Self::words(keyword);
        if phrase.is_empty() || phrase.len() > words.len() {
            return 0;
        }
        words.windows(phrase.len()).filter(|w| *w == phrase.as_slice()).count()
    }

    pub fn score(message: &str, config: &AgentConfig) -> usize {
        let words = Self::words(message);
        config.keywords.iter().map(|k| Self::hits(&words, k)).sum()
    }
}

impl RoutingPolicy for KeywordPolicy {
    fn choose(&self, message: &str, agents: &[&AgentConfig]) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for agent in agents {
            let score = Self::score(message, agent);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((agent.name.as_str(), score));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

pub struct Router {
    agents: BTreeMap<String, BaseAgent>,
    default_agent: String,
    policy: Box<dyn RoutingPolicy>,
}

impl Router {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            agents: BTreeMap::new(),
            default_agent: default_agent.into(),
            policy: Box::new(KeywordPolicy),
        }
    }

    /// Build a router from agents; the default agent must be among them
    pub fn with_agents(
        default_agent: impl Into<String>,
        agents: impl IntoIterator<Item = BaseAgent>,
    ) -> Result<Self, AgentError> {
        let mut router = Self::new(default_agent);
        for agent in agents {
            router.add(agent)?;
        }
        if !router.agents.contains_key(&router.default_agent) {
            return Err(AgentError::config(format!(
                "default agent '{}' is not registered",
                router.default_agent
            )));
        }
        Ok(router)
    }

    pub fn with_policy(mut self, policy: impl RoutingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Add an agent. Names are unique.
    pub fn add(&mut self, agent: BaseAgent) -> Result<(), AgentError> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(AgentError::config(format!("duplicate agent name '{}'", name)));
        }
        self.agents.insert(name, agent);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BaseAgent> {
        self.agents.get(name)
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    /// Agent names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn agents(&self) -> impl Iterator<Item = &BaseAgent> {
        self.agents.values()
    }

    /// Pick the agent for `message`
    pub fn select(&self, message: &str, hint: Option<&str>) -> Result<&BaseAgent, AgentError> {
        if let Some(hint) = hint {
            return self
                .agents
                .get(hint)
                .ok_or_else(|| AgentError::UnknownAgent(hint.to_string()));
        }

        let configs: Vec<&AgentConfig> = self.agents.values().map(|a| a.config()).collect();
        let chosen = self
            .policy
            .choose(message, &configs)
            .filter(|name| self.agents.contains_key(name))
            .unwrap_or_else(|| self.default_agent.clone());

        tracing::debug!(agent = %chosen, "Routed message");

        self.agents
            .get(&chosen)
            .ok_or(AgentError::UnknownAgent(chosen))
    }
}

/// Construct agents from configs, checking every tool and service they name
/// is registered. Output is sorted by name.
pub fn build_agents(
    configs: impl IntoIterator<Item = AgentConfig>,
    model: Arc<dyn ChatModel>,
    tools: &ToolRegistry,
    services: &ServiceRegistry,
) -> Result<Vec<BaseAgent>, AgentError> {
    let service_names = services.names();
    let mut configs: Vec<_> = configs.into_iter().collect();
    configs.sort_by(|a, b| a.name.cmp(&b.name));

    configs
        .into_iter()
        .map(|config| {
            config.validate_services(&service_names)?;
            BaseAgent::new(config, model.clone(), tools)
        })
        .collect()
}
