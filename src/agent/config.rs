//! Agent configuration types
//!
//! An agent is pure data: prompt, sampling temperature, and the capability
//! sets it may use. One generic runtime (`BaseAgent`) executes every agent.

use crate::error::AgentError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the tool listing
pub const TOOL_LIST_PLACEHOLDER: &str = "{tool_list}";

/// How the system prompt is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Template used as-is
    #[default]
    Plain,
    /// Tool descriptions substituted for `{tool_list}`, or appended when the
    /// template has no placeholder
    ToolListing,
}

/// Configuration for an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Agent name (unique identifier)
    /// When loading from YAML files, this is set from the filename.
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// What this agent handles (shown by `bmo agents`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub system_prompt: String,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tools this agent may call, in prompt order
    #[serde(default)]
    pub tools: IndexSet<String>,

    /// Services this agent's commands may reach
    #[serde(default)]
    pub services: IndexSet<String>,

    /// Command table: action -> service
    #[serde(default)]
    pub commands: IndexMap<String, String>,

    /// Model round trips per user message
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// May hand the conversation to another agent
    #[serde(default)]
    pub can_nest: bool,

    /// Prior history entries sent to the model
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub prompt_style: PromptStyle,

    /// Routing hints
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Model override (uses provider default if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub built_in: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_turns() -> usize {
    3
}

fn default_history_window() -> usize {
    6
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            system_prompt: String::new(),
            temperature: default_temperature(),
            tools: IndexSet::new(),
            services: IndexSet::new(),
            commands: IndexMap::new(),
            max_turns: default_max_turns(),
            can_nest: false,
            history_window: default_history_window(),
            prompt_style: PromptStyle::Plain,
            keywords: Vec::new(),
            model: None,
            max_tokens: None,
            built_in: false,
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        let mut config = Self::new(name);
        config.built_in = true;
        config
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }

    pub fn allows_service(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    /// Service an action routes to, if the action is in the command table and
    /// its service is declared
    pub fn service_for(&self, action: &str) -> Option<&str> {
        self.commands
            .get(action)
            .filter(|service| self.allows_service(service))
            .map(|s| s.as_str())
    }

    /// Checks that need no registry
    pub fn validate_basic(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::config("agent name must not be empty"));
        }
        if self.max_turns == 0 {
            return Err(AgentError::config(format!(
                "agent '{}': max_turns must be positive",
                self.name
            )));
        }
        if self.history_window == 0 {
            return Err(AgentError::config(format!(
                "agent '{}': history_window must be positive",
                self.name
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::config(format!(
                "agent '{}': temperature {} outside [0, 2]",
                self.name, self.temperature
            )));
        }
        if self.prompt_style == PromptStyle::Plain && self.system_prompt.contains(TOOL_LIST_PLACEHOLDER) {
            return Err(AgentError::config(format!(
                "agent '{}': prompt contains {} but prompt_style is plain",
                self.name, TOOL_LIST_PLACEHOLDER
            )));
        }
        for (action, service) in &self.commands {
            if !self.services.contains(service) {
                return Err(AgentError::config(format!(
                    "agent '{}': command '{}' routes to undeclared service '{}'",
                    self.name, action, service
                )));
            }
        }
        Ok(())
    }

    pub fn validate_tools(&self, tool_names: &[&str]) -> Result<(), AgentError> {
        match self.tools.iter().find(|t| !tool_names.contains(&t.as_str())) {
            Some(missing) => Err(AgentError::config(format!(
                "agent '{}': unknown tool '{}'",
                self.name, missing
            ))),
            None => Ok(()),
        }
    }

    pub fn validate_services(&self, service_names: &[&str]) -> Result<(), AgentError> {
        match self.services.iter().find(|s| !service_names.contains(&s.as_str())) {
            Some(missing) => Err(AgentError::config(format!(
                "agent '{}': unknown service '{}'",
                self.name, missing
            ))),
            None => Ok(()),
        }
    }

    /// Full validation against the registered tool and service names
    pub fn validate(&self, tool_names: &[&str], service_names: &[&str]) -> Result<(), AgentError> {
        self.validate_basic()?;
        self.validate_tools(tool_names)?;
        self.validate_services(service_names)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Route each action to `service`
    pub fn with_commands<I, S>(mut self, service: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            self.commands.insert(action.into(), service.to_string());
        }
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_nesting(mut self, can_nest: bool) -> Self {
        self.can_nest = can_nest;
        self
    }

    pub fn with_prompt_style(mut self, style: PromptStyle) -> Self {
        self.prompt_style = style;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Partial agent definition read from YAML. Set fields replace the base
/// config's; unset fields keep it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<IndexSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<IndexSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_nest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_style: Option<PromptStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AgentOverride {
    pub fn apply(self, mut base: AgentConfig) -> AgentConfig {
        if let Some(v) = self.display_name {
            base.display_name = Some(v);
        }
        if let Some(v) = self.description {
            base.description = Some(v);
        }
        if let Some(v) = self.system_prompt {
            base.system_prompt = v;
        }
        if let Some(v) = self.temperature {
            base.temperature = v;
        }
        if let Some(v) = self.tools {
            base.tools = v;
        }
        if let Some(v) = self.services {
            base.services = v;
        }
        if let Some(v) = self.commands {
            base.commands = v;
        }
        if let Some(v) = self.max_turns {
            base.max_turns = v;
        }
        if let Some(v) = self.can_nest {
            base.can_nest = v;
        }
        if let Some(v) = self.history_window {
            base.history_window = v;
        }
        if let Some(v) = self.prompt_style {
            base.prompt_style = v;
        }
        if let Some(v) = self.keywords {
            base.keywords = v;
        }
        if let Some(v) = self.model {
            base.model = Some(v);
        }
        if let Some(v) = self.max_tokens {
            base.max_tokens = Some(v);
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> AgentConfig {
        AgentConfig::builtin("timer")
            .with_services(["timers"])
            .with_commands("timers", ["timer_set", "timer_cancel"])
            .with_history_window(4)
    }

    #[test]
    fn test_agent_config_creation() {
        let config = AgentConfig::new("test");
        assert_eq!(config.name, "test");
        assert!(!config.built_in);
        assert!(!config.can_nest);
        assert_eq!(config.display_name(), "test");
        assert_eq!(config.prompt_style, PromptStyle::Plain);
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::builtin("design")
            .with_display_name("Design")
            .with_description("Design agent")
            .with_temperature(0.3)
            .with_tools(["read_file", "list_directory"])
            .with_prompt_style(PromptStyle::ToolListing);

        assert!(config.built_in);
        assert_eq!(config.display_name(), "Design");
        assert_eq!(config.temperature, 0.3);
        assert!(config.allows_tool("read_file"));
        assert!(!config.allows_tool("delete_system"));
        let tools: Vec<_> = config.tools.iter().map(String::as_str).collect();
        assert_eq!(tools, vec!["read_file", "list_directory"]);
    }

    #[test]
    fn test_service_for() {
        let config = timer();
        assert_eq!(config.service_for("timer_set"), Some("timers"));
        assert_eq!(config.service_for("lights_on"), None);
        assert!(config.allows_service("timers"));
        assert!(!config.allows_service("smart_home"));
    }

    #[test]
    fn test_service_for_requires_declared_service() {
        // Command table points at a service the agent never declared
        let config = AgentConfig::new("rogue").with_commands("smart_home", ["lights_on"]);
        assert_eq!(config.service_for("lights_on"), None);
        assert!(config.validate_basic().is_err());

        let config = config.with_services(["smart_home"]);
        assert_eq!(config.service_for("lights_on"), Some("smart_home"));
    }

    #[test]
    fn test_validate_ok() {
        timer().validate(&["now"], &["timers", "music"]).unwrap();
    }

    #[test]
    fn test_validate_failures() {
        let cases = vec![
            AgentConfig::new(""),
            timer().with_max_turns(0),
            timer().with_history_window(0),
            timer().with_temperature(2.5),
            timer().with_commands("smart_home", ["lights_on"]),
            timer().with_prompt("Tools: {tool_list}"),
        ];
        for config in cases {
            let err = config.validate(&[], &["timers", "smart_home"]).unwrap_err();
            assert!(matches!(err, AgentError::Configuration(_)), "{:?}", config);
        }
    }

    #[test]
    fn test_validate_unregistered_capabilities() {
        let err = timer().validate(&[], &["music"]).unwrap_err();
        assert_eq!(
            err,
            AgentError::Configuration("agent 'timer': unknown service 'timers'".into())
        );

        let design = AgentConfig::new("design").with_tools(["read_file"]);
        let err = design.validate(&["now"], &[]).unwrap_err();
        assert_eq!(
            err,
            AgentError::Configuration("agent 'design': unknown tool 'read_file'".into())
        );
    }

    #[test]
    fn test_override_merges_onto_base() {
        let yaml = "temperature: 0.2\nkeywords: [alarm]\n";
        let over: AgentOverride = serde_yaml::from_str(yaml).unwrap();
        let merged = over.apply(timer());

        assert_eq!(merged.temperature, 0.2);
        assert_eq!(merged.keywords, vec!["alarm".to_string()]);
        assert_eq!(merged.history_window, 4);
        assert_eq!(merged.service_for("timer_cancel"), Some("timers"));
    }

    #[test]
    fn test_override_rejects_unknown_fields() {
        let result: Result<AgentOverride, _> = serde_yaml::from_str("temprature: 0.2\n");
        assert!(result.is_err());
    }
}
