//! System prompt construction for agents
//!
//! The static part (template, tool listing, command table) is rendered once
//! when the agent is built. The situational part (clock, scratchpad context)
//! is appended per call.

use super::config::{AgentConfig, PromptStyle, TOOL_LIST_PLACEHOLDER};
use crate::scratchpad::Context;
use crate::tool::ToolRegistry;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde_json::Value;

/// Render the static system prompt for an agent
pub fn render_system_prompt(config: &AgentConfig, tools: &ToolRegistry) -> String {
    let mut parts = Vec::new();

    let base = match config.prompt_style {
        PromptStyle::Plain => config.system_prompt.clone(),
        PromptStyle::ToolListing => {
            let listing = tools.descriptions(config.tools.iter().map(String::as_str));
            if config.system_prompt.contains(TOOL_LIST_PLACEHOLDER) {
                config.system_prompt.replace(TOOL_LIST_PLACEHOLDER, &listing)
            } else if listing.is_empty() {
                config.system_prompt.clone()
            } else {
                format!("{}\n\nAvailable tools:\n{}", config.system_prompt, listing)
            }
        }
    };
    parts.push(base);

    if !config.tools.is_empty() {
        parts.push(tool_call_usage());
    }

    if let Some(commands) = command_section(config) {
        parts.push(commands);
    }

    parts.retain(|p| !p.trim().is_empty());
    parts.join("\n\n")
}

fn tool_call_usage() -> String {
    [
        "To use a tool, reply with a block like this and wait for the result:",
        "```tool_call",
        r#"{"tool": "<name>", "args": {}}"#,
        "```",
    ]
    .join("\n")
}

/// Document the command table, grouped by service
fn command_section(config: &AgentConfig) -> Option<String> {
    if config.commands.is_empty() {
        return None;
    }

    let mut by_service: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (action, service) in &config.commands {
        by_service.entry(service.as_str()).or_default().push(action.as_str());
    }

    let mut lines = vec![
        "To make something happen, include a command block in your reply:".to_string(),
        "```command".to_string(),
        r#"{"action": "<action>", "params": {}}"#.to_string(),
        "```".to_string(),
        "Available actions:".to_string(),
    ];
    for (service, actions) in by_service {
        lines.push(format!("- {}: {}", service, actions.join(", ")));
    }

    Some(lines.join("\n"))
}

/// Situational section: current time and each context entry
pub fn build_context_section(context: &Context, now: DateTime<Local>) -> String {
    let mut lines = vec![
        "Here is what you know about the current situation:".to_string(),
        "<context>".to_string(),
        format!("  Current time: {}", now.format("%Y-%m-%d %H:%M (%A)")),
    ];

    for (key, value) in context {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("  {}: {}", key, rendered));
    }

    lines.push("</context>".to_string());
    lines.join("\n")
}
