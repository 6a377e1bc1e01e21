//! Tool system
//!
//! Tools are read-only capabilities an agent can call with a `tool_call`
//! block. They implement the `Tool` trait and are registered with
//! `ToolRegistry`; which agent may call which tool is decided by the
//! dispatcher, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tool definition (name, description, JSON schema for args)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("{tool}: {message}")]
    Failed { tool: String, message: String },
    #[error("cancelled")]
    Cancelled,
}

/// Context passed to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Agent that issued the call
    pub agent: String,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(agent: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            agent: agent.into(),
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used for dispatch and capability checks)
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;

    /// Short summary of a call, fed back to the model on the next turn.
    ///
    /// Default implementation uses tool name + truncated args.
    fn humanize(&self, args: &Value, result: &ToolResult) -> String {
        if result.is_error {
            format!("{} failed: {}", self.name(), truncate(&result.output, 100))
        } else {
            format!("{}({})", self.name(), summarize_args(args))
        }
    }
}

fn summarize_args(args: &Value) -> String {
    match args {
        Value::Object(map) => map
            .iter()
            .take(2)
            .map(|(k, v)| {
                let val = match v {
                    Value::String(s) => truncate(s, 30),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => "...".to_string(),
                };
                format!("{}={}", k, val)
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => "...".to_string(),
    }
}

/// Truncate on a char boundary, appending an ellipsis
pub(crate) fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Registry of available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Render a `- name: description` listing for the given tools, in the
    /// order given. Unregistered names are skipped.
    pub fn descriptions<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> String {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                let def = tool.definition();
                let summary = def.description.lines().next().unwrap_or_default();
                format!("- {}: {}", def.name, summary)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execute a tool by name
    pub async fn invoke(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        if ctx.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let result = tool.execute(args, ctx).await;
        if result.is_error {
            Err(ToolError::Failed {
                tool: name.to_string(),
                message: result.output,
            })
        } else {
            Ok(result.output)
        }
    }

    pub fn humanize(&self, name: &str, args: &Value, result: &ToolResult) -> Option<String> {
        self.get(name).map(|tool| tool.humanize(args, result))
    }
}
