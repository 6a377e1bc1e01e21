//! Error taxonomy for the agent core
//!
//! Syntax failures (`Parse`) are recovered per block. Capability, tool, service
//! and nesting failures are recorded on the action that caused them. Transport
//! failures (`ModelUnavailable`, `RateLimited`) fail the whole turn.

use crate::protocol::ParseError;
use serde::Serialize;
use std::fmt;

/// What kind of capability a denied invocation asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Command,
    Delegation,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Tool => write!(f, "tool"),
            CapabilityKind::Command => write!(f, "command"),
            CapabilityKind::Delegation => write!(f, "delegation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("model unavailable for agent '{agent}': {reason}")]
    ModelUnavailable { agent: String, reason: String },

    #[error("model rate limited for agent '{agent}'")]
    RateLimited {
        agent: String,
        retry_after: Option<u64>,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("agent '{agent}' is not permitted to use {kind} '{name}'")]
    CapabilityDenied {
        agent: String,
        kind: CapabilityKind,
        name: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("delegation depth {depth} exceeds limit {limit}")]
    NestingLimitExceeded { depth: usize, limit: usize },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("service '{service}' failed: {message}")]
    Service { service: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn denied(agent: &str, kind: CapabilityKind, name: &str) -> Self {
        AgentError::CapabilityDenied {
            agent: agent.to_string(),
            kind,
            name: name.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AgentError::Configuration(message.into())
    }

    /// Failures that fail the turn rather than a single action
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AgentError::ModelUnavailable { .. } | AgentError::RateLimited { .. }
        )
    }
}

/// Errors raised by an LLM provider
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<u64> },
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0} not found in environment or auth.json")]
    MissingApiKey(String),
}

impl ProviderError {
    /// Map a provider failure onto the agent-level taxonomy
    pub fn into_agent_error(self, agent: &str) -> AgentError {
        match self {
            ProviderError::RateLimited { retry_after } => AgentError::RateLimited {
                agent: agent.to_string(),
                retry_after,
            },
            other => AgentError::ModelUnavailable {
                agent: agent.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_to_rate_limited() {
        let err = ProviderError::RateLimited {
            retry_after: Some(30),
        }
        .into_agent_error("music");
        assert_eq!(
            err,
            AgentError::RateLimited {
                agent: "music".to_string(),
                retry_after: Some(30)
            }
        );
        assert!(err.is_transport());
    }

    #[test]
    fn test_other_provider_errors_map_to_unavailable() {
        for provider_err in [
            ProviderError::Timeout,
            ProviderError::Transport("connection reset".into()),
            ProviderError::Malformed("no choices".into()),
            ProviderError::Status {
                status: 500,
                body: "boom".into(),
            },
        ] {
            let err = provider_err.into_agent_error("timer");
            assert!(matches!(err, AgentError::ModelUnavailable { ref agent, .. } if agent == "timer"));
        }
    }

    #[test]
    fn test_parse_error_converts_transparently() {
        fn strict(reply: &str) -> Result<usize, AgentError> {
            let parsed = crate::protocol::parse_reply(reply);
            if let Some(error) = parsed.errors().next() {
                return Err(error.clone().into());
            }
            Ok(parsed.blocks.len())
        }

        assert_eq!(strict("plain text"), Ok(0));
        let err = strict("```command\n{oops}\n```").unwrap_err();
        assert!(matches!(err, AgentError::Parse(ref e) if e.index == 0));
        assert!(err.to_string().starts_with("malformed command block #0"));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_capability_denied_message() {
        let err = AgentError::denied("design", CapabilityKind::Tool, "delete_system");
        assert_eq!(
            err.to_string(),
            "agent 'design' is not permitted to use tool 'delete_system'"
        );
        assert!(!err.is_transport());
    }
}
