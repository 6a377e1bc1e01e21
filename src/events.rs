//! Agent events and results
//!
//! Events are emitted while a message is being handled and consumed by
//! output adapters (the CLI today). `AgentResult` is what a dispatch returns.

use crate::error::AgentError;
use crate::protocol::{presentation_tags, ParseError, PresentationTag};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Events emitted during dispatch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Router picked an agent
    Routed {
        agent: String,
        hinted: bool,
    },
    /// Agent hop started (entering the turn loop)
    TurnStart {
        agent: String,
        depth: usize,
    },
    /// Model replied
    ModelReply {
        agent: String,
        turn: usize,
        text: String,
        latency_ms: u64,
    },
    ActionStart {
        agent: String,
        kind: ActionKind,
        name: String,
        arguments: Value,
    },
    ActionEnd {
        agent: String,
        kind: ActionKind,
        name: String,
        output: String,
        is_error: bool,
        duration_ms: u64,
    },
    /// Malformed protocol block skipped
    ParseError {
        agent: String,
        error: String,
    },
    Delegation {
        from: String,
        to: String,
        depth: usize,
    },
    /// Agent hop finished
    TurnComplete {
        agent: String,
        reason: StopReason,
    },
    Error {
        agent: String,
        error: String,
    },
    Cancelled {
        agent: String,
    },
}

/// Why a dispatch stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Model replied without further tool calls
    TextResponse,
    /// Tool loop used every allowed turn
    MaxTurns,
    /// A delegation would have exceeded the depth limit
    NestingLimitExceeded,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TextResponse => write!(f, "text_response"),
            StopReason::MaxTurns => write!(f, "max_turns"),
            StopReason::NestingLimitExceeded => write!(f, "nesting_limit_exceeded"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tool,
    Command,
    Delegation,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Tool => write!(f, "tool"),
            ActionKind::Command => write!(f, "command"),
            ActionKind::Delegation => write!(f, "delegation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Tool output, or the service response rendered as JSON
    Completed(String),
    Failed(AgentError),
}

impl ActionOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ActionOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&AgentError> {
        match self {
            ActionOutcome::Failed(e) => Some(e),
            ActionOutcome::Completed(_) => None,
        }
    }

    /// Output on success, error message on failure
    pub fn text(&self) -> String {
        match self {
            ActionOutcome::Completed(out) => out.clone(),
            ActionOutcome::Failed(e) => e.to_string(),
        }
    }
}

/// A command, tool call or delegation attempted during a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedAction {
    /// Agent whose reply contained the block
    pub agent: String,
    pub kind: ActionKind,
    /// Tool name, action name, or delegation target
    pub name: String,
    /// Service the action routed to, for commands
    pub service: Option<String>,
    pub arguments: Map<String, Value>,
    pub outcome: ActionOutcome,
    pub duration_ms: u64,
}

/// Output of one `BaseAgent::run` or dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    /// Display text: blocks removed, presentation tags kept
    pub text: String,
    /// Last model reply, verbatim
    pub raw_text: String,
    /// Agent that produced `text`
    pub agent_name: String,
    pub actions: Vec<ExecutedAction>,
    pub parse_errors: Vec<ParseError>,
    pub tags: Vec<PresentationTag>,
    /// Model round trips across all hops
    pub turns: usize,
    /// Agents visited, in order
    pub delegation_chain: Vec<String>,
    pub stop_reason: StopReason,
}

impl AgentResult {
    /// Result for a single unprocessed reply
    pub fn from_reply(agent_name: impl Into<String>, reply: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        let reply = reply.into();
        Self {
            text: reply.clone(),
            raw_text: reply.clone(),
            delegation_chain: vec![agent_name.clone()],
            agent_name,
            actions: Vec::new(),
            parse_errors: Vec::new(),
            tags: presentation_tags(&reply),
            turns: 1,
            stop_reason: StopReason::TextResponse,
        }
    }

    /// Actions that did not complete
    pub fn failed_actions(&self) -> impl Iterator<Item = &ExecutedAction> {
        self.actions.iter().filter(|a| !a.outcome.is_ok())
    }
}
