//! BMO - a home-assistant agent core
//!
//! This crate provides:
//! - Specialist agents (calendar, music, smart home, ...) sharing one runtime
//! - A fenced-block protocol for commands, tool calls and delegation
//! - Capability enforcement, keyword routing and bounded delegation
//! - CLI/REPL interface for trying agents against dry-run services

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod provider;
pub mod scratchpad;
pub mod service;
pub mod telemetry;

// Agent system
pub mod agent;
pub mod tool;
pub mod tools;

#[cfg(test)]
mod testing;

pub use auth::AuthConfig;
pub use config::Config;
pub use telemetry::Telemetry;

pub use agent::{AgentConfig, AgentRegistry, BaseAgent, Dispatcher, Router};
pub use error::{AgentError, CapabilityKind, ProviderError};
pub use events::{AgentEvent, AgentResult, ExecutedAction, StopReason};
pub use protocol::{parse_reply, ParsedReply};
pub use provider::{ChatModel, ProviderClient, ProviderConfig};
pub use scratchpad::{HistoryEntry, Scratchpad};
pub use service::{Service, ServiceRegistry};
pub use tool::{Tool, ToolRegistry};
