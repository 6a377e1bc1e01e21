//! Agent system
//!
//! - `AgentConfig`: declarative description of one agent and what it may use
//! - `BaseAgent`: a config bound to a model; one bounded model call per turn
//! - `Router`: picks the agent for a message
//! - `Dispatcher`: parses replies, enforces capabilities, runs actions,
//!   follows delegation
//! - `AgentRegistry`: built-in agents plus YAML overrides

mod base;
pub mod builtins;
mod config;
mod config_loader;
mod dispatch;
mod fixtures;
pub mod prompt;
mod registry;
pub mod router;

pub use base::*;
pub use builtins::{get_builtin_agents, DELEGATE_ACTION};
pub use config::*;
pub use config_loader::{apply_overrides, load_agent_overrides, load_override_file};
pub use dispatch::{Dispatcher, DEFAULT_MAX_NESTING_DEPTH};
pub use fixtures::*;
pub use prompt::{build_context_section, render_system_prompt};
pub use registry::AgentRegistry;
pub use router::{build_agents, KeywordPolicy, Router, RoutingPolicy};
