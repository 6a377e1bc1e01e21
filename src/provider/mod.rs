//! LLM Provider layer
//!
//! `ChatModel` is what agents talk to; `ProviderClient` implements it for any
//! API compatible with OpenAI chat completions.

mod client;
mod config;
mod model;

pub use client::*;
pub use config::*;
pub use model::*;
