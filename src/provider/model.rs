//! The seam between agents and LLM backends

use crate::error::ProviderError;
use crate::scratchpad::HistoryEntry;
use async_trait::async_trait;
use serde::Serialize;

/// Per-call sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionParams {
    /// Model override; the backend default is used when `None`
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// A chat-completion backend. Returns the assistant reply text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name, recorded in traces
    fn provider_name(&self) -> &str;

    fn default_model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[HistoryEntry],
        params: &CompletionParams,
    ) -> Result<String, ProviderError>;
}
