//! OpenAI-compatible provider client
//!
//! Non-streaming chat completions over raw HTTP. Messages are built with
//! async-openai request types and serialized into the request body, so any
//! server that speaks `/chat/completions` works (OpenAI, OpenRouter,
//! LM Studio, llama.cpp, vLLM).

use super::{ChatModel, CompletionParams, ProviderConfig};
use crate::auth::AuthConfig;
use crate::error::ProviderError;
use crate::scratchpad::{HistoryEntry, Role};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Instant;

#[derive(Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl ProviderClient {
    /// Create a client, resolving the API key from the environment or auth.json
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = Self::get_api_key(&config)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: ProviderConfig, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key: api_key.into(),
            http_client,
        })
    }

    /// API key from environment (after .env) or $XDG_DATA_HOME/bmo/auth.json
    fn get_api_key(config: &ProviderConfig) -> Result<String, ProviderError> {
        let _ = dotenvy::dotenv();

        if let Ok(key) = std::env::var(&config.api_key_env) {
            return Ok(key);
        }

        if let Ok(auth) = AuthConfig::load() {
            if let Some(key) = auth.key_for(&config.auth_key()) {
                return Ok(key.to_string());
            }
        }

        Err(ProviderError::MissingApiKey(config.api_key_env.clone()))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn to_request_message(entry: &HistoryEntry) -> Result<ChatCompletionRequestMessage, ProviderError> {
        let built = match entry.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(entry.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::System),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(entry.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::User),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(entry.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
        };
        built.map_err(|e| ProviderError::Malformed(format!("Failed to build message: {}", e)))
    }

    fn build_body(&self, messages: &[HistoryEntry], params: &CompletionParams) -> Result<Value, ProviderError> {
        let model = params.model.as_deref().unwrap_or(&self.config.default_model);

        let messages_json = messages
            .iter()
            .map(|m| {
                let msg = Self::to_request_message(m)?;
                serde_json::to_value(&msg).map_err(|e| ProviderError::Malformed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages_json,
            "temperature": params.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        Ok(body)
    }

    fn extract_content(body: &Value) -> Result<String, ProviderError> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Malformed("No content in response".to_string()))
    }
}

#[async_trait]
impl ChatModel for ProviderClient {
    fn provider_name(&self) -> &str {
        &self.config.name
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(
        &self,
        messages: &[HistoryEntry],
        params: &CompletionParams,
    ) -> Result<String, ProviderError> {
        let body = self.build_body(messages, params)?;
        let model = body["model"].as_str().unwrap_or_default().to_string();

        let start = Instant::now();
        tracing::debug!(
            target: "llm",
            provider = %self.config.name,
            model = %model,
            message_count = messages.len(),
            "Starting LLM call"
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "llm", error = %e, "LLM request failed");
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            tracing::warn!(target: "llm", retry_after = ?retry_after, elapsed_ms, "LLM call rate limited");
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                target: "llm",
                status = %status,
                error = %text,
                elapsed_ms,
                "LLM call returned error"
            );
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

        let usage = response_body.get("usage");
        let input_tokens = usage.and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_u64());
        let output_tokens = usage.and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_u64());

        let content = Self::extract_content(&response_body)?;

        tracing::info!(
            target: "llm",
            model = %model,
            elapsed_ms,
            input_tokens = input_tokens,
            output_tokens = output_tokens,
            "LLM call completed"
        );

        Ok(content)
    }
}
