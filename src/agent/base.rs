//! BaseAgent - the one runtime every agent shares
//!
//! A `BaseAgent` is an `AgentConfig` bound to a model. It assembles the
//! prompt, windows history, and makes a single bounded model call. It never
//! parses or executes protocol blocks; that is the dispatcher's job.

use super::config::AgentConfig;
use super::prompt::{build_context_section, render_system_prompt};
use crate::error::{AgentError, ProviderError};
use crate::events::AgentResult;
use crate::provider::{ChatModel, CompletionParams};
use crate::scratchpad::{Context, HistoryEntry};
use crate::telemetry::{Telemetry, TraceBuilder};
use crate::tool::ToolRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Keep the last `k` entries, in order
pub fn window_history(history: &[HistoryEntry], k: usize) -> &[HistoryEntry] {
    let start = history.len().saturating_sub(k);
    &history[start..]
}

#[derive(Clone)]
pub struct BaseAgent {
    config: Arc<AgentConfig>,
    model: Arc<dyn ChatModel>,
    /// Rendered once at construction
    system_prompt: String,
    timeout: Duration,
    telemetry: Option<Arc<Telemetry>>,
}

impl std::fmt::Debug for BaseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAgent")
            .field("name", &self.config.name)
            .field("provider", &self.model.provider_name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BaseAgent {
    /// Validate `config` against the tool registry and pre-render its prompt
    pub fn new(
        config: impl Into<Arc<AgentConfig>>,
        model: Arc<dyn ChatModel>,
        tools: &ToolRegistry,
    ) -> Result<Self, AgentError> {
        let config = config.into();
        config.validate_basic()?;
        config.validate_tools(&tools.names())?;

        let system_prompt = render_system_prompt(&config, tools);

        Ok(Self {
            config,
            model,
            system_prompt,
            timeout: DEFAULT_MODEL_TIMEOUT,
            telemetry: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Assemble the messages for a first turn: system prompt (plus context
    /// section), windowed history, then the new user message
    pub fn prepare(
        &self,
        message: &str,
        history: &[HistoryEntry],
        context: Option<&Context>,
    ) -> Vec<HistoryEntry> {
        let system = match context {
            Some(ctx) => format!(
                "{}\n\n{}",
                self.system_prompt,
                build_context_section(ctx, chrono::Local::now())
            ),
            None => self.system_prompt.clone(),
        };

        let window = window_history(history, self.config.history_window);

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(HistoryEntry::system(system));
        messages.extend_from_slice(window);
        messages.push(HistoryEntry::user(message));
        messages
    }

    fn params(&self) -> CompletionParams {
        CompletionParams {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// One model call, bounded by the agent timeout and `cancel`
    pub async fn complete(
        &self,
        messages: &[HistoryEntry],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let params = self.params();
        let model_id = params
            .model
            .clone()
            .unwrap_or_else(|| self.model.default_model().to_string());

        let trace = self.telemetry.as_ref().map(|t| {
            let request = serde_json::to_string(messages).unwrap_or_default();
            TraceBuilder::new(
                t.session_id(),
                self.name(),
                self.model.provider_name(),
                &model_id,
                request,
            )
        });

        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::ModelUnavailable {
                agent: self.name().to_string(),
                reason: "cancelled".to_string(),
            }),
            result = tokio::time::timeout(self.timeout, self.model.complete(messages, &params)) => {
                match result {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => Err(e.into_agent_error(self.name())),
                    Err(_) => Err(ProviderError::Timeout.into_agent_error(self.name())),
                }
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(text) => tracing::info!(
                target: "llm",
                agent = %self.name(),
                model = %model_id,
                latency_ms,
                reply_len = text.len(),
                "model call completed"
            ),
            Err(e) => tracing::warn!(
                target: "llm",
                agent = %self.name(),
                model = %model_id,
                latency_ms,
                error = %e,
                "model call failed"
            ),
        }

        if let (Some(telemetry), Some(trace)) = (&self.telemetry, trace) {
            let record = match &outcome {
                Ok(text) => trace.complete(text.clone()),
                Err(e) => trace.fail(e.to_string()),
            };
            telemetry.save_trace(record);
        }

        outcome
    }

    /// Prompt, call the model once, and package the raw reply
    pub async fn run(
        &self,
        message: &str,
        history: &[HistoryEntry],
        context: Option<&Context>,
    ) -> Result<AgentResult, AgentError> {
        self.run_with_cancel(message, history, context, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        message: &str,
        history: &[HistoryEntry],
        context: Option<&Context>,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let messages = self.prepare(message, history, context);
        let reply = self.complete(&messages, cancel).await?;
        Ok(AgentResult::from_reply(self.name(), reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratchpad::Role;
    use crate::testing::{EchoTool, ScriptedModel};
    use serde_json::json;

    fn history(n: usize) -> Vec<HistoryEntry> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    HistoryEntry::user(format!("u{}", i))
                } else {
                    HistoryEntry::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_window_keeps_last_k_in_order() {
        let h = history(20);
        let window = window_history(&h, 6);
        assert_eq!(window.len(), 6);
        assert_eq!(window, &h[14..]);
    }

    #[test]
    fn test_window_idempotent_when_short() {
        let h = history(4);
        assert_eq!(window_history(&h, 6), &h[..]);
        assert_eq!(window_history(window_history(&h, 6), 6), &h[..]);
        assert!(window_history(&[], 3).is_empty());
    }

    #[test]
    fn test_unknown_tool_fails_at_construction() {
        let config = AgentConfig::new("design").with_tools(["read_file", "delete_system"]);
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool::new("read_file"));

        let err = BaseAgent::new(config, ScriptedModel::new(Vec::<&str>::new()).shared(), &tools)
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::Configuration(ref m) if m.contains("delete_system")));
    }

    #[tokio::test]
    async fn test_run_sends_window_and_user_turn() {
        let model = ScriptedModel::new(["Sure!"]);
        let config = AgentConfig::new("calendar")
            .with_prompt("You manage the calendar.")
            .with_history_window(6)
            .with_temperature(0.3);
        let agent = BaseAgent::new(config, model.shared(), &ToolRegistry::new()).unwrap();

        let h = history(20);
        let result = agent.run("what's on today?", &h, None).await.unwrap();

        assert_eq!(result.text, "Sure!");
        assert_eq!(result.raw_text, "Sure!");
        assert_eq!(result.agent_name, "calendar");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let (messages, params) = &calls[0];
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[0], HistoryEntry::system("You manage the calendar."));
        assert_eq!(&messages[1..7], &h[14..]);
        assert_eq!(messages[7], HistoryEntry::user("what's on today?"));
        assert_eq!(params.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_context_goes_into_system_prompt() {
        let model = ScriptedModel::new(["ok"]);
        let agent = BaseAgent::new(
            AgentConfig::new("weather").with_prompt("Weather."),
            model.shared(),
            &ToolRegistry::new(),
        )
        .unwrap();

        let mut context = Context::new();
        context.insert("location".into(), json!("Ooo"));
        agent.run("forecast?", &[], Some(&context)).await.unwrap();

        let calls = model.calls();
        let system = &calls[0].0[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("Weather.\n\n"));
        assert!(system.content.contains("  location: Ooo"));
    }

    #[tokio::test]
    async fn test_timeout_is_model_unavailable() {
        let model = ScriptedModel::new(["too late"]).with_delay(Duration::from_millis(500));
        let agent = BaseAgent::new(AgentConfig::new("music"), model.shared(), &ToolRegistry::new())
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let err = agent.run("play something", &[], None).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable { ref agent, .. } if agent == "music"));
    }

    #[tokio::test]
    async fn test_rate_limit_propagates() {
        let model = ScriptedModel::failing(ProviderError::RateLimited { retry_after: Some(5) });
        let agent = BaseAgent::new(AgentConfig::new("music"), model.shared(), &ToolRegistry::new()).unwrap();

        let err = agent.run("play", &[], None).await.unwrap_err();
        assert_eq!(
            err,
            AgentError::RateLimited {
                agent: "music".into(),
                retry_after: Some(5)
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_is_model_unavailable() {
        let model = ScriptedModel::new(["never"]).with_delay(Duration::from_millis(500));
        let agent = BaseAgent::new(AgentConfig::new("timer"), model.shared(), &ToolRegistry::new()).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = agent
            .run_with_cancel("set a timer", &[], None, &token)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_trace_recorded() {
        let telemetry = Arc::new(Telemetry::minimal_in_memory().unwrap());
        let model = ScriptedModel::new(["hello"]);
        let agent = BaseAgent::new(AgentConfig::new("conversation"), model.shared(), &ToolRegistry::new())
            .unwrap()
            .with_telemetry(telemetry.clone());

        agent.run("hi", &[], None).await.unwrap();

        let traces = telemetry.recent_traces(10).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].agent_name, "conversation");
        assert_eq!(traces[0].response_content.as_deref(), Some("hello"));
        assert!(traces[0].error.is_none());
    }
}
