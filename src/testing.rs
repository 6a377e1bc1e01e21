//! Test doubles: scripted model, recording tool and service

use crate::error::ProviderError;
use crate::provider::{ChatModel, CompletionParams};
use crate::scratchpad::HistoryEntry;
use crate::service::{Service, ServiceError};
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Call = (Vec<HistoryEntry>, CompletionParams);

/// Replies with canned text, in order
#[derive(Clone)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect())),
            calls: Arc::default(),
            delay: None,
        }
    }

    /// Every call fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from([Err(error)]))),
            calls: Arc::default(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(&self) -> Arc<dyn ChatModel> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(
        &self,
        messages: &[HistoryEntry],
        params: &CompletionParams,
    ) -> Result<String, ProviderError> {
        self.calls.lock().push((messages.to_vec(), params.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock();
        // The last reply repeats once the script runs out
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::Malformed("script exhausted".into())))
        }
    }
}

/// Echoes its name and arguments, recording each call
#[derive(Clone)]
pub struct EchoTool {
    name: String,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!("Echo tool {}", self.name),
            parameters: json!({"type": "object"}),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        self.calls.lock().push(args.clone());
        ToolResult::success(format!("{} {}", self.name, args))
    }
}

/// Accepts any action and records `(action, params)`
#[derive(Clone)]
pub struct RecordingService {
    name: String,
    actions: Vec<String>,
    calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    fail_with: Option<String>,
}

impl RecordingService {
    pub fn new(name: impl Into<String>, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            calls: Arc::default(),
            fail_with: None,
        }
    }

    /// Every call returns a backend error
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().clone()
    }

    pub fn actions_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(a, _)| a.clone()).collect()
    }
}

#[async_trait]
impl Service for RecordingService {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<String> {
        self.actions.clone()
    }

    async fn call(&self, action: &str, params: &Map<String, Value>) -> Result<Value, ServiceError> {
        self.calls.lock().push((action.to_string(), params.clone()));
        match &self.fail_with {
            Some(message) => Err(ServiceError::Backend(message.clone())),
            None => Ok(json!({"ok": true, "action": action})),
        }
    }
}
