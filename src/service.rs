//! Backing services for `command` blocks
//!
//! Services are the side-effecting half of the protocol: calendar, music,
//! smart home, timers, tv, weather. The core treats them as opaque; concrete
//! backends live outside this crate and register through `ServiceRegistry`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{service}' does not support action '{action}'")]
    UnsupportedAction { service: String, action: String },
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Actions this service accepts
    fn actions(&self) -> Vec<String>;

    async fn call(&self, action: &str, params: &Map<String, Value>) -> Result<Value, ServiceError>;
}

#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Service + 'static>(&mut self, service: S) {
        self.register_arc(Arc::new(service));
    }

    pub fn register_arc(&mut self, service: Arc<dyn Service>) {
        self.services.insert(service.name().to_string(), service);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// All service names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Acknowledges every call without touching hardware.
///
/// Used by the CLI when no real backend is wired in.
pub struct DryRunService {
    name: String,
    actions: Vec<String>,
}

impl DryRunService {
    pub fn new(name: impl Into<String>, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Service for DryRunService {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<String> {
        self.actions.clone()
    }

    async fn call(&self, action: &str, params: &Map<String, Value>) -> Result<Value, ServiceError> {
        if !self.actions.is_empty() && !self.actions.iter().any(|a| a == action) {
            return Err(ServiceError::UnsupportedAction {
                service: self.name.clone(),
                action: action.to_string(),
            });
        }

        let params = Value::Object(params.clone());
        tracing::info!(
            service = %self.name,
            action = %action,
            params = %params,
            "dry-run service call"
        );

        Ok(json!({"status": "ok", "dry_run": true, "action": action}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_acknowledges_known_actions() {
        let svc = DryRunService::new("timers", ["timer_set", "timer_cancel"]);
        let out = svc.call("timer_set", &Map::new()).await.unwrap();
        assert_eq!(out["status"], "ok");
        assert_eq!(out["action"], "timer_set");
    }

    #[tokio::test]
    async fn test_dry_run_accepts_params() {
        let svc = DryRunService::new("timers", ["timer_set"]);
        let mut params = Map::new();
        params.insert("minutes".into(), json!(10));
        params.insert("label".into(), json!("pizza"));
        let out = svc.call("timer_set", &params).await.unwrap();
        assert_eq!(out["dry_run"], true);
    }

    #[tokio::test]
    async fn test_dry_run_rejects_unknown_action() {
        let svc = DryRunService::new("timers", ["timer_set"]);
        let err = svc.call("oven_preheat", &Map::new()).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::UnsupportedAction {
                service: "timers".into(),
                action: "oven_preheat".into()
            }
        );
    }

    #[test]
    fn test_registry_names_sorted() {
        let mut registry = ServiceRegistry::new();
        registry.register(DryRunService::new("weather", ["weather_get"]));
        registry.register(DryRunService::new("calendar", ["calendar_list"]));
        assert_eq!(registry.names(), vec!["calendar", "weather"]);
        assert!(registry.contains("weather"));
        assert!(registry.get("music").is_none());
    }
}
