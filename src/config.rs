//! Application configuration
//!
//! Read from `$XDG_CONFIG_HOME/bmo/config.yaml`. Every section has defaults,
//! so a missing or partial file is fine.

use crate::auth::AuthConfig;
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub dispatch: DispatchConfig,
    pub telemetry: TelemetryConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider preset name (openrouter, openai, lm-studio) or custom name
    pub provider: String,

    /// Base URL override (for custom endpoints like LM Studio)
    pub base_url: Option<String>,

    pub model: Option<String>,

    /// Per-call timeout for model requests
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Agent used when routing finds no match
    pub default_agent: String,

    /// Upper bound on delegation hops per user message
    pub max_nesting_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_dir: PathBuf,
    pub verbose: bool,
    pub otel_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Root directory for file tools (read_file, list_directory)
    pub design_dir: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "lm-studio".to_string(),
            base_url: None,
            model: None,
            timeout_secs: 60,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_agent: "conversation".to_string(),
            max_nesting_depth: 3,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: dirs::data_dir()
                .map(|d| d.join("bmo").join("logs"))
                .unwrap_or_else(|| PathBuf::from(".bmo_logs")),
            verbose: false,
            otel_endpoint: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            design_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Resolve the provider preset, applying overrides from auth.json and this config
    pub fn provider_config(&self) -> anyhow::Result<ProviderConfig> {
        let auth = AuthConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{:#}", e), "Ignoring auth.json");
            AuthConfig::default()
        });
        self.resolve_provider(&auth)
    }

    /// Preset or auth.json entry first, then this config's base_url and model
    fn resolve_provider(&self, auth: &AuthConfig) -> anyhow::Result<ProviderConfig> {
        let mut provider = match ProviderConfig::preset(&self.provider) {
            Some(preset) => auth.apply(preset),
            None => match auth.custom_provider(&self.provider) {
                Some(custom) => custom,
                None => {
                    let base_url = self.base_url.clone().ok_or_else(|| {
                        anyhow::anyhow!(
                            "Unknown provider '{}' and no base_url configured",
                            self.provider
                        )
                    })?;
                    let env = format!("{}_API_KEY", self.provider.to_uppercase().replace('-', "_"));
                    ProviderConfig::custom(&self.provider, base_url, env, "default")
                }
            },
        };

        if let Some(url) = &self.base_url {
            provider = provider.with_base_url(url);
        }
        if let Some(model) = &self.model {
            provider = provider.with_default_model(model);
        }

        Ok(provider)
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bmo").join("config.yaml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.telemetry.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "llm:\n  provider: openai\n  model: gpt-4o\ndispatch:\n  max_nesting_depth: 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.dispatch.max_nesting_depth, 5);
        assert_eq!(config.dispatch.default_agent, "conversation");
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("nope.yaml")).unwrap();
        assert_eq!(config.dispatch.max_nesting_depth, 3);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "dispatch: [not, a, map]").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_provider_overrides() {
        let llm = LlmConfig {
            provider: "openai".into(),
            base_url: Some("http://proxy.local/v1".into()),
            model: Some("gpt-4o".into()),
            timeout_secs: 0,
        };
        let provider = llm.provider_config().unwrap();
        assert_eq!(provider.base_url, "http://proxy.local/v1");
        assert_eq!(provider.default_model, "gpt-4o");
        assert_eq!(llm.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_provider_from_auth_file() {
        let auth: AuthConfig = serde_json::from_str(
            r#"{"kitchen-llm": {"key": "none", "base_url": "http://10.0.0.5:8080/v1", "model": "qwen2.5-3b"}}"#,
        )
        .unwrap();
        let llm = LlmConfig {
            provider: "kitchen-llm".into(),
            ..LlmConfig::default()
        };

        let provider = llm.resolve_provider(&auth).unwrap();
        assert_eq!(provider.base_url, "http://10.0.0.5:8080/v1");
        assert_eq!(provider.default_model, "qwen2.5-3b");

        let unknown = LlmConfig {
            provider: "garage".into(),
            ..LlmConfig::default()
        };
        assert!(unknown.resolve_provider(&auth).is_err());
    }
}
