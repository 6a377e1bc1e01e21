//! Provider credentials
//!
//! `auth.json` lives in the BMO data directory ($XDG_DATA_HOME/bmo or the
//! platform equivalent) and maps a provider name to its key, plus optional
//! endpoint and model overrides:
//!
//! ```json
//! {
//!   "openrouter": {"key": "sk-or-..."},
//!   "kitchen-llm": {"key": "none", "base_url": "http://10.0.0.5:8080/v1", "model": "qwen2.5-3b"}
//! }
//! ```
//!
//! Environment variables take precedence over the file; see `ProviderClient`.

use crate::provider::ProviderConfig;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What BMO knows about one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model to use when neither the config file nor the CLI names one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthConfig {
    credentials: BTreeMap<String, Credential>,
}

impl AuthConfig {
    /// Load from the default location. A missing file is an empty config.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path().context("Cannot determine data directory for auth.json")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("bmo").join("auth.json"))
    }

    pub fn credential(&self, provider: &str) -> Option<&Credential> {
        self.credentials.get(provider)
    }

    pub fn key_for(&self, provider: &str) -> Option<&str> {
        self.credential(provider).map(|c| c.key.as_str())
    }

    /// Build a provider that exists only in auth.json. Needs a `base_url`.
    pub fn custom_provider(&self, name: &str) -> Option<ProviderConfig> {
        let credential = self.credential(name)?;
        let base_url = credential.base_url.clone()?;
        let env = format!("{}_API_KEY", name.to_uppercase().replace('-', "_"));
        let model = credential.model.clone().unwrap_or_else(|| "default".to_string());
        Some(ProviderConfig::custom(name, base_url, env, model))
    }

    /// Apply this file's endpoint and model overrides to `provider`
    pub fn apply(&self, mut provider: ProviderConfig) -> ProviderConfig {
        if let Some(credential) = self.credential(&provider.auth_key()) {
            if let Some(url) = &credential.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(model) = &credential.model {
                provider = provider.with_default_model(model);
            }
        }
        provider
    }

    /// Provider names, sorted
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }
}
