//! Provider configuration

use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name, also the auth.json key (lowercased)
    pub name: String,
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Environment variable name for the API key
    pub api_key_env: String,
    pub default_model: String,
}

impl ProviderConfig {
    pub fn openrouter() -> Self {
        Self {
            name: "OpenRouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            default_model: "openai/gpt-4o-mini".to_string(),
        }
    }

    pub fn openai() -> Self {
        Self {
            name: "OpenAI".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Local LM Studio server
    pub fn lm_studio() -> Self {
        Self {
            name: "lm-studio".to_string(),
            base_url: "http://localhost:1234/v1".to_string(),
            api_key_env: "LM_STUDIO_API_KEY".to_string(),
            default_model: "qwen2.5-7b-instruct".to_string(),
        }
    }

    /// Custom provider config (e.g., vLLM, llama.cpp server)
    pub fn custom(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key_env: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            default_model: default_model.into(),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openrouter" => Some(Self::openrouter()),
            "openai" => Some(Self::openai()),
            "lm-studio" | "lmstudio" | "lm studio" => Some(Self::lm_studio()),
            _ => None,
        }
    }

    /// Key under which this provider appears in auth.json
    pub fn auth_key(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ProviderConfig::preset("OpenAI").unwrap().api_key_env, "OPENAI_API_KEY");
        assert_eq!(ProviderConfig::preset("lm studio").unwrap().auth_key(), "lm-studio");
        assert!(ProviderConfig::preset("nope").is_none());
    }
}
