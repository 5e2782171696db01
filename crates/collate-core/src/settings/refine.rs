//! Refinement settings: which LLM to call and how hard to push it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RefineProvider;
use crate::refine::{FailurePolicy, PolishConfig, PolishMode, max_split_limit};

/// Settings for refining transcripts with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSettings {
    /// LLM provider used to refine transcript chunks
    #[serde(default)]
    pub provider: RefineProvider,

    /// Model name (provider default if None)
    #[serde(default)]
    pub model: Option<String>,

    /// Override for the provider's API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// API keys by provider name
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output budget of one refine call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Characters per chunk (70% of `max_tokens` if None)
    #[serde(default)]
    pub split_limit: Option<usize>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: usize,

    /// Total attempts per chunk
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the linear retry backoff, in seconds
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: f64,

    #[serde(default)]
    pub mode: PolishMode,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// HTTP timeout of one refine request, in seconds (none if unset)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Custom system prompt (uses default if None)
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_temperature() -> f32 {
    crate::refine::DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> usize {
    6000
}

fn default_max_concurrency() -> usize {
    5
}

fn default_max_per_minute() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> f64 {
    2.0
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            provider: RefineProvider::default(),
            model: None,
            base_url: None,
            api_keys: HashMap::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            split_limit: None,
            max_concurrency: default_max_concurrency(),
            max_per_minute: default_max_per_minute(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            mode: PolishMode::default(),
            on_failure: FailurePolicy::default(),
            timeout_secs: None,
            prompt: None,
        }
    }
}

impl RefineSettings {
    /// Get the API key for the provider, falling back to environment variables.
    ///
    /// Returns None for Ollama (it uses a URL instead).
    pub fn api_key(&self) -> Option<String> {
        if !self.provider.requires_api_key() {
            return None;
        }
        self.api_key_from_settings()
            .or_else(|| std::env::var(self.provider.api_key_env_var()).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Get the API key for the provider from settings only (no env var fallback).
    pub fn api_key_from_settings(&self) -> Option<String> {
        self.api_keys.get(self.provider.as_str()).cloned()
    }

    pub fn set_api_key(&mut self, provider: RefineProvider, key: impl Into<String>) {
        self.api_keys.insert(provider.as_str().to_string(), key.into());
    }

    /// Base URL: settings, then `OLLAMA_URL` for Ollama, then the provider default.
    pub fn base_url(&self) -> String {
        if let Some(url) = self.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.trim().trim_end_matches('/').to_string();
        }
        if self.provider == RefineProvider::Ollama
            && let Ok(url) = std::env::var(self.provider.api_key_env_var())
        {
            return url.trim_end_matches('/').to_string();
        }
        self.provider.default_base_url().to_string()
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Check that the provider can be reached with the configured credentials.
    pub fn is_configured(&self) -> bool {
        !self.provider.requires_api_key() || self.api_key().is_some()
    }

    /// Validate refine settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.is_configured() {
            anyhow::bail!(
                "{} requires an API key. Set it with: collate config --api-key <key> \
                 or the {} environment variable",
                self.provider.display_name(),
                self.provider.api_key_env_var()
            );
        }
        self.polish_config().validate(self.max_tokens)?;
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn polish_config(&self) -> PolishConfig {
        PolishConfig {
            split_limit: self
                .split_limit
                .unwrap_or_else(|| max_split_limit(self.max_tokens)),
            max_concurrency: self.max_concurrency,
            max_per_minute: self.max_per_minute,
            max_retries: self.max_retries,
            backoff_base: Duration::try_from_secs_f64(self.backoff_secs)
                .unwrap_or(Duration::from_secs(2)),
            mode: self.mode,
            on_failure: self.on_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_polish_config_is_valid() {
        let settings = RefineSettings::default();
        let config = settings.polish_config();
        assert_eq!(config.split_limit, 4200);
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.max_per_minute, 10);
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert!(config.validate(settings.max_tokens).is_ok());
    }

    #[test]
    fn test_invalid_backoff_falls_back_to_default() {
        let settings = RefineSettings {
            backoff_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(settings.polish_config().backoff_base, Duration::from_secs(2));
    }

    #[test]
    fn test_api_key_from_settings() {
        let mut settings = RefineSettings {
            provider: RefineProvider::Mistral,
            ..Default::default()
        };
        settings.set_api_key(RefineProvider::Mistral, "key-123");
        assert_eq!(settings.api_key().as_deref(), Some("key-123"));
        assert!(settings.is_configured());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let settings = RefineSettings {
            provider: RefineProvider::Ollama,
            ..Default::default()
        };
        assert!(settings.api_key().is_none());
        assert!(settings.is_configured());
    }

    #[test]
    fn test_base_url_override_is_normalized() {
        let settings = RefineSettings {
            base_url: Some("http://gpu-box:8000/v1/".into()),
            ..Default::default()
        };
        assert_eq!(settings.base_url(), "http://gpu-box:8000/v1");
        assert_eq!(settings.model(), "deepseek-chat");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: RefineSettings =
            serde_json::from_str(r#"{"provider": "openai", "mode": "sequential"}"#).unwrap();
        assert_eq!(settings.provider, RefineProvider::OpenAI);
        assert_eq!(settings.mode, PolishMode::Sequential);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.on_failure, FailurePolicy::Fallback);
    }
}
