use serde::{Deserialize, Serialize};
use std::fmt;

/// Available refine providers (LLM chat endpoints)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefineProvider {
    #[default]
    DeepSeek,
    OpenAI,
    Mistral,
    Gemini,
    Ollama,
}

impl RefineProvider {
    /// Get the string identifier for this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            RefineProvider::DeepSeek => "deepseek",
            RefineProvider::OpenAI => "openai",
            RefineProvider::Mistral => "mistral",
            RefineProvider::Gemini => "gemini",
            RefineProvider::Ollama => "ollama",
        }
    }

    /// Get the environment variable name for this provider's API key (or URL for Ollama)
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            RefineProvider::DeepSeek => "DEEPSEEK_API_KEY",
            RefineProvider::OpenAI => "OPENAI_API_KEY",
            RefineProvider::Mistral => "MISTRAL_API_KEY",
            RefineProvider::Gemini => "GEMINI_API_KEY",
            RefineProvider::Ollama => "OLLAMA_URL",
        }
    }

    /// Default base URL of the provider's API
    pub fn default_base_url(&self) -> &'static str {
        match self {
            RefineProvider::DeepSeek => "https://api.deepseek.com",
            RefineProvider::OpenAI => "https://api.openai.com/v1",
            RefineProvider::Mistral => "https://api.mistral.ai/v1",
            // OpenAI-compatible surface of the Gemini API
            RefineProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            RefineProvider::Ollama => "http://localhost:11434",
        }
    }

    /// Default chat model
    pub fn default_model(&self) -> &'static str {
        match self {
            RefineProvider::DeepSeek => "deepseek-chat",
            RefineProvider::OpenAI => "gpt-4o-mini",
            RefineProvider::Mistral => "mistral-small-latest",
            RefineProvider::Gemini => "gemini-2.0-flash",
            RefineProvider::Ollama => "qwen2.5:3b",
        }
    }

    /// List all available providers
    pub fn all() -> &'static [RefineProvider] {
        &[
            RefineProvider::DeepSeek,
            RefineProvider::OpenAI,
            RefineProvider::Mistral,
            RefineProvider::Gemini,
            RefineProvider::Ollama,
        ]
    }

    /// Human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            RefineProvider::DeepSeek => "DeepSeek",
            RefineProvider::OpenAI => "OpenAI",
            RefineProvider::Mistral => "Mistral",
            RefineProvider::Gemini => "Gemini",
            RefineProvider::Ollama => "Ollama",
        }
    }

    /// Whether this provider requires an API key (Ollama only needs a URL)
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, RefineProvider::Ollama)
    }
}

impl fmt::Display for RefineProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RefineProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(RefineProvider::DeepSeek),
            "openai" => Ok(RefineProvider::OpenAI),
            "mistral" => Ok(RefineProvider::Mistral),
            "gemini" => Ok(RefineProvider::Gemini),
            "ollama" | "local" => Ok(RefineProvider::Ollama),
            _ => Err(format!(
                "Unknown provider: {}. Available: deepseek, openai, mistral, gemini, ollama",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for provider in RefineProvider::all() {
            let parsed: RefineProvider = provider.as_str().parse().unwrap();
            assert_eq!(&parsed, provider);
        }
    }

    #[test]
    fn test_provider_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<RefineProvider>(), Ok(RefineProvider::OpenAI));
        assert_eq!("GEMINI".parse::<RefineProvider>(), Ok(RefineProvider::Gemini));
        assert!("claude".parse::<RefineProvider>().is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(!RefineProvider::Ollama.requires_api_key());
        assert!(RefineProvider::DeepSeek.requires_api_key());
    }

    #[test]
    fn test_gemini_defaults() {
        let gemini = RefineProvider::Gemini;
        assert!(gemini.requires_api_key());
        assert_eq!(gemini.api_key_env_var(), "GEMINI_API_KEY");
        assert_eq!(gemini.default_model(), "gemini-2.0-flash");
    }
}
