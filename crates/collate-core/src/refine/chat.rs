//! [`Refiner`] backed by an LLM chat API.
//!
//! # Supported Providers
//!
//! - **DeepSeek**, **OpenAI**, **Mistral**, **Gemini** - OpenAI-compatible `/chat/completions`
//! - **Ollama** - local `/api/chat` (no API key, just a server URL)

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

use super::Refiner;
use crate::config::RefineProvider;
use crate::settings::RefineSettings;

pub const DEFAULT_TEMPERATURE: f32 = 0.1;

pub const DEFAULT_POLISH_PROMPT: &str = "You are a language assistant that cleans up \
speech-recognition transcripts. \
Remove stutters, filler words and accidental repetitions. \
Split the text into paragraphs where the topic changes. \
Fix spelling, grammar and punctuation. \
Keep the speaker's meaning and style, do not rewrite beyond what is needed, \
and never drop information.";

/// Wraps one chunk into the user message sent to the model
fn user_prompt(text: &str) -> String {
    format!(
        "Here is the raw speech-recognition text:\n{text}\n\n\
         Output only the cleaned text. Do not add any other words \
         and do not use markdown, plain text only."
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Ollama API response structure
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Message,
}

/// Refines text through a chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatRefiner {
    client: reqwest::Client,
    provider: RefineProvider,
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Option<Duration>,
}

impl ChatRefiner {
    /// Build a refiner from settings, failing if a required API key is missing.
    pub fn from_settings(settings: &RefineSettings) -> Result<Self> {
        settings.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            provider: settings.provider,
            base_url: settings.base_url(),
            api_key: settings.api_key(),
            model: settings.model(),
            system_prompt: settings
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_POLISH_PROMPT.to_string()),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn provider(&self) -> RefineProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.provider {
            RefineProvider::Ollama => format!("{base}/api/chat"),
            _ => format!("{base}/chat/completions"),
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let messages = serde_json::json!([
            {"role": "system", "content": self.system_prompt},
            {"role": "user", "content": user_prompt(text)}
        ]);

        match self.provider {
            RefineProvider::Ollama => serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": self.temperature,
                    "num_predict": self.max_tokens
                }
            }),
            _ => serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
                "max_tokens": self.max_tokens
            }),
        }
    }

    async fn send(&self, text: &str) -> Result<String> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(text));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() && self.provider == RefineProvider::Ollama {
                anyhow!(
                    "Cannot connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                    self.base_url
                )
            } else {
                anyhow!("{} request failed: {}", self.provider.display_name(), e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!(
                "{} refine failed ({status}): {error_text}",
                self.provider.display_name()
            );
        }

        let body = response.text().await.context("Failed to read response")?;
        parse_response(self.provider, &body)
    }
}

fn parse_response(provider: RefineProvider, body: &str) -> Result<String> {
    let content = match provider {
        RefineProvider::Ollama => {
            let resp: OllamaResponse =
                serde_json::from_str(body).context("Failed to parse Ollama response")?;
            resp.message.content
        }
        _ => {
            let resp: ChatResponse =
                serde_json::from_str(body).context("Failed to parse chat response")?;
            resp.choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| anyhow!("No response from {}", provider.display_name()))?
        }
    };
    Ok(content.trim().to_string())
}

#[async_trait]
impl Refiner for ChatRefiner {
    async fn refine(&self, text: &str) -> Result<String> {
        self.send(text).await
    }

    fn output_budget(&self) -> usize {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refiner(provider: RefineProvider) -> ChatRefiner {
        let mut settings = RefineSettings {
            provider,
            ..Default::default()
        };
        settings.set_api_key(provider, "test-key");
        ChatRefiner::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            refiner(RefineProvider::DeepSeek).endpoint(),
            "https://api.deepseek.com/chat/completions"
        );
        assert_eq!(
            refiner(RefineProvider::OpenAI).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            refiner(RefineProvider::Gemini).endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn test_request_body_carries_chunk_and_budget() {
        let refiner = refiner(RefineProvider::Mistral);
        let body = refiner.request_body("hello there");
        assert_eq!(body["model"], "mistral-small-latest");
        assert_eq!(body["max_tokens"], 6000);
        assert_eq!(body["messages"][0]["role"], "system");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("hello there"));
        assert_eq!(refiner.output_budget(), 6000);
    }

    #[test]
    fn test_ollama_body_disables_streaming() {
        let settings = RefineSettings {
            provider: RefineProvider::Ollama,
            base_url: Some("http://localhost:11434".into()),
            ..Default::default()
        };
        let refiner = ChatRefiner::from_settings(&settings).unwrap();
        let body = refiner.request_body("x");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 6000);
        assert_eq!(refiner.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Clean text. "}}]}"#;
        assert_eq!(
            parse_response(RefineProvider::OpenAI, body).unwrap(),
            "Clean text."
        );

        let empty = r#"{"choices":[]}"#;
        assert!(parse_response(RefineProvider::OpenAI, empty).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let body = r#"{"model":"qwen","message":{"role":"assistant","content":"Done."},"done":true}"#;
        assert_eq!(parse_response(RefineProvider::Ollama, body).unwrap(), "Done.");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let settings = RefineSettings {
            provider: RefineProvider::DeepSeek,
            ..Default::default()
        };
        if std::env::var("DEEPSEEK_API_KEY").is_err() {
            assert!(ChatRefiner::from_settings(&settings).is_err());
        }
    }
}
