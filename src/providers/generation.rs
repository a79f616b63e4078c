//! Chat-completions generation client
//!
//! Calls an OpenAI-compatible `/v1/chat/completions` endpoint and maps its
//! failure modes onto the engine's error taxonomy: request deadline →
//! `Timeout`, HTTP 429 → `RateLimited`, an unreadable body or missing
//! `choices` → `MalformedResponse`, everything else → `Generation`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::providers::{ChatMessage, Generator};

/// Generation client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Endpoint URL, e.g. `https://router.huggingface.co/v1/chat/completions`
    pub api_url: String,
    /// Model identifier, e.g. `meta-llama/Llama-3.3-70B-Instruct`
    pub model: String,
    /// Bearer token; optional for unauthenticated local providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request deadline in seconds; exceeding it is a typed failure, not
    /// a silent empty answer
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://router.huggingface.co/v1/chat/completions".to_string(),
            model: "meta-llama/Llama-3.3-70B-Instruct".to_string(),
            api_key: None,
            max_tokens: 500,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

/// Token accounting reported by the provider; opaque pass-through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One generated reply with its token accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Generator backed by an OpenAI-compatible chat API
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    config: GenerationConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::Http)?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for ChatCompletionsClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RagError::Timeout {
                    duration_ms: self.config.timeout_secs * 1000,
                }
            } else {
                RagError::Generation(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(RagError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RagError::Timeout {
                    duration_ms: self.config.timeout_secs * 1000,
                }
            } else {
                RagError::Generation(format!("failed to read response body: {}", e))
            }
        })?;

        if !status.is_success() {
            return Err(RagError::Generation(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|_| {
            RagError::MalformedResponse(format!(
                "provider returned invalid JSON: {}",
                truncate(&body, 200)
            ))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| {
                RagError::MalformedResponse("response contained no choices".to_string())
            })?;

        Ok(Generation {
            content,
            usage: parsed.usage,
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_deserializes_from_openai_shape() {
        let json = r#"{"prompt_tokens": 12, "completion_tokens": 30, "total_tokens": 42}"#;
        let usage: TokenUsage = serde_json::from_str(json).unwrap();
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_response_without_choices_detected() {
        let json = r#"{"usage": {"total_tokens": 1}}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 200), "ok");
    }
}
