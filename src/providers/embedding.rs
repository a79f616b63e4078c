//! HTTP embedding client
//!
//! Calls an OpenAI-compatible `/v1/embeddings` endpoint. Model choice and
//! tokenization are the provider's concern; this client only moves text in
//! and a vector out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::providers::EmbeddingProvider;

/// Request timeout for embedding calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedding client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Endpoint URL, e.g. `https://router.huggingface.co/v1/embeddings`
    pub api_url: String,
    /// Embedding model identifier, e.g. `BAAI/bge-m3`
    pub model: String,
    /// Bearer token; optional for unauthenticated local providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://router.huggingface.co/v1/embeddings".to_string(),
            model: "BAAI/bge-m3".to_string(),
            api_key: None,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an HTTP API
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RagError::Http)?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("HTTP {}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid response body: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| RagError::Embedding("response contained no embedding".to_string()))?;

        if vector.is_empty() {
            return Err(RagError::Embedding("empty embedding vector".to_string()));
        }

        Ok(vector)
    }
}
