//! External collaborator seams
//!
//! The engine talks to three external services: an embedding provider, a
//! candidate index, and a text-generation provider. Each is behind an
//! async trait so the pipeline can be exercised with fakes in tests and
//! rewired to different backends without touching the decision logic.

pub mod embedding;
pub mod generation;
pub mod search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use embedding::{EmbeddingConfig, HttpEmbeddingClient};
pub use generation::{ChatCompletionsClient, Generation, GenerationConfig, TokenUsage};
pub use search::{IndexConfig, QdrantIndex};

/// One retrieved passage with its similarity score (higher = more similar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: String,
    pub score: f32,
}

/// Message role for generation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message sent to the generation provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Maps text to a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Similarity search over stored passages
#[async_trait]
pub trait CandidateIndex: Send + Sync {
    /// Return at most `k` candidates, sorted by descending score
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>>;

    /// Insert or replace one passage with its embedding
    async fn upsert(&self, id: &str, content: &str, vector: &[f32]) -> Result<()>;
}

/// Produces one reply for a role-tagged message list
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_serialization() {
        let msg = ChatMessage::system("rules");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"system\""));

        let msg = ChatMessage::assistant("reply");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
