//! Error types for the ragpilot engine
//!
//! Collaborator failures (embedding, retrieval, generation) propagate
//! unmodified to the caller; the engine never masks an upstream failure
//! with a degraded answer.

use thiserror::Error;

/// Main error type for the question-answering engine
#[derive(Error, Debug)]
pub enum RagError {
    /// Embedding provider failures
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    /// Candidate index failures
    #[error("Candidate retrieval failed: {0}")]
    Retrieval(String),

    /// Generation provider failures
    #[error("Generation request failed: {0}")]
    Generation(String),

    /// Generation provider rejected the request due to rate limiting
    #[error("Generation provider rate limited (retry after {retry_after_secs:?} seconds)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Generation provider returned a response the client could not interpret
    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    /// Conversation id is unknown or has expired
    #[error("Conversation not found: {id}")]
    SessionNotFound { id: String },

    /// Candidate score outside the [0, 1] similarity range
    #[error("Candidate score {score} outside the valid range [0, 1]")]
    InvalidScore { score: f32 },

    /// Configuration errors (misordered thresholds, missing directories)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collaborator call exceeded its configured deadline
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::InvalidScore { score: 1.7 };
        assert!(err.to_string().contains("1.7"));

        let err = RagError::SessionNotFound {
            id: "abc".to_string(),
        };
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_timeout_display() {
        let err = RagError::Timeout { duration_ms: 30000 };
        assert!(err.to_string().contains("30000"));
    }
}
