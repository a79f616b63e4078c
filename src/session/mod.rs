//! Conversation state
//!
//! Durable, keyed, append-only-per-key conversation history with
//! time-based expiry. The store exclusively owns conversation lifecycle;
//! the engine and hosts go through it rather than mutating records.

pub mod backend;
pub mod store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::TokenUsage;

pub use backend::{JsonFileBackend, MemoryBackend, SessionBackend};
pub use store::{ConversationStore, KeyedLocks};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One exchange unit within a conversation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// An ordered, append-only, expiring sequence of turns keyed by an
/// external id. Zero turns is a valid state (freshly created or cleared).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every operation that touches the record; governs expiry
    pub last_accessed_at: DateTime<Utc>,
    pub turn_count: usize,
    pub total_tokens: u64,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            last_accessed_at: now,
            turn_count: 0,
            total_tokens: 0,
        }
    }

    /// Append one turn, updating counters and the access timestamp
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>, usage: Option<TokenUsage>) {
        if let Some(u) = &usage {
            self.total_tokens += u.total_tokens;
        }
        self.turns.push(Turn {
            role,
            content: content.into(),
            recorded_at: Utc::now(),
            usage,
        });
        self.turn_count += 1;
        self.last_accessed_at = Utc::now();
    }

    /// Reset the turn sequence and counters, preserving the id
    pub fn clear(&mut self) {
        self.turns.clear();
        self.turn_count = 0;
        self.total_tokens = 0;
        self.last_accessed_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::MAX);
        Utc::now() - self.last_accessed_at > timeout
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            turn_count: self.turn_count,
            total_tokens: self.total_tokens,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

/// Conversation metadata without turn bodies, for operational visibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub turn_count: usize,
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}
