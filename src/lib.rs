//! ragpilot - Retrieval-augmented question answering engine
//!
//! Given a question, the engine retrieves semantically similar reference
//! passages, decides how much to trust them, composes a behavior/user
//! prompt pair encoding that trust level, and maintains bounded, expiring
//! conversation history for multi-turn continuity.
//!
//! # Architecture
//!
//! - [`policy`]: pure retrieval decision (ranked candidates → strategy)
//! - [`prompt`]: pure prompt composition (strategy + question + candidates)
//! - [`session`]: durable, keyed, expiring conversation store
//! - [`engine`]: orchestration of the above plus the external collaborators
//! - [`providers`]: collaborator traits and the HTTP/qdrant clients

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod policy;
pub mod prompt;
pub mod providers;
pub mod session;

// Re-export commonly used types
pub use engine::{Answer, AnswerEngine};
pub use errors::{RagError, Result};
pub use policy::{Decision, PolicyConfig, RetrievalPolicy, Strategy};
pub use prompt::{ComposedPrompt, PromptComposer};
pub use providers::Candidate;
pub use session::{Conversation, ConversationStore, ConversationSummary, Role, Turn};
