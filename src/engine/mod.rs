//! Answer engine
//!
//! Wires the retrieval policy, prompt composer, and conversation store
//! into single-turn and multi-turn answer pipelines. This is the only
//! component that calls the embedding, ranking, and generation
//! collaborators; their failures propagate to the caller unmodified.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{RagError, Result};
use crate::policy::{RetrievalPolicy, Strategy};
use crate::prompt::PromptComposer;
use crate::providers::{
    Candidate, CandidateIndex, ChatMessage, ChatRole, EmbeddingProvider, Generator, TokenUsage,
};
use crate::session::{Conversation, ConversationStore, ConversationSummary, KeyedLocks, Role};

/// System message that marks prior history as unverified context
pub const HISTORY_DISCLAIMER: &str = "The following prior conversation is provided for \
reference only; its accuracy is not guaranteed.";

/// Default number of candidates requested per query
pub const DEFAULT_TOP_K: usize = 3;

/// One answered question with its decision metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub strategy: Strategy,
    pub confidence: f32,
    /// Retrieved passages, in ranked order, for source display
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Composes collaborators into answer pipelines
pub struct AnswerEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn CandidateIndex>,
    generator: Arc<dyn Generator>,
    policy: RetrievalPolicy,
    composer: PromptComposer,
    sessions: ConversationStore,
    top_k: usize,
    /// Serializes whole multi-turn answer flows per conversation id, on
    /// top of the store's per-operation locks
    turn_locks: KeyedLocks,
}

impl AnswerEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn CandidateIndex>,
        generator: Arc<dyn Generator>,
        policy: RetrievalPolicy,
        sessions: ConversationStore,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            policy,
            composer: PromptComposer::new(),
            sessions,
            top_k: DEFAULT_TOP_K,
            turn_locks: KeyedLocks::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Embed the question and fetch ranked candidates, rejecting scores
    /// outside [0, 1] before they can be misclassified
    async fn retrieve(&self, question: &str) -> Result<Vec<Candidate>> {
        let vector = self.embedder.embed(question).await?;
        let candidates = self.index.search(&vector, self.top_k).await?;

        for candidate in &candidates {
            if !(0.0..=1.0).contains(&candidate.score) {
                return Err(RagError::InvalidScore {
                    score: candidate.score,
                });
            }
        }

        Ok(candidates)
    }

    /// Answer a single question with no conversation state.
    ///
    /// Exactly two messages go to the generator: the behavior prompt,
    /// then the composed user prompt.
    pub async fn answer_once(&self, question: &str) -> Result<Answer> {
        let candidates = self.retrieve(question).await?;
        let decision = self.policy.decide(&candidates);
        tracing::info!(
            strategy = decision.strategy.as_str(),
            confidence = decision.confidence,
            candidates = candidates.len(),
            "retrieval decision"
        );

        let prompt = self.composer.compose(&decision, question, &candidates);
        let messages = [
            ChatMessage::system(prompt.behavior),
            ChatMessage::user(prompt.user),
        ];

        let generation = self.generator.generate(&messages).await?;

        Ok(Answer {
            answer: generation.content,
            strategy: decision.strategy,
            confidence: decision.confidence,
            candidates,
            usage: generation.usage,
        })
    }

    /// Answer a question within a conversation.
    ///
    /// The raw question is appended to history before the generation call,
    /// so the ask is durable even if the caller goes away before an answer
    /// lands; a trailing user turn with no assistant turn is a valid
    /// conversation state. History stores the literal question and literal
    /// answer — the context-augmented prompt is sent to the generator but
    /// never persisted, keeping stored conversations human-readable and
    /// reusable under different retrieval outcomes in later turns.
    pub async fn answer_in_session(&self, id: &str, question: &str) -> Result<Answer> {
        let _turn_guard = self.turn_locks.acquire(id).await;

        let conversation = self.sessions.get_or_create(id).await?;
        // Snapshot before appending: the prior-history disclaimer and the
        // replayed turns must not include the question being asked now.
        let history = conversation.turns;

        self.sessions.append(id, Role::User, question, None).await?;

        let candidates = self.retrieve(question).await?;
        let decision = self.policy.decide(&candidates);
        tracing::info!(
            session_id = %id,
            strategy = decision.strategy.as_str(),
            confidence = decision.confidence,
            history_turns = history.len(),
            "retrieval decision"
        );

        let prompt = self.composer.compose(&decision, question, &candidates);

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(prompt.behavior));
        if !history.is_empty() {
            messages.push(ChatMessage::system(HISTORY_DISCLAIMER));
            for turn in &history {
                messages.push(ChatMessage {
                    role: match turn.role {
                        Role::User => ChatRole::User,
                        Role::Assistant => ChatRole::Assistant,
                    },
                    content: turn.content.clone(),
                });
            }
        }
        messages.push(ChatMessage::user(prompt.user));

        let generation = self.generator.generate(&messages).await?;

        self.sessions
            .append(
                id,
                Role::Assistant,
                &generation.content,
                generation.usage.clone(),
            )
            .await?;

        Ok(Answer {
            answer: generation.content,
            strategy: decision.strategy,
            confidence: decision.confidence,
            candidates,
            usage: generation.usage,
        })
    }

    /// Embed and index reference passages. Point ids are derived from the
    /// content, so re-seeding the same passages is idempotent.
    pub async fn seed(&self, passages: &[String]) -> Result<usize> {
        let mut indexed = 0;
        for passage in passages {
            let passage = passage.trim();
            if passage.is_empty() {
                continue;
            }
            let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, passage.as_bytes()).to_string();
            let vector = self.embedder.embed(passage).await?;
            self.index.upsert(&id, passage, &vector).await?;
            indexed += 1;
        }
        tracing::info!(passages = indexed, "seeded reference passages");
        Ok(indexed)
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.sessions.get(id).await
    }

    pub async fn clear_conversation(&self, id: &str) -> Result<()> {
        self.sessions.clear(id).await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let deleted = self.sessions.delete(id).await?;
        self.turn_locks.prune(id);
        Ok(deleted)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.sessions.list().await
    }
}
