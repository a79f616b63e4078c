//! Conversation store
//!
//! Owns conversation lifecycle: create, append, clear, delete, expire.
//! Every operation against one id serializes on a per-id lock so
//! concurrent calls against the same conversation cannot interleave,
//! while different ids never contend. Expiry is lazy: an aged-out record
//! is reported absent on read and physically removed on that access,
//! with no background sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::{RagError, Result};
use crate::providers::TokenUsage;
use crate::session::{Conversation, ConversationSummary, Role, SessionBackend};

/// Per-key async mutex registry. Guards are created on first use and
/// retained for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one key, creating it if needed
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry for `key` if nothing holds or awaits its lock.
    /// Callers invoke this after releasing their own guard, once the key
    /// is known to be gone, so the registry does not grow monotonically
    /// across deleted and expired ids.
    pub fn prune(&self, key: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = map.get(key) {
            // holders and waiters each keep an Arc clone alive
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

/// Stateful conversation store over a durable backend
pub struct ConversationStore {
    backend: Arc<dyn SessionBackend>,
    timeout: Duration,
    locks: KeyedLocks,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn SessionBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            locks: KeyedLocks::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Load a record, treating an expired one as absent and removing it.
    /// Expiry is judged against `last_accessed_at`, so two near-simultaneous
    /// reads of an expired record agree on its absence.
    ///
    /// Callers must hold the per-id lock: the load-then-remove is a
    /// read-modify-write, and an unlocked removal could delete a fresh
    /// conversation recreated under the same id in between.
    async fn load_live(&self, id: &str) -> Result<Option<Conversation>> {
        match self.backend.load(id).await? {
            Some(conversation) if conversation.is_expired(self.timeout) => {
                self.backend.remove(id).await?;
                tracing::info!(session_id = %id, "expired conversation removed");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Return the conversation for `id`, creating an empty one if absent.
    /// Refreshes `last_accessed_at`. Idempotent under concurrent access:
    /// the per-id lock serializes the check-then-create.
    pub async fn get_or_create(&self, id: &str) -> Result<Conversation> {
        let _guard = self.locks.acquire(id).await;

        match self.load_live(id).await? {
            Some(mut conversation) => {
                conversation.touch();
                self.backend.store(&conversation).await?;
                Ok(conversation)
            }
            None => {
                let conversation = Conversation::new(id);
                self.backend.store(&conversation).await?;
                tracing::info!(session_id = %id, "created conversation");
                Ok(conversation)
            }
        }
    }

    /// Read-only lookup; absent and expired both yield `None`. Takes the
    /// per-id guard so the lazy expiry removal cannot race a concurrent
    /// recreation of the same id.
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let found = {
            let _guard = self.locks.acquire(id).await;
            self.load_live(id).await?
        };
        if found.is_none() {
            self.locks.prune(id);
        }
        Ok(found)
    }

    /// Append one turn. Fails with `SessionNotFound` if the id is unknown
    /// or expired; callers that need creation semantics call
    /// `get_or_create` first.
    pub async fn append(
        &self,
        id: &str,
        role: Role,
        content: &str,
        usage: Option<TokenUsage>,
    ) -> Result<Conversation> {
        let _guard = self.locks.acquire(id).await;

        let mut conversation = self
            .load_live(id)
            .await?
            .ok_or_else(|| RagError::SessionNotFound { id: id.to_string() })?;

        conversation.push_turn(role, content, usage);
        self.backend.store(&conversation).await?;
        Ok(conversation)
    }

    /// Reset the turn sequence and counters, preserving the id
    pub async fn clear(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;

        let mut conversation = self
            .load_live(id)
            .await?
            .ok_or_else(|| RagError::SessionNotFound { id: id.to_string() })?;

        conversation.clear();
        self.backend.store(&conversation).await?;
        tracing::info!(session_id = %id, "cleared conversation history");
        Ok(())
    }

    /// Remove the conversation entirely; returns whether a live record
    /// was removed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = {
            let _guard = self.locks.acquire(id).await;

            let existed = self.load_live(id).await?.is_some();
            let removed = self.backend.remove(id).await?;
            if removed {
                tracing::info!(session_id = %id, "deleted conversation");
            }
            existed && removed
        };
        self.locks.prune(id);
        Ok(deleted)
    }

    /// Summaries of all live conversations, without turn bodies
    pub async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .backend
            .scan()
            .await?
            .into_iter()
            .filter(|c| !c.is_expired(self.timeout))
            .map(|c| c.summary())
            .collect();

        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryBackend;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn store() -> ConversationStore {
        ConversationStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(24 * 3600))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = store();
        let first = store.get_or_create("s1").await.unwrap();
        let second = store.get_or_create("s1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.turn_count, 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = store();
        store.get_or_create("s1").await.unwrap();
        store.append("s1", Role::User, "A", None).await.unwrap();
        store.append("s1", Role::Assistant, "B", None).await.unwrap();

        let conversation = store.get("s1").await.unwrap().unwrap();
        let turns: Vec<(Role, &str)> = conversation
            .turns
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect();
        assert_eq!(turns, vec![(Role::User, "A"), (Role::Assistant, "B")]);
    }

    #[tokio::test]
    async fn test_append_unknown_id_fails() {
        let store = store();
        let err = store.append("missing", Role::User, "A", None).await;
        assert!(matches!(err, Err(RagError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_clear_resets_counters_but_keeps_id() {
        let store = store();
        store.get_or_create("s1").await.unwrap();
        store
            .append(
                "s1",
                Role::Assistant,
                "B",
                Some(TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 2,
                    total_tokens: 3,
                }),
            )
            .await
            .unwrap();

        store.clear("s1").await.unwrap();
        let conversation = store.get("s1").await.unwrap().unwrap();
        assert_eq!(conversation.turn_count, 0);
        assert_eq!(conversation.total_tokens, 0);
        assert!(conversation.turns.is_empty());
    }

    #[tokio::test]
    async fn test_clear_unknown_id_fails() {
        let store = store();
        assert!(matches!(
            store.clear("missing").await,
            Err(RagError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = store();
        store.get_or_create("s1").await.unwrap();
        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_conversation_is_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConversationStore::new(backend.clone(), Duration::from_secs(3600));

        let mut stale = Conversation::new("old");
        stale.push_turn(Role::User, "hello", None);
        stale.last_accessed_at = Utc::now() - ChronoDuration::hours(2);
        backend.store(&stale).await.unwrap();

        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());

        // get_or_create after expiry yields a fresh, empty conversation
        let fresh = store.get_or_create("old").await.unwrap();
        assert_eq!(fresh.turn_count, 0);
    }

    /// Backend whose first `remove` stalls, widening the window between a
    /// reader observing an expired record and removing it
    struct StallingRemoveBackend {
        inner: MemoryBackend,
        stalled_once: AtomicBool,
    }

    impl StallingRemoveBackend {
        fn new() -> Self {
            Self {
                inner: MemoryBackend::new(),
                stalled_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SessionBackend for StallingRemoveBackend {
        async fn load(&self, id: &str) -> Result<Option<Conversation>> {
            self.inner.load(id).await
        }

        async fn store(&self, conversation: &Conversation) -> Result<()> {
            self.inner.store(conversation).await
        }

        async fn remove(&self, id: &str) -> Result<bool> {
            if !self.stalled_once.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.remove(id).await
        }

        async fn scan(&self) -> Result<Vec<Conversation>> {
            self.inner.scan().await
        }
    }

    #[tokio::test]
    async fn test_expired_read_cannot_delete_a_concurrent_recreation() {
        let backend = Arc::new(StallingRemoveBackend::new());
        let store = Arc::new(ConversationStore::new(
            backend.clone(),
            Duration::from_secs(3600),
        ));

        let mut stale = Conversation::new("s1");
        stale.last_accessed_at = Utc::now() - ChronoDuration::hours(2);
        backend.inner.store(&stale).await.unwrap();

        // reader observes the expired record and stalls inside its removal
        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.get("s1").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // recreation under the same id must wait for the reader rather
        // than lose its fresh record to the reader's in-flight removal
        let fresh = store.get_or_create("s1").await.unwrap();
        assert_eq!(fresh.turn_count, 0);
        store.append("s1", Role::User, "still here", None).await.unwrap();

        assert!(reader.await.unwrap().is_none());
        let conversation = store.get("s1").await.unwrap().unwrap();
        assert_eq!(conversation.turn_count, 1);
    }

    #[tokio::test]
    async fn test_delete_prunes_idle_lock_entry() {
        let store = store();
        store.get_or_create("s1").await.unwrap();
        assert!(store.locks.contains("s1"));

        store.delete("s1").await.unwrap();
        assert!(!store.locks.contains("s1"));
    }

    #[tokio::test]
    async fn test_get_on_absent_id_leaves_no_lock_entry() {
        let store = store();
        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(!store.locks.contains("ghost"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let store = Arc::new(store());
        store.get_or_create("s1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append("s1", Role::User, &format!("turn {}", i), None)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let conversation = store.get("s1").await.unwrap().unwrap();
        assert_eq!(conversation.turn_count, 8);
        assert_eq!(conversation.turns.len(), 8);
    }
}
