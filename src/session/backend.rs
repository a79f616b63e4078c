//! Durable key-value backends for conversation records
//!
//! The store defines what must be persisted and when it expires; the
//! backend only moves whole records in and out. `MemoryBackend` backs
//! tests and no-persistence deployments, `JsonFileBackend` keeps one JSON
//! file per conversation on disk.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::errors::{RagError, Result};
use crate::session::Conversation;

/// Per-key persistence of conversation records
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Conversation>>;
    async fn store(&self, conversation: &Conversation) -> Result<()>;
    /// Returns whether a record was removed
    async fn remove(&self, id: &str) -> Result<bool>;
    /// All stored records, in no particular order
    async fn scan(&self) -> Result<Vec<Conversation>>;
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Conversation>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn store(&self, conversation: &Conversation) -> Result<()> {
        self.records
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn scan(&self) -> Result<Vec<Conversation>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// One JSON file per conversation under a storage directory
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    storage_dir: PathBuf,
}

impl JsonFileBackend {
    /// Create the backend, creating the storage directory if needed
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        if !storage_dir.exists() {
            std::fs::create_dir_all(&storage_dir).map_err(|e| {
                RagError::Config(format!(
                    "failed to create session storage directory {}: {}",
                    storage_dir.display(),
                    e
                ))
            })?;
        }
        Ok(Self { storage_dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.storage_dir
            .join(format!("session_{}.json", sanitize_id(id)))
    }
}

/// Restrict ids to filename-safe characters; anything else maps to `-`
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[async_trait]
impl SessionBackend for JsonFileBackend {
    async fn load(&self, id: &str) -> Result<Option<Conversation>> {
        let path = self.record_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                let conversation: Conversation = serde_json::from_str(&json)?;
                Ok(Some(conversation))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, conversation: &Conversation) -> Result<()> {
        let path = self.record_path(&conversation.id);
        let json = serde_json::to_string_pretty(conversation)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let path = self.record_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan(&self) -> Result<Vec<Conversation>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.storage_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("session_") || !name.ends_with(".json") {
                continue;
            }
            let json = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&json) {
                Ok(conversation) => records.push(conversation),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable session record");
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();
        let mut conv = Conversation::new("s1");
        conv.push_turn(Role::User, "hello", None);

        backend.store(&conv).await.unwrap();
        let loaded = backend.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded, conv);

        assert!(backend.remove("s1").await.unwrap());
        assert!(!backend.remove("s1").await.unwrap());
        assert!(backend.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().to_path_buf()).unwrap();

        let mut conv = Conversation::new("user/42");
        conv.push_turn(Role::User, "hello", None);
        conv.push_turn(Role::Assistant, "hi", None);

        backend.store(&conv).await.unwrap();
        let loaded = backend.load("user/42").await.unwrap().unwrap();
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.id, "user/42");

        let scanned = backend.scan().await.unwrap();
        assert_eq!(scanned.len(), 1);

        assert!(backend.remove("user/42").await.unwrap());
        assert!(backend.load("user/42").await.unwrap().is_none());
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("abc-123_X"), "abc-123_X");
        assert_eq!(sanitize_id("a/b c"), "a-b-c");
    }
}
