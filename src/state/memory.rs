//! In-memory state storage backend.
//!
//! Used by tests and by callers that manage persistence themselves.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::ResourceKey;

use super::store::StateStore;
use super::types::{StateEntry, StateSnapshot};

/// State store backed by a map behind an async read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<StateSnapshot>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with entries.
    #[must_use]
    pub fn with_entries(entries: StateSnapshot) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<StateEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &ResourceKey, entry: StateEntry) -> Result<()> {
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(self.entries.read().await.clone())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
