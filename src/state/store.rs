//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ResourceKey;
use super::types::{StateEntry, StateSnapshot};

/// Trait for state storage backends.
///
/// `put` and `delete` must be atomic per key and safe to call concurrently
/// for distinct keys.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Gets the entry for a key.
    ///
    /// Returns `None` if the key was never recorded or has been deleted.
    async fn get(&self, key: &ResourceKey) -> Result<Option<StateEntry>>;

    /// Records the entry for a key, replacing any previous entry.
    async fn put(&self, key: &ResourceKey, entry: StateEntry) -> Result<()>;

    /// Deletes the entry for a key.
    ///
    /// Returns true if an entry was removed.
    async fn delete(&self, key: &ResourceKey) -> Result<bool>;

    /// Returns a copy of every recorded entry.
    async fn snapshot(&self) -> Result<StateSnapshot>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<StateEntry>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &ResourceKey, entry: StateEntry) -> Result<()> {
        (**self).put(key, entry).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn snapshot(&self) -> Result<StateSnapshot> {
        (**self).snapshot().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
