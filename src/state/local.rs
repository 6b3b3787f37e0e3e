//! Local file-based state storage backend.
//!
//! The whole state lives in one JSON document. Every write is a
//! read-modify-write under an async mutex, persisted through a temporary file
//! that is synced and then renamed over the previous document, so a crash
//! leaves either the old or the new document on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConvergeError, Result, StateError};
use crate::model::ResourceKey;

use super::store::StateStore;
use super::types::{StateDocument, StateEntry, StateSnapshot};

/// Default state directory name.
pub const STATE_DIR: &str = ".converge";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl LocalStateStore {
    /// Creates a new local state store under `.converge/` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| ConvergeError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local state store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);

        Self {
            base_dir,
            state_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a new local state store from a custom state file path.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Self {
            base_dir,
            state_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the path of the state document.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Loads the full state document, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, parsed or has an
    /// unsupported version.
    pub async fn document(&self) -> Result<Option<StateDocument>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read state file: {e}"),
        })?;

        let document: StateDocument = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse state file {}: {e}", self.state_path.display()),
        })?;
        document.check_version()?;

        Ok(Some(document))
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.base_dir).await.unwrap_or(false) {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::storage(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }

    /// Writes the document atomically.
    async fn save(&self, document: &StateDocument) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = self.state_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to create temp state file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::storage(format!("Failed to write state file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::storage(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to rename state file: {e}")))?;

        debug!(
            "State saved to {} (serial {})",
            self.state_path.display(),
            document.serial
        );
        Ok(())
    }

    /// Applies `change` to the current document and persists the result.
    async fn modify<T: Send>(&self, change: impl FnOnce(&mut StateDocument) -> T + Send) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut document = match self.document().await? {
            Some(document) => document,
            None => {
                info!("Initializing new state at {}", self.state_path.display());
                StateDocument::new()
            }
        };

        let result = change(&mut document);
        document.serial += 1;
        self.save(&document).await?;
        Ok(result)
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<StateEntry>> {
        Ok(self
            .document()
            .await?
            .and_then(|mut document| document.resources.remove(key)))
    }

    async fn put(&self, key: &ResourceKey, entry: StateEntry) -> Result<()> {
        self.modify(|document| {
            document.resources.insert(key.clone(), entry);
        })
        .await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut document) = self.document().await? else {
            return Ok(false);
        };
        if document.resources.remove(key).is_none() {
            return Ok(false);
        }
        document.serial += 1;
        self.save(&document).await?;
        Ok(true)
    }

    async fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(self
            .document()
            .await?
            .map(|document| document.resources)
            .unwrap_or_default())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join(STATE_DIR));
        (store, temp_dir)
    }

    fn key(s: &str) -> ResourceKey {
        s.parse().unwrap()
    }

    fn entry(id: &str) -> StateEntry {
        StateEntry::new(
            "aws_vpc",
            id,
            [(String::from("cidr_block"), json!("10.0.0.0/16"))].into(),
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp) = create_test_store();

        store.put(&key("aws_vpc.main"), entry("vpc-1")).await.expect("put failed");

        let loaded = store
            .get(&key("aws_vpc.main"))
            .await
            .expect("get failed")
            .expect("entry should exist");
        assert_eq!(loaded.remote_id, "vpc-1");
        assert_eq!(loaded.attributes["cidr_block"], json!("10.0.0.0/16"));
    }

    #[tokio::test]
    async fn test_get_without_state_file() {
        let (store, _temp) = create_test_store();

        assert!(store.get(&key("aws_vpc.main")).await.expect("get failed").is_none());
        assert!(store.snapshot().await.expect("snapshot failed").is_empty());
        assert!(!store.delete(&key("aws_vpc.main")).await.expect("delete failed"));
    }

    #[tokio::test]
    async fn test_serial_increments_and_lineage_is_stable() {
        let (store, _temp) = create_test_store();

        store.put(&key("aws_vpc.a"), entry("vpc-a")).await.unwrap();
        let first = store.document().await.unwrap().unwrap();

        store.put(&key("aws_vpc.b"), entry("vpc-b")).await.unwrap();
        store.delete(&key("aws_vpc.a")).await.unwrap();
        let last = store.document().await.unwrap().unwrap();

        assert_eq!(first.serial, 1);
        assert_eq!(last.serial, 3);
        assert_eq!(first.lineage, last.lineage);
        assert_eq!(last.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let (store, temp) = create_test_store();
        store.put(&key("aws_vpc.main"), entry("vpc-1")).await.unwrap();
        drop(store);

        let reopened = LocalStateStore::with_state_path(temp.path().join(STATE_DIR).join("state.json"));
        assert!(reopened.get(&key("aws_vpc.main")).await.unwrap().is_some());
        assert!(!temp.path().join(STATE_DIR).join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_document_is_an_error() {
        let (store, _temp) = create_test_store();
        store.put(&key("aws_vpc.main"), entry("vpc-1")).await.unwrap();
        std::fs::write(store.state_path(), "{ not json").unwrap();

        let result = store.get(&key("aws_vpc.main")).await;
        assert!(matches!(
            result,
            Err(ConvergeError::State(StateError::Corrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_puts_are_not_lost() {
        let (store, _temp) = create_test_store();
        let store = Arc::new(store);
        let mut handles = Vec::new();

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let k = ResourceKey::new("aws_vpc", format!("v{i}"));
                store.put(&k, entry(&format!("vpc-{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let document = store.document().await.unwrap().unwrap();
        assert_eq!(document.resources.len(), 8);
        assert_eq!(document.serial, 8);
    }
}
