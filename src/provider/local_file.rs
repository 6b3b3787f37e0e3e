//! The `local_file` provider.
//!
//! Manages a file on the local filesystem. The remote identifier is the
//! absolute path of the file.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::model::{AttributePath, Attributes};
use crate::planner::AttributeChange;

use super::adapter::{Created, Provider, ResourceSchema};

/// Provider writing `content` to `filename`.
#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    /// Directory relative filenames are resolved against.
    root: PathBuf,
}

impl LocalFileProvider {
    /// Resource type served by this provider.
    pub const RESOURCE_TYPE: &'static str = "local_file";

    /// Creates the provider.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, attributes: &Attributes) -> ProviderResult<PathBuf> {
        let filename = attributes
            .get("filename")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::rejected("local_file requires a non-empty string 'filename'"))?;

        let path = Path::new(filename);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }

    fn content(attributes: &Attributes) -> ProviderResult<&str> {
        match attributes.get("content") {
            None | Some(Value::Null) => Ok(""),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(ProviderError::rejected(format!(
                "local_file 'content' must be a string, got {other}"
            ))),
        }
    }

    async fn write(path: &Path, attributes: &Attributes) -> ProviderResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::rejected(format!("cannot create {}: {e}", parent.display())))?;
        }

        fs::write(path, Self::content(attributes)?)
            .await
            .map_err(|e| ProviderError::rejected(format!("cannot write {}: {e}", path.display())))?;

        if let Some(mode) = attributes.get("file_permission").and_then(Value::as_str) {
            set_permissions(path, mode).await?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: &str) -> ProviderResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let bits = u32::from_str_radix(mode, 8)
        .map_err(|_| ProviderError::rejected(format!("invalid file_permission '{mode}'")))?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
        .await
        .map_err(|e| ProviderError::rejected(format!("cannot chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: &str) -> ProviderResult<()> {
    Ok(())
}

#[async_trait]
impl Provider for LocalFileProvider {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::replace_only_by_default()
            .with_updatable(AttributePath::root("content"))
            .with_updatable(AttributePath::root("file_permission"))
    }

    async fn create(&self, attributes: &Attributes) -> ProviderResult<Created> {
        let path = self.resolve(attributes)?;
        Self::write(&path, attributes).await?;

        let remote_id = path.display().to_string();
        debug!("local_file written: {remote_id}");

        let mut result = attributes.clone();
        result.insert(String::from("id"), Value::String(remote_id.clone()));
        Ok(Created {
            remote_id,
            attributes: result,
        })
    }

    async fn read(&self, remote_id: &str) -> ProviderResult<Option<Attributes>> {
        match fs::read_to_string(remote_id).await {
            Ok(content) => Ok(Some([(String::from("content"), Value::String(content))].into())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::unavailable(format!("cannot read {remote_id}: {e}"))),
        }
    }

    async fn update(
        &self,
        remote_id: &str,
        attributes: &Attributes,
        changes: &[AttributeChange],
    ) -> ProviderResult<Attributes> {
        debug!("local_file {remote_id}: updating {} attribute(s)", changes.len());
        Self::write(Path::new(remote_id), attributes).await?;

        let mut result = attributes.clone();
        result.insert(String::from("id"), Value::String(remote_id.to_string()));
        Ok(result)
    }

    async fn destroy(&self, remote_id: &str) -> ProviderResult<()> {
        match fs::remove_file(remote_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProviderError::NotFound {
                remote_id: remote_id.to_string(),
            }),
            Err(e) => Err(ProviderError::rejected(format!("cannot remove {remote_id}: {e}"))),
        }
    }
}
