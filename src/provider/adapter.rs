//! Provider adapter trait.
//!
//! A provider performs the remote create/read/update/destroy calls for one
//! resource type and declares which attributes it can change in place.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::ProviderResult;
use crate::model::{AttributePath, Attributes};
use crate::planner::AttributeChange;

/// Static capabilities of a resource type.
///
/// A path is updatable when an `updatable` entry covers it, replace-only when
/// a `replace_only` entry covers it, and falls back to
/// `updatable_by_default` otherwise. `replace_only` wins over `updatable`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSchema {
    /// Paths that can be changed without recreating the object.
    pub updatable: BTreeSet<AttributePath>,
    /// Paths whose change always requires a replacement.
    pub replace_only: BTreeSet<AttributePath>,
    /// Whether paths listed in neither set are updatable.
    pub updatable_by_default: bool,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Identifier assigned by the remote system.
    pub remote_id: String,
    /// Attributes reported by the remote system, including computed ones.
    pub attributes: Attributes,
}

impl ResourceSchema {
    /// Schema where every attribute is replace-only unless listed.
    #[must_use]
    pub fn replace_only_by_default() -> Self {
        Self::default()
    }

    /// Schema where every attribute is updatable unless listed.
    #[must_use]
    pub fn updatable_by_default() -> Self {
        Self {
            updatable_by_default: true,
            ..Self::default()
        }
    }

    /// Marks a path as updatable in place.
    #[must_use]
    pub fn with_updatable(mut self, path: AttributePath) -> Self {
        self.updatable.insert(path);
        self
    }

    /// Marks a path as replace-only.
    #[must_use]
    pub fn with_replace_only(mut self, path: AttributePath) -> Self {
        self.replace_only.insert(path);
        self
    }

    /// Returns true if a change at `path` can be applied in place.
    #[must_use]
    pub fn is_updatable(&self, path: &AttributePath) -> bool {
        if self.replace_only.iter().any(|p| p.covers(path)) {
            return false;
        }
        if self.updatable.iter().any(|p| p.covers(path)) {
            return true;
        }
        self.updatable_by_default
    }
}

/// Adapter for one resource type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the static capabilities of the resource type.
    fn schema(&self) -> ResourceSchema;

    /// Creates a remote object from fully resolved attributes.
    async fn create(&self, attributes: &Attributes) -> ProviderResult<Created>;

    /// Reads the current attributes of a remote object.
    ///
    /// Returns `Ok(None)` when the object no longer exists.
    async fn read(&self, remote_id: &str) -> ProviderResult<Option<Attributes>>;

    /// Applies in-place changes.
    ///
    /// `attributes` is the complete desired attribute map, `changes` lists
    /// the leaf paths that differ from what is recorded.
    async fn update(
        &self,
        remote_id: &str,
        attributes: &Attributes,
        changes: &[AttributeChange],
    ) -> ProviderResult<Attributes>;

    /// Destroys a remote object.
    async fn destroy(&self, remote_id: &str) -> ProviderResult<()>;
}
