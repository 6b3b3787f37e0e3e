//! State types for recording applied resources.
//!
//! A [`StateEntry`] is the only thing that survives between runs: the last
//! successfully recorded attributes of one resource and the remote
//! identifier the provider assigned to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::StateError;
use crate::model::{Attributes, LifecyclePolicy, ResourceKey};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Recorded state of one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Resource type at the time of recording.
    pub resource_type: String,
    /// Identifier assigned by the provider.
    pub remote_id: String,
    /// Attributes as last reported by the provider.
    #[serde(default)]
    pub attributes: Attributes,
    /// Desired attributes as last applied, with references substituted.
    #[serde(default)]
    pub inputs: Attributes,
    /// Dependencies at the time of recording, used to order destroys of
    /// resources that have left the model.
    #[serde(default)]
    pub dependencies: Vec<ResourceKey>,
    /// Lifecycle policy at the time of recording.
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
    /// When the remote object was created.
    pub created_at: DateTime<Utc>,
    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
}

/// A point-in-time copy of every entry in a store.
pub type StateSnapshot = BTreeMap<ResourceKey, StateEntry>;

/// On-disk document used by file-based backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State format version.
    pub version: String,
    /// Identity of this state's history, fixed at creation.
    pub lineage: String,
    /// Incremented on every write.
    pub serial: u64,
    /// Recorded resources.
    #[serde(default)]
    pub resources: StateSnapshot,
}

impl StateEntry {
    /// Creates a new entry for a freshly created remote object.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, remote_id: impl Into<String>, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            remote_id: remote_id.into(),
            attributes,
            inputs: Attributes::new(),
            dependencies: Vec::new(),
            lifecycle: LifecyclePolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the inputs, dependencies and policy the object was applied with.
    #[must_use]
    pub fn applied_with(
        mut self,
        inputs: Attributes,
        dependencies: Vec<ResourceKey>,
        lifecycle: LifecyclePolicy,
    ) -> Self {
        self.inputs = inputs;
        self.dependencies = dependencies;
        self.lifecycle = lifecycle;
        self
    }

    /// Replaces the provider-reported attributes and bumps `updated_at`.
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
        self.updated_at = Utc::now();
    }

    /// Returns the recorded value of a top-level attribute, falling back to
    /// the applied input when the provider did not report it.
    #[must_use]
    pub fn recorded(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name).or_else(|| self.inputs.get(name))
    }

    /// Checks that the entry is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Inconsistent`] if the remote identifier is
    /// missing or the recorded type disagrees with the key.
    pub fn check_consistency(&self, key: &ResourceKey) -> Result<(), StateError> {
        if self.remote_id.trim().is_empty() {
            return Err(StateError::inconsistent(
                key.clone(),
                "entry has no remote identifier",
            ));
        }
        if self.resource_type != key.resource_type {
            return Err(StateError::inconsistent(
                key.clone(),
                format!(
                    "entry was recorded as type '{}' but is keyed as '{}'",
                    self.resource_type, key.resource_type
                ),
            ));
        }
        Ok(())
    }
}

impl StateDocument {
    /// Creates a new empty document with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            lineage: Uuid::new_v4().to_string(),
            serial: 0,
            resources: StateSnapshot::new(),
        }
    }

    /// Checks the document version.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::VersionMismatch`] for unknown versions.
    pub fn check_version(&self) -> Result<(), StateError> {
        if self.version == STATE_VERSION {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            })
        }
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}
