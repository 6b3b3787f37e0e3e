//! Desired resource instances and their lifecycle policies.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::ConfigError;

use super::key::{AttributePath, ResourceKey};
use super::value::{Expr, Reference};

/// Per-resource rules that veto, suppress or force planned actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Refuse any plan that destroys this resource, including the destroy
    /// half of a replacement.
    #[serde(default)]
    pub prevent_destroy: bool,
    /// Attribute paths whose changes are ignored when diffing.
    #[serde(default)]
    pub ignore_changes: BTreeSet<AttributePath>,
    /// Create the replacement before destroying the original.
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Attribute paths whose changes always force a replacement.
    #[serde(default)]
    pub replace_triggered_by: BTreeSet<AttributePath>,
}

/// A desired resource instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInstance {
    /// Stable identity.
    pub key: ResourceKey,
    /// Desired attributes.
    pub attributes: BTreeMap<String, Expr>,
    /// Explicit ordering hints.
    pub depends_on: Vec<ResourceKey>,
    /// Lifecycle policy.
    pub lifecycle: LifecyclePolicy,
}

/// The full set of desired resources for one run, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceModel {
    /// Instances in declaration order.
    resources: Vec<ResourceInstance>,
    /// Index from key to position in `resources`.
    index: HashMap<ResourceKey, usize>,
}

impl LifecyclePolicy {
    /// Returns true if any ignored path covers `path`.
    #[must_use]
    pub fn ignores(&self, path: &AttributePath) -> bool {
        self.ignore_changes.iter().any(|p| p.covers(path))
    }

    /// Returns true if any replace trigger covers `path`.
    #[must_use]
    pub fn triggers_replace(&self, path: &AttributePath) -> bool {
        self.replace_triggered_by.iter().any(|p| p.covers(path))
    }
}

impl ResourceInstance {
    /// Creates an instance with no attributes, dependencies or policy.
    #[must_use]
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            lifecycle: LifecyclePolicy::default(),
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Adds an explicit dependency.
    #[must_use]
    pub fn with_dependency(mut self, key: ResourceKey) -> Self {
        self.depends_on.push(key);
        self
    }

    /// Sets the lifecycle policy.
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: LifecyclePolicy) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Returns every reference found in the attributes.
    #[must_use]
    pub fn references(&self) -> BTreeSet<Reference> {
        let mut refs = BTreeSet::new();
        for expr in self.attributes.values() {
            expr.collect_references(&mut refs);
        }
        refs
    }
}

impl ResourceModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource with the same key already exists.
    pub fn insert(&mut self, resource: ResourceInstance) -> Result<(), ConfigError> {
        if self.index.contains_key(&resource.key) {
            return Err(ConfigError::DuplicateResource { key: resource.key });
        }
        self.index.insert(resource.key.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    /// Builds a model from a list of resources.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate keys.
    pub fn from_resources(resources: impl IntoIterator<Item = ResourceInstance>) -> Result<Self, ConfigError> {
        let mut model = Self::new();
        for resource in resources {
            model.insert(resource)?;
        }
        Ok(model)
    }

    /// Looks a resource up by key.
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceInstance> {
        self.index.get(key).map(|&i| &self.resources[i])
    }

    /// Returns true if the key is declared.
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Iterates resources in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceInstance> {
        self.resources.iter()
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the model declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
