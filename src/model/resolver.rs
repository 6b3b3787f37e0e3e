//! Reference resolution.
//!
//! Scans every desired attribute for references into other resources and
//! merges them with the explicit `depends_on` hints into one dependency
//! relation.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::ResolveError;

use super::key::ResourceKey;
use super::resource::ResourceModel;

/// Dependencies of a single resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDependencies {
    /// Inferred from attribute references.
    pub implicit: BTreeSet<ResourceKey>,
    /// Declared through `depends_on`.
    pub explicit: BTreeSet<ResourceKey>,
}

/// Resolved dependency relation for a whole model.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    by_resource: BTreeMap<ResourceKey, ResourceDependencies>,
}

/// Resolver for inter-resource references.
#[derive(Debug, Default)]
pub struct ReferenceResolver;

impl ResourceDependencies {
    /// Returns the union of implicit and explicit dependencies.
    #[must_use]
    pub fn all(&self) -> BTreeSet<ResourceKey> {
        self.implicit.union(&self.explicit).cloned().collect()
    }
}

impl DependencySet {
    /// Returns the dependencies of a resource.
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceDependencies> {
        self.by_resource.get(key)
    }

    /// Returns the combined dependencies of a resource (empty if unknown).
    #[must_use]
    pub fn all_of(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        self.by_resource
            .get(key)
            .map(ResourceDependencies::all)
            .unwrap_or_default()
    }

    /// Iterates `(dependent, dependency)` edges.
    pub fn edges(&self) -> impl Iterator<Item = (&ResourceKey, ResourceKey)> {
        self.by_resource
            .iter()
            .flat_map(|(key, deps)| deps.all().into_iter().map(move |dep| (key, dep)))
    }

    /// Iterates resources and their dependencies.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ResourceDependencies)> {
        self.by_resource.iter()
    }
}

impl ReferenceResolver {
    /// Creates a new resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Resolves the dependency relation for a model.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DanglingReference`] if a reference or explicit
    /// dependency names an undeclared resource, and
    /// [`ResolveError::SelfDependency`] if a resource depends on itself.
    pub fn resolve(&self, model: &ResourceModel) -> Result<DependencySet, ResolveError> {
        let mut by_resource = BTreeMap::new();

        for resource in model.iter() {
            let mut deps = ResourceDependencies::default();

            for reference in resource.references() {
                Self::check_target(model, &resource.key, &reference.target)?;
                deps.implicit.insert(reference.target);
            }

            for target in &resource.depends_on {
                Self::check_target(model, &resource.key, target)?;
                deps.explicit.insert(target.clone());
            }

            debug!(
                "{} depends on {} resource(s) ({} implicit, {} explicit)",
                resource.key,
                deps.all().len(),
                deps.implicit.len(),
                deps.explicit.len()
            );
            by_resource.insert(resource.key.clone(), deps);
        }

        Ok(DependencySet { by_resource })
    }

    fn check_target(
        model: &ResourceModel,
        source: &ResourceKey,
        target: &ResourceKey,
    ) -> Result<(), ResolveError> {
        if source == target {
            return Err(ResolveError::SelfDependency {
                resource: source.clone(),
            });
        }
        if !model.contains(target) {
            return Err(ResolveError::DanglingReference {
                source_key: source.clone(),
                target: target.clone(),
            });
        }
        Ok(())
    }
}
