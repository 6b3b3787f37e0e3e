//! Resource type to provider mapping.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::ResourceKey;

use super::adapter::Provider;
use super::local_file::LocalFileProvider;
use super::null::NullProvider;

/// Registry of providers keyed by resource type.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in providers.
    ///
    /// Relative `local_file` paths are resolved against `root`.
    #[must_use]
    pub fn with_builtins(root: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(NullProvider::RESOURCE_TYPE, Arc::new(NullProvider::new()));
        registry.register(
            LocalFileProvider::RESOURCE_TYPE,
            Arc::new(LocalFileProvider::new(root)),
        );
        registry
    }

    /// Registers a provider, replacing any previous one for the same type.
    pub fn register(&mut self, resource_type: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(resource_type.into(), provider);
    }

    /// Returns the provider for a resource type.
    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(resource_type).cloned()
    }

    /// Returns the provider for a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownResourceType`] if no provider is registered.
    pub fn require(&self, key: &ResourceKey) -> Result<Arc<dyn Provider>, ConfigError> {
        self.get(&key.resource_type)
            .ok_or_else(|| ConfigError::UnknownResourceType {
                resource_type: key.resource_type.clone(),
                key: key.clone(),
            })
    }

    /// Returns true if a provider is registered for the type.
    #[must_use]
    pub fn supports(&self, resource_type: &str) -> bool {
        self.providers.contains_key(resource_type)
    }

    /// Iterates registered resource types.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
