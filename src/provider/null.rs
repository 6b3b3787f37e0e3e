//! The `null_resource` provider.
//!
//! Holds no remote object at all. Useful for wiring dependencies, and for
//! forcing replacements through its `triggers` map.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::ProviderResult;
use crate::model::{AttributePath, Attributes};
use crate::planner::AttributeChange;

use super::adapter::{Created, Provider, ResourceSchema};

/// In-process provider that assigns identifiers and echoes attributes.
#[derive(Debug, Default)]
pub struct NullProvider;

impl NullProvider {
    /// Resource type served by this provider.
    pub const RESOURCE_TYPE: &'static str = "null_resource";

    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn with_id(remote_id: &str, attributes: &Attributes) -> Attributes {
        let mut result = attributes.clone();
        result.insert(String::from("id"), Value::String(remote_id.to_string()));
        result
    }
}

#[async_trait]
impl Provider for NullProvider {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::updatable_by_default().with_replace_only(AttributePath::root("triggers"))
    }

    async fn create(&self, attributes: &Attributes) -> ProviderResult<Created> {
        let remote_id = Uuid::new_v4().to_string();
        debug!("null_resource created: {remote_id}");
        Ok(Created {
            attributes: Self::with_id(&remote_id, attributes),
            remote_id,
        })
    }

    async fn read(&self, _remote_id: &str) -> ProviderResult<Option<Attributes>> {
        Ok(Some(Attributes::new()))
    }

    async fn update(
        &self,
        remote_id: &str,
        attributes: &Attributes,
        _changes: &[AttributeChange],
    ) -> ProviderResult<Attributes> {
        Ok(Self::with_id(remote_id, attributes))
    }

    async fn destroy(&self, remote_id: &str) -> ProviderResult<()> {
        debug!("null_resource destroyed: {remote_id}");
        Ok(())
    }
}
