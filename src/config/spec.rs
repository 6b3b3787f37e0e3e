//! Configuration specification types.
//!
//! This module defines the structs that map to the `converge.yaml` file and
//! their conversion into a [`ResourceModel`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::model::{AttributePath, Expr, LifecyclePolicy, ResourceInstance, ResourceKey, ResourceModel};
use crate::planner::{FailurePolicy, DEFAULT_PARALLELISM};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Execution settings for `apply`.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Declared resources.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackend,
    /// State file path for the local backend, relative to the config file.
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// JSON document on local disk.
    #[default]
    Local,
    /// Process memory, discarded on exit.
    Memory,
}

/// Execution settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Maximum number of provider operations in flight.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Keep applying independent resources after a failure.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// One declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Resource type, e.g. `local_file`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Name, unique within the type.
    pub name: String,
    /// Attribute values; strings may contain `${type.name.path}` references.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Explicit dependencies as `type.name`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Lifecycle policy.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Lifecycle block of a resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Refuse any plan that would destroy or replace the resource.
    #[serde(default)]
    pub prevent_destroy: bool,
    /// Attribute paths whose drift is ignored.
    #[serde(default)]
    pub ignore_changes: Vec<String>,
    /// Create the replacement before destroying the old object.
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Attribute paths whose change forces a replacement.
    #[serde(default)]
    pub replace_triggered_by: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            continue_on_error: false,
        }
    }
}

fn default_environment() -> String {
    String::from("dev")
}

const fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl ModelConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Converts the configuration into a resource model.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed keys, paths or references, or on
    /// duplicate resources.
    pub fn to_model(&self) -> Result<ResourceModel, ConfigError> {
        let mut model = ResourceModel::new();
        for resource in &self.resources {
            model.insert(resource.to_instance()?)?;
        }
        Ok(model)
    }
}

impl ExecutionConfig {
    /// Returns the failure policy these settings select.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        if self.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Halt
        }
    }
}

impl ResourceConfig {
    /// Returns the resource key.
    ///
    /// # Errors
    ///
    /// Returns an error if the type or name is not an identifier.
    pub fn key(&self) -> Result<ResourceKey, ConfigError> {
        format!("{}.{}", self.resource_type, self.name).parse()
    }

    /// Converts this declaration into a model instance.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed keys, paths or references.
    pub fn to_instance(&self) -> Result<ResourceInstance, ConfigError> {
        let mut instance = ResourceInstance::new(self.key()?).with_lifecycle(self.lifecycle.to_policy()?);

        for (name, value) in &self.attributes {
            instance = instance.with_attribute(name.clone(), Expr::parse(value)?);
        }
        for dependency in &self.depends_on {
            instance = instance.with_dependency(dependency.parse()?);
        }

        Ok(instance)
    }
}

impl LifecycleConfig {
    /// Converts the lifecycle block into a policy.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is malformed.
    pub fn to_policy(&self) -> Result<LifecyclePolicy, ConfigError> {
        let parse = |paths: &[String]| {
            paths
                .iter()
                .map(|p| p.parse::<AttributePath>())
                .collect::<Result<_, _>>()
        };

        Ok(LifecyclePolicy {
            prevent_destroy: self.prevent_destroy,
            ignore_changes: parse(&self.ignore_changes)?,
            create_before_destroy: self.create_before_destroy,
            replace_triggered_by: parse(&self.replace_triggered_by)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(resource_type: &str, name: &str) -> ResourceConfig {
        ResourceConfig {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attributes: BTreeMap::new(),
            depends_on: vec![],
            lifecycle: LifecycleConfig::default(),
        }
    }

    #[test]
    fn test_resource_converts_references() {
        let mut subnet = resource("aws_subnet", "a");
        subnet.attributes.insert(String::from("vpc_id"), json!("${aws_vpc.main.id}"));
        subnet.attributes.insert(String::from("cidr"), json!("10.0.1.0/24"));

        let instance = subnet.to_instance().unwrap();
        assert_eq!(instance.key.to_string(), "aws_subnet.a");
        assert_eq!(instance.references().len(), 1);
        assert!(instance.attributes["cidr"].is_literal());
    }

    #[test]
    fn test_lifecycle_paths_are_parsed() {
        let lifecycle = LifecycleConfig {
            prevent_destroy: true,
            ignore_changes: vec![String::from("tags.Name")],
            create_before_destroy: false,
            replace_triggered_by: vec![String::from("user_data")],
        };

        let policy = lifecycle.to_policy().unwrap();
        assert!(policy.prevent_destroy);
        assert!(policy.ignores(&"tags.Name".parse().unwrap()));
        assert!(policy.triggers_replace(&"user_data".parse().unwrap()));
    }

    #[test]
    fn test_bad_key_is_rejected() {
        let bad = resource("aws vpc", "main");
        assert!(matches!(bad.key(), Err(ConfigError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_duplicate_resources_are_rejected() {
        let config = ModelConfig {
            project: ProjectConfig {
                name: String::from("demo"),
                environment: default_environment(),
            },
            state: StateConfig::default(),
            execution: ExecutionConfig::default(),
            resources: vec![resource("null_resource", "a"), resource("null_resource", "a")],
        };

        assert!(matches!(config.to_model(), Err(ConfigError::DuplicateResource { .. })));
    }

    #[test]
    fn test_execution_defaults() {
        let execution = ExecutionConfig::default();
        assert_eq!(execution.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(execution.failure_policy(), FailurePolicy::Halt);
    }
}
