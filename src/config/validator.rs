//! Configuration validation.
//!
//! Collects every problem in a configuration before anything is planned, so
//! a user sees all mistakes in one pass instead of one per run.

use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::error::{ConfigError, ConvergeError, Result};
use crate::model::{is_identifier, AttributePath, Expr, ResourceKey};

use super::spec::{ExecutionConfig, LifecycleConfig, ModelConfig, ProjectConfig, ResourceConfig, StateBackend, StateConfig};

/// Validator for model configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Resource types with a registered provider; empty means unchecked.
    known_types: HashSet<String>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that does not check resource types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts resource types to the given set.
    #[must_use]
    pub fn with_known_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; the full list is only available
    /// through [`ConfigValidator::check`].
    pub fn validate(&self, config: &ModelConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(ConvergeError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Runs every check and returns all findings.
    #[must_use]
    pub fn check(&self, config: &ModelConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_execution(&config.execution, &mut result);
        self.validate_resources(&config.resources, &mut result);

        result
    }

    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.error("project.environment", "Environment cannot be empty");
        }
    }

    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::Local => {
                if state.path.as_ref().is_some_and(String::is_empty) {
                    result.error("state.path", "State path cannot be empty");
                }
            }
            StateBackend::Memory => {
                if state.path.is_some() {
                    result.warnings.push(String::from(
                        "state.path is ignored by the memory backend",
                    ));
                }
                result
                    .warnings
                    .push(String::from("memory backend: state is lost when the process exits"));
            }
        }
    }

    fn validate_execution(execution: &ExecutionConfig, result: &mut ValidationResult) {
        if execution.parallelism == 0 {
            result.error("execution.parallelism", "Parallelism must be at least 1");
        }
    }

    fn validate_resources(&self, resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result.warnings.push(String::from("No resources defined in configuration"));
            return;
        }

        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if resource.resource_type.is_empty() {
                result.error(format!("{prefix}.type"), "Resource type cannot be empty");
            } else if !is_identifier(&resource.resource_type) {
                result.error(
                    format!("{prefix}.type"),
                    format!("Resource type '{}' is not an identifier", resource.resource_type),
                );
            } else if !self.known_types.is_empty() && !self.known_types.contains(&resource.resource_type) {
                result.error(
                    format!("{prefix}.type"),
                    format!("No provider for resource type '{}'", resource.resource_type),
                );
            }

            if !is_identifier(&resource.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Resource name '{}' is not an identifier", resource.name),
                );
            }

            if !seen.insert((resource.resource_type.as_str(), resource.name.as_str())) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Duplicate resource: {}.{}", resource.resource_type, resource.name),
                );
            }

            for (name, value) in &resource.attributes {
                if let Err(e) = Expr::parse(value) {
                    result.error(format!("{prefix}.attributes.{name}"), e.to_string());
                }
            }

            for (j, dependency) in resource.depends_on.iter().enumerate() {
                if let Err(e) = dependency.parse::<ResourceKey>() {
                    result.error(format!("{prefix}.depends_on[{j}]"), e.to_string());
                }
            }

            Self::validate_lifecycle(&resource.lifecycle, &prefix, result);
        }
    }

    fn validate_lifecycle(lifecycle: &LifecycleConfig, prefix: &str, result: &mut ValidationResult) {
        let mut parse = |paths: &[String], field: &str| -> BTreeSet<AttributePath> {
            let mut parsed = BTreeSet::new();
            for (j, path) in paths.iter().enumerate() {
                match path.parse::<AttributePath>() {
                    Ok(p) => {
                        parsed.insert(p);
                    }
                    Err(e) => result.error(format!("{prefix}.lifecycle.{field}[{j}]"), e.to_string()),
                }
            }
            parsed
        };

        let ignored = parse(&lifecycle.ignore_changes, "ignore_changes");
        let triggers = parse(&lifecycle.replace_triggered_by, "replace_triggered_by");

        // A trigger under an ignored path could never fire
        for trigger in &triggers {
            if ignored.iter().any(|i| i.covers(trigger)) {
                result.error(
                    format!("{prefix}.lifecycle.replace_triggered_by"),
                    format!("'{trigger}' is also covered by ignore_changes"),
                );
            }
        }

        if lifecycle.prevent_destroy && !triggers.is_empty() {
            result.warnings.push(format!(
                "{prefix}: replace_triggered_by on a prevent_destroy resource makes any trigger change fail to plan"
            ));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
