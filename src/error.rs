//! Error types for the converge reconciliation engine.
//!
//! The hierarchy mirrors the life of a run: configuration problems
//! (unreadable files, dangling references, cycles) are found before anything
//! executes, policy violations abort a plan, state problems surface from the
//! store, and provider failures are localized to a single resource.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ResourceKey;

/// The main error type for the converge engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Configuration file errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reference resolution errors.
    #[error("Reference error: {0}")]
    Resolve(#[from] ResolveError),

    /// Dependency graph errors.
    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    /// Lifecycle policy violations.
    #[error("Lifecycle policy violation: {0}")]
    Policy(#[from] PolicyError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider adapter errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A resource key or attribute path is malformed.
    #[error("Invalid {what} '{value}': {reason}")]
    InvalidSyntax {
        /// What was being parsed (resource key, attribute path, reference).
        what: &'static str,
        /// The offending input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The same resource key is declared twice.
    #[error("Duplicate resource: {key}")]
    DuplicateResource {
        /// The duplicated key.
        key: ResourceKey,
    },

    /// No provider is registered for a resource type.
    #[error("No provider registered for resource type '{resource_type}' (used by {key})")]
    UnknownResourceType {
        /// The unsupported resource type.
        resource_type: String,
        /// The resource declaring it.
        key: ResourceKey,
    },
}

/// Errors produced while resolving inter-resource references.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A reference or explicit dependency names a resource that is not in the model.
    #[error("{source_key} references {target}, which is not declared")]
    DanglingReference {
        /// The resource holding the reference.
        source_key: ResourceKey,
        /// The missing target.
        target: ResourceKey,
    },

    /// A resource depends on itself.
    #[error("{resource} depends on itself")]
    SelfDependency {
        /// The offending resource.
        resource: ResourceKey,
    },
}

/// Dependency graph errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The dependency relation contains a cycle.
    #[error("Dependency cycle: {}", format_cycle(.path))]
    Cycle {
        /// Resources on the cycle, in dependency order, first node repeated last.
        path: Vec<ResourceKey>,
    },

    /// An edge names a node that was never added.
    #[error("Unknown node in dependency graph: {key}")]
    UnknownNode {
        /// The missing node.
        key: ResourceKey,
    },
}

/// Lifecycle policy violations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A resource with `prevent_destroy` would be destroyed.
    #[error("{resource} has prevent_destroy set but the plan would {action} it")]
    ProtectedResource {
        /// The protected resource.
        resource: ResourceKey,
        /// The vetoed action (destroy or replace).
        action: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Reading or writing the backing storage failed.
    #[error("State storage error: {message}")]
    StorageError {
        /// Description of the storage failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// The recorded entry disagrees with itself and needs operator attention.
    #[error("State for {resource} is inconsistent: {message}")]
    Inconsistent {
        /// The affected resource.
        resource: ResourceKey,
        /// What is wrong with the entry.
        message: String,
    },
}

/// Errors reported by provider adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Remote object not found: {remote_id}")]
    NotFound {
        /// Identifier of the missing object.
        remote_id: String,
    },

    /// The remote system refused the request.
    #[error("Request rejected: {message}")]
    Rejected {
        /// Description from the remote system.
        message: String,
    },

    /// The remote system could not be reached.
    #[error("Remote system unavailable: {message}")]
    Unavailable {
        /// Description of the transport failure.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The state changed between planning and applying.
    #[error("Plan is stale: it was computed against state {expected} but the store is now at {found}")]
    StalePlan {
        /// Fingerprint the plan was computed against.
        expected: String,
        /// Current fingerprint of the store.
        found: String,
    },

    /// A plan entry has no matching resource in the model it is applied with.
    #[error("Plan references {key}, which is not in the supplied model")]
    ModelMismatch {
        /// The unmatched resource.
        key: ResourceKey,
    },

    /// The model changed since the plan was computed.
    #[error("Plan was computed from model {expected} but the supplied model is {found}")]
    ModelChanged {
        /// Fingerprint recorded in the plan.
        expected: String,
        /// Fingerprint of the supplied model.
        found: String,
    },
}

/// Result type alias for converge operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

/// Result type alias for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

fn format_cycle(path: &[ResourceKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for errors that are detected before any execution and
    /// can only be fixed by changing the configuration.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Resolve(_) | Self::Graph(_))
    }

    /// Returns true if re-running the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Unavailable { .. })
                | Self::State(StateError::StorageError { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a syntax error for a malformed key, path or reference.
    #[must_use]
    pub fn syntax(what: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            what,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates an inconsistency error for a resource.
    #[must_use]
    pub fn inconsistent(resource: ResourceKey, message: impl Into<String>) -> Self {
        Self::Inconsistent {
            resource,
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates an unavailability error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
