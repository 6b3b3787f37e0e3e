//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `converge.yaml`
//! - Validation of configuration values
//! - Converting declarations into a resource model
//! - Fingerprinting models and state for stale-plan detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    ExecutionConfig, LifecycleConfig, ModelConfig, ProjectConfig, ResourceConfig, StateBackend,
    StateConfig,
};
pub use parser::{
    find_config_file, ConfigParser, DEFAULT_CONFIG_FILES, ENV_ENVIRONMENT, ENV_PARALLELISM,
    ENV_STATE_PATH,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
