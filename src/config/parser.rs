//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, ConvergeError, Result};

use super::spec::ModelConfig;

/// Overrides `execution.parallelism`.
pub const ENV_PARALLELISM: &str = "CONVERGE_PARALLELISM";
/// Overrides `state.path`.
pub const ENV_STATE_PATH: &str = "CONVERGE_STATE_PATH";
/// Overrides `project.environment`.
pub const ENV_ENVIRONMENT: &str = "CONVERGE_ENVIRONMENT";

/// Configuration parser for loading model configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ModelConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConvergeError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ModelConfig> {
        debug!("Parsing YAML configuration");

        let config: ModelConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration for project {} ({} resources)",
            config.project.name,
            config.resources.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// is malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ModelConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `CONVERGE_PARALLELISM` is not a positive integer.
    pub fn apply_overrides<F>(config: &mut ModelConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PARALLELISM) {
            debug!("Overriding execution.parallelism from environment");
            config.execution.parallelism = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::syntax(ENV_PARALLELISM, value, "expected a positive integer").into());
                }
            };
        }

        if let Some(path) = lookup(ENV_STATE_PATH) {
            debug!("Overriding state.path from environment");
            config.state.path = Some(path);
        }

        if let Some(environment) = lookup(ENV_ENVIRONMENT) {
            debug!("Overriding project.environment from environment");
            config.project.environment = environment;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConvergeError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["converge.yaml", "converge.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConvergeError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
