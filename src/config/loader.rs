//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

use crate::config::schema::AgentConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read and parse a TOML config file. No semantic checks are applied here so
/// callers can still layer CLI overrides on top before finishing.
pub fn load_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AgentConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Complete a configuration: fill in the generated node id and validate.
pub fn finish(mut config: AgentConfig) -> Result<AgentConfig, ConfigError> {
    config.node.id.get_or_insert_with(Uuid::new_v4);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load, complete, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    finish(load_file(path)?)
}
