//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted into the system, including on reload

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AgentConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("node name must not be empty")]
    EmptyNodeName,

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid advertise address {0:?}")]
    InvalidAdvertiseAddress(String),

    #[error("empty {pool} join address at position {index}")]
    EmptyJoinAddress { pool: &'static str, index: usize },

    #[error("graceful timeout must be greater than zero")]
    ZeroGracefulTimeout,

    #[error("retry interval must be greater than zero")]
    ZeroRetryInterval,

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Check an already-parsed configuration for semantic problems.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.node.name.trim().is_empty() {
        errors.push(ValidationError::EmptyNodeName);
    }

    if config.network.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.network.bind_address.clone(),
        ));
    }

    if let Some(advertise) = &config.network.advertise_address {
        if advertise.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAdvertiseAddress(advertise.clone()));
        }
    }

    for (pool, addrs) in [
        ("lan", &config.join.start_join_lan),
        ("wan", &config.join.start_join_wan),
        ("retry", &config.join.retry_join),
    ] {
        for (index, addr) in addrs.iter().enumerate() {
            if addr.trim().is_empty() {
                errors.push(ValidationError::EmptyJoinAddress { pool, index });
            }
        }
    }

    if config.shutdown.graceful_timeout_secs == 0 {
        errors.push(ValidationError::ZeroGracefulTimeout);
    }

    if config.join.retry_interval_ms == 0 {
        errors.push(ValidationError::ZeroRetryInterval);
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AgentConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AgentConfig::default();
        config.node.name = " ".to_string();
        config.network.bind_address = "not-an-address".to_string();
        config.shutdown.graceful_timeout_secs = 0;
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptyNodeName));
        assert!(errors.contains(&ValidationError::ZeroGracefulTimeout));
    }

    #[test]
    fn blank_join_address_is_reported_with_position() {
        let mut config = AgentConfig::default();
        config.join.start_join_wan = vec!["10.0.0.9:8302".to_string(), "".to_string()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::EmptyJoinAddress {
                pool: "wan",
                index: 1
            }]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = AgentConfig::default();
        config.observability.metrics_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
