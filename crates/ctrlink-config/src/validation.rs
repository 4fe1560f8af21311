// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every rule runs; failures are collected and reported together.

use crate::{ClientConfig, ConfigError, ConfigResult};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    PortConflict { port1: String, port2: String, port: u16 },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortConflict { port1, port2, port } => {
                write!(
                    f,
                    "Port conflict: {} and {} both use port {}",
                    port1, port2, port
                )
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required fields (controller host, non-zero ports)
/// - Command and heartbeat port conflict
/// - Discovery budget and socket queue depth
/// - JSON-object session payloads
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed rule
pub fn validate_config(config: &ClientConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_port_conflicts(config, &mut errors);
    validate_value_ranges(config, &mut errors);
    validate_session_payloads(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &ClientConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.controller.host.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "controller.host".to_string(),
        });
    }

    for (name, port) in [
        ("ports.command_port", config.ports.command_port),
        ("ports.heartbeat_port", config.ports.heartbeat_port),
    ] {
        if port == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: name.to_string(),
                reason: "port 0 cannot be connected to".to_string(),
            });
        }
    }
}

fn validate_port_conflicts(config: &ClientConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.ports.command_port != 0 && config.ports.command_port == config.ports.heartbeat_port {
        errors.push(ConfigValidationError::PortConflict {
            port1: "ports.command_port".to_string(),
            port2: "ports.heartbeat_port".to_string(),
            port: config.ports.command_port,
        });
    }
}

fn validate_value_ranges(config: &ClientConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.discovery.max_attempts == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "discovery.max_attempts".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.sockets.high_water_mark <= 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "sockets.high_water_mark".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if config.timeouts.poll_interval_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "timeouts.poll_interval_ms".to_string(),
            reason: "must be positive".to_string(),
        });
    }
}

fn validate_session_payloads(config: &ClientConfig, errors: &mut Vec<ConfigValidationError>) {
    for (name, text) in [
        ("session.task_parameters", &config.session.task_parameters),
        ("session.user_info", &config.session.user_info),
    ] {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) if value.is_object() => {}
            Ok(_) => errors.push(ConfigValidationError::InvalidValue {
                field: name.to_string(),
                reason: "must be a JSON object".to_string(),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidValue {
                field: name.to_string(),
                reason: format!("invalid JSON: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        let result = validate_config(&config);
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_port_conflict() {
        let mut config = ClientConfig::default();
        config.ports.heartbeat_port = config.ports.command_port;

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("Port conflict"));
                assert!(msg.contains("11000"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_host() {
        let mut config = ClientConfig::default();
        config.controller.host = "  ".to_string();

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("controller.host")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_task_parameters_must_be_object() {
        let mut config = ClientConfig::default();
        config.session.task_parameters = "[1, 2]".to_string();
        config.session.user_info = "{not json".to_string();

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("session.task_parameters"));
                assert!(msg.contains("JSON object"));
                assert!(msg.contains("session.user_info"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = ClientConfig::default();
        config.discovery.max_attempts = 0;
        config.sockets.high_water_mark = 0;
        config.ports.command_port = 0;

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert_eq!(msg.matches("  - ").count(), 3);
                assert!(msg.contains("discovery.max_attempts"));
                assert!(msg.contains("sockets.high_water_mark"));
                assert!(msg.contains("ports.command_port"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
