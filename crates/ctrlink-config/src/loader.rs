// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers winning:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ClientConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "ctrlink.toml";

/// Environment variable pointing at a config file
pub const CONFIG_PATH_ENV_VAR: &str = "CTRLINK_CONFIG_PATH";

/// Find the configuration file
///
/// Search order:
/// 1. `CTRLINK_CONFIG_PATH` environment variable
/// 2. Current working directory: `./ctrlink.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV_VAR) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV_VAR,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV_VAR
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for;
///   when none exists the built-in defaults are used.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if an explicit file is missing or the TOML is invalid
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ClientConfig> {
    let mut config = match config_path {
        Some(path) => parse_file(path)?,
        None => match find_config_file() {
            Ok(path) => parse_file(&path)?,
            // An explicit CTRLINK_CONFIG_PATH that does not exist is still an error
            Err(e) if env::var(CONFIG_PATH_ENV_VAR).is_ok() => return Err(e),
            Err(_) => ClientConfig::default(),
        },
    };

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn parse_file(path: &Path) -> ConfigResult<ClientConfig> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `CTRLINK_HOST` -> `controller.host`
/// - `CTRLINK_COMMAND_PORT` -> `ports.command_port`
/// - `CTRLINK_HEARTBEAT_PORT` -> `ports.heartbeat_port`
/// - `CTRLINK_COMMAND_TIMEOUT` -> `timeouts.command_timeout_secs`
/// - `CTRLINK_SLAVE_REQUEST_ID` -> `session.slave_request_id`
/// - `CTRLINK_SCENE_PK` -> `session.scene_pk`
/// - `CTRLINK_LOG_LEVEL` -> `logging.level`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut ClientConfig) {
    if let Ok(value) = env::var("CTRLINK_HOST") {
        config.controller.host = value;
    }
    if let Ok(value) = env::var("CTRLINK_COMMAND_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.ports.command_port = port;
        }
    }
    if let Ok(value) = env::var("CTRLINK_HEARTBEAT_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.ports.heartbeat_port = port;
        }
    }
    if let Ok(value) = env::var("CTRLINK_COMMAND_TIMEOUT") {
        if let Ok(secs) = value.parse::<f64>() {
            config.timeouts.command_timeout_secs = secs;
        }
    }
    if let Ok(value) = env::var("CTRLINK_SLAVE_REQUEST_ID") {
        config.session.slave_request_id = value;
    }
    if let Ok(value) = env::var("CTRLINK_SCENE_PK") {
        config.session.scene_pk = value;
    }
    if let Ok(value) = env::var("CTRLINK_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// Keys follow the command-line flag names:
/// `controller_hostname`, `controller_port`, `zmq_port`, `heartbeat_port`,
/// `slave_request_id`, `task_scenepk`, `taskparameters`, `controller_command_timeout`.
pub fn apply_cli_overrides(config: &mut ClientConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("controller_hostname") {
        config.controller.host = value.clone();
    }
    if let Some(value) = cli_args.get("controller_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.controller.http_port = port;
        }
    }
    if let Some(value) = cli_args.get("zmq_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.ports.command_port = port;
        }
    }
    if let Some(value) = cli_args.get("heartbeat_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.ports.heartbeat_port = port;
        }
    }
    if let Some(value) = cli_args.get("slave_request_id") {
        config.session.slave_request_id = value.clone();
    }
    if let Some(value) = cli_args.get("task_scenepk") {
        config.session.scene_pk = value.clone();
    }
    if let Some(value) = cli_args.get("taskparameters") {
        config.session.task_parameters = value.clone();
    }
    if let Some(value) = cli_args.get("controller_command_timeout") {
        if let Ok(secs) = value.parse::<f64>() {
            config.timeouts.command_timeout_secs = secs;
        }
    }
}
