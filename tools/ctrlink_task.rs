// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Task Session Tool

Finds a running task session through its heartbeat and, optionally, runs one
command against it.

Usage:
  cargo run --bin ctrlink-task -- --controller_hostname 192.168.1.10 heartbeat
  cargo run --bin ctrlink-task -- --taskparameters '{"command": "GetState"}' command

Failures print the error kind (e.g. `NoResponse`) and exit with status 1.
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use ctrlink::config::{load_config, validate_config, ConfigError};
use ctrlink::observability::{init_logging, CrateDebugFlags, DEBUG_ENV_VAR};
use ctrlink::session::{
    discover_heartbeat, SessionError, SessionIdentity, SessionOptions,
    SubscriberHeartbeatSource, TaskSession,
};
use ctrlink::transports::{ErrorCode, TransportError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ctrlink-task", about = "Discover and command controller task sessions", version)]
struct Cli {
    /// Controller host name or address
    #[arg(long = "controller_hostname")]
    controller_hostname: Option<String>,

    /// Controller HTTP port
    #[arg(long = "controller_port")]
    controller_port: Option<u16>,

    /// Command port of the task session
    #[arg(long = "zmq_port")]
    zmq_port: Option<u16>,

    /// Heartbeat port of the task session
    #[arg(long = "heartbeat_port")]
    heartbeat_port: Option<u16>,

    /// Slave request id (taken from the heartbeat when omitted)
    #[arg(long = "slave_request_id")]
    slave_request_id: Option<String>,

    /// Scene primary key (taken from the heartbeat when omitted)
    #[arg(long = "task_scenepk")]
    task_scenepk: Option<String>,

    /// Task parameters as a JSON object
    #[arg(long = "taskparameters")]
    taskparameters: Option<String>,

    /// Command timeout in seconds (0 = wait forever)
    #[arg(long = "controller_command_timeout")]
    controller_command_timeout: Option<f64>,

    /// Configuration file (default: search for ctrlink.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging for every ctrlink crate
    #[arg(long = "debug-all")]
    debug_all: bool,

    /// Enable debug logging for one crate (repeatable)
    #[arg(long = "debug-crate", value_name = "CRATE")]
    debug_crates: Vec<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Wait for a heartbeat and print the session identity it announces
    Heartbeat,

    /// Bootstrap the session and run the task parameters as one command
    Command {
        /// Sets the `command` task parameter
        #[arg(long)]
        name: Option<String>,
    },
}

impl Cli {
    /// Flag values keyed the way the config loader expects
    fn overrides(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };
        put("controller_hostname", self.controller_hostname.clone());
        put("controller_port", self.controller_port.map(|p| p.to_string()));
        put("zmq_port", self.zmq_port.map(|p| p.to_string()));
        put("heartbeat_port", self.heartbeat_port.map(|p| p.to_string()));
        put("slave_request_id", self.slave_request_id.clone());
        put("task_scenepk", self.task_scenepk.clone());
        put("taskparameters", self.taskparameters.clone());
        put(
            "controller_command_timeout",
            self.controller_command_timeout.map(|t| t.to_string()),
        );
        map
    }

    fn debug_flags(&self) -> CrateDebugFlags {
        let mut flags = CrateDebugFlags::default();
        if self.debug_all {
            flags.enable_all();
        }
        for crate_name in &self.debug_crates {
            flags.enable(crate_name);
        }
        if let Ok(value) = std::env::var(DEBUG_ENV_VAR) {
            flags.merge_env_value(&value);
        }
        flags
    }
}

fn print_heartbeat(options: &SessionOptions) -> anyhow::Result<()> {
    let mut source = SubscriberHeartbeatSource::connect(
        None,
        options.heartbeat_endpoint(),
        options.socket_options.clone(),
    )?;
    let heartbeat = discover_heartbeat(&mut source, &options.discovery)?;

    let mut identity = options.supplied_identity();
    identity.fill_from_heartbeat(&heartbeat);
    print_identity(&identity);
    println!("heartbeat: {}", heartbeat);
    Ok(())
}

fn print_identity(identity: &SessionIdentity) {
    println!("task_scenepk: {}", identity.scene_pk);
    println!("slave_request_id: {}", identity.slave_request_id);
}

fn run_command(options: SessionOptions, name: Option<String>) -> anyhow::Result<()> {
    let mut parameters = options.task_parameters.clone();
    if let (Some(name), Value::Object(map)) = (name, &mut parameters) {
        map.insert("command".to_string(), Value::String(name));
    }

    let session = TaskSession::bootstrap(options)?;
    print_identity(session.identity());

    let reply = session.execute_command_default(parameters)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&reply).context("Failed to format reply")?
    );
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), Some(&cli.overrides()))
        .context("Failed to load configuration")?;

    let debug_flags = cli.debug_flags();
    if let Err(e) = init_logging(&debug_flags, &config.logging.level) {
        eprintln!("Logging not initialized: {}", e);
    }

    validate_config(&config)?;

    let options = SessionOptions::from_config(&config)?;
    tracing::debug!(
        "[SESSION] Using controller {} (command port {}, heartbeat port {})",
        options.host,
        options.command_port,
        options.heartbeat_port
    );

    match cli.action {
        Action::Heartbeat => print_heartbeat(&options),
        Action::Command { name } => run_command(options, name),
    }
}

/// Error kind reported to the operator
fn error_code(error: &anyhow::Error) -> ErrorCode {
    error
        .chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<SessionError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<TransportError>() {
                Some(e.code())
            } else if cause.is::<ConfigError>() {
                Some(ErrorCode::InvalidArguments)
            } else {
                None
            }
        })
        .unwrap_or(ErrorCode::Failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", error_code(&e), e);
            ExitCode::from(1)
        }
    }
}
