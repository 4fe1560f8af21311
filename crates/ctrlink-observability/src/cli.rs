// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-ctrlink-transports`, `--debug-ctrlink-session`, etc.
//! to raise the log level of a single crate.

use std::collections::HashMap;
use std::env;

use crate::KNOWN_CRATES;

/// Environment variable holding comma-separated crate names (or `all`)
pub const DEBUG_ENV_VAR: &str = "CTRLINK_DEBUG";

/// Parse debug flags from command-line arguments
///
/// # Example
/// ```rust
/// use ctrlink_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(std::env::args());
/// if flags.is_enabled("ctrlink-transports") {
///     // socket-level tracing requested
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}` pattern.
    /// Also supports `--debug-all` to enable all crates.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();

        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
                continue;
            }

            if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }

        flags
    }

    /// Merge crate names from a `CTRLINK_DEBUG`-style value
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string(), true);
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    /// Get all enabled crates
    pub fn enabled_crates(&self) -> Vec<&String> {
        self.enabled_crates.keys().collect()
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// Get log level filter for a crate
    ///
    /// Returns `tracing::Level::DEBUG` if enabled, `tracing::Level::INFO` otherwise.
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Create a tracing filter from debug flags
    ///
    /// Tracing targets use the module path, so `ctrlink-transports` becomes
    /// `ctrlink_transports=debug`. `base_level` applies to everything else.
    pub fn to_filter_string(&self, base_level: &str) -> String {
        if self.enabled_crates.is_empty() {
            return base_level.to_string();
        }

        let mut names: Vec<&String> = self.enabled_crates.keys().collect();
        names.sort();

        let mut filters: Vec<String> = names
            .into_iter()
            .map(|name| format!("{}=debug", name.replace('-', "_")))
            .collect();
        filters.push(base_level.to_string());
        filters.join(",")
    }
}

/// Parse debug flags from the process arguments and `CTRLINK_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var(DEBUG_ENV_VAR) {
        flags.merge_env_value(&value);
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  {env}={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  {env}=all                               Enable debug for all crates

Examples:
  --debug-ctrlink-transports
  --debug-ctrlink-transports --debug-ctrlink-session
  {env}=ctrlink-transports,ctrlink-session
"#,
        KNOWN_CRATES.join(", "),
        env = DEBUG_ENV_VAR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ctrlink-transports".to_string()]);
        assert!(flags.is_enabled("ctrlink-transports"));
        assert!(!flags.is_enabled("ctrlink-session"));
    }

    #[test]
    fn test_multiple_crate_flags() {
        let flags = CrateDebugFlags::from_args(vec![
            "--debug-ctrlink-transports".to_string(),
            "--debug-ctrlink-session".to_string(),
        ]);
        assert!(flags.is_enabled("ctrlink-transports"));
        assert!(flags.is_enabled("ctrlink-session"));
        assert!(!flags.is_enabled("ctrlink-config"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_non_debug_args_ignored() {
        let flags = CrateDebugFlags::from_args(vec![
            "ctrlink-task".to_string(),
            "--controller-hostname".to_string(),
            "10.0.0.5".to_string(),
        ]);
        assert!(!flags.any_enabled());
    }

    #[test]
    fn test_filter_string() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ctrlink-transports".to_string()]);
        assert_eq!(flags.to_filter_string("info"), "ctrlink_transports=debug,info");
        assert_eq!(CrateDebugFlags::default().to_filter_string("warn"), "warn");
    }

    #[test]
    fn test_env_value_merge() {
        let mut flags = CrateDebugFlags::default();
        flags.merge_env_value("ctrlink-session, ctrlink-config,");
        assert!(flags.is_enabled("ctrlink-session"));
        assert!(flags.is_enabled("ctrlink-config"));
        assert_eq!(flags.enabled_crates().len(), 2);

        let mut all = CrateDebugFlags::default();
        all.merge_env_value("all");
        assert_eq!(all.enabled_crates().len(), KNOWN_CRATES.len());
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ctrlink-session".to_string()]);
        assert_eq!(flags.log_level("ctrlink-session"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("ctrlink-transports"), tracing::Level::INFO);
    }
}
