// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for task sessions

use ctrlink_config::ConfigError;
use ctrlink_transports::{ErrorCode, TransportError};

/// Result type alias using SessionError
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Error types for heartbeat discovery and the session command channel
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failure reported by the underlying socket
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Discovery budget exhausted without a heartbeat
    #[error("Failed to obtain heartbeat from {endpoint}. Is controller running?")]
    NoHeartbeat { endpoint: String },

    /// A heartbeat arrived but did not name the session
    #[error("Heartbeat from {endpoint} did not provide {missing}")]
    IncompleteIdentity { endpoint: String, missing: String },

    /// The controller answered with an empty reply
    #[error("No response to command {command}")]
    NoResponse { command: String },

    /// The controller reported an error for the command
    #[error("Command failed ({error_code}): {description}")]
    CommandFailed {
        error_code: String,
        description: String,
    },

    /// Reply was not the expected JSON
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Background worker could not be started
    #[error("Thread error: {0}")]
    Thread(String),
}

impl SessionError {
    /// Machine-readable kind of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(e) => e.code(),
            Self::NoHeartbeat { .. } | Self::NoResponse { .. } => ErrorCode::NoResponse,
            Self::CommandFailed { .. } => ErrorCode::CommandFailed,
            Self::InvalidArguments(_) | Self::Config(_) => ErrorCode::InvalidArguments,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::IncompleteIdentity { .. } | Self::InvalidReply(_) | Self::Thread(_) => {
                ErrorCode::Failed
            }
        }
    }

    /// Check if error is retryable (for reconnection logic)
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_heartbeat_message_names_endpoint() {
        let err = SessionError::NoHeartbeat {
            endpoint: "tcp://10.0.0.5:11001".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to obtain heartbeat from tcp://10.0.0.5:11001. Is controller running?"
        );
        assert_eq!(err.code(), ErrorCode::NoResponse);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_transport_codes_pass_through() {
        let err: SessionError = TransportError::timeout("{}", Duration::from_secs(1)).into();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.is_retryable());

        let err: SessionError = TransportError::user_interrupt("{}", 1).into();
        assert_eq!(err.code(), ErrorCode::UserInterrupt);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_command_failure_not_retryable() {
        let err = SessionError::CommandFailed {
            error_code: "InvalidCommand".to_string(),
            description: "unknown command".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::CommandFailed);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Command failed (InvalidCommand): unknown command");
    }
}
