// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common error types for all transports

use ctrlink_observability::truncate_for_log;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Stable, machine-readable failure kinds
///
/// Shared by every ctrlink error type so callers can branch on the kind
/// without matching concrete variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Failed,
    InvalidArguments,
    NotInitialized,
    InvalidState,
    Timeout,
    UserInterrupt,
    TransportFault,
    NoResponse,
    CommandFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "Failed",
            Self::InvalidArguments => "InvalidArguments",
            Self::NotInitialized => "NotInitialized",
            Self::InvalidState => "InvalidState",
            Self::Timeout => "Timeout",
            Self::UserInterrupt => "UserInterrupt",
            Self::TransportFault => "TransportFault",
            Self::NoResponse => "NoResponse",
            Self::CommandFailed => "CommandFailed",
        }
    }

    /// Kinds worth retrying after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransportFault | Self::NoResponse)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the context or socket
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Failed to bind server socket
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Failed to connect client socket
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Send failed, including after the socket was recreated
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Waiting for or reading a reply failed; the socket has been recreated
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// No reply within the caller's deadline
    #[error("Timed out receiving response of command {command} after {secs} seconds", secs = .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    /// A framed exchange ran out of time in the given phase
    #[error("Timed out trying to {phase} after {secs} seconds", secs = .timeout.as_secs_f64())]
    ExchangeTimeout { phase: &'static str, timeout: Duration },

    /// The caller's preemption signal fired while waiting
    #[error("Preempted while waiting for response of command {command} (bits {bits:#x})")]
    UserInterrupt { command: String, bits: u32 },

    /// Socket used before `start`/`initialize`
    #[error("Socket not initialized: {0}")]
    NotInitialized(String),

    /// The socket or the peer's reply is not in the expected state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The peer answered with an error status frame
    #[error("Peer reported an error: {0}")]
    PeerError(String),

    /// Transport is already running
    #[error("Transport is already running")]
    AlreadyRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bad arguments to a call
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Message too large
    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    /// Reply could not be decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-specific error
    #[cfg(any(feature = "zmq-client", feature = "zmq-server"))]
    #[error("ZMQ error: {0}")]
    Zmq(#[from] zmq::Error),
}

impl TransportError {
    /// Build a timeout error whose text can be embedded in a JSON string
    ///
    /// The command is truncated and `"` / `\` are removed.
    pub fn timeout(command: &str, timeout: Duration) -> Self {
        Self::Timeout {
            command: json_safe_excerpt(command),
            timeout,
        }
    }

    pub fn user_interrupt(command: &str, bits: u32) -> Self {
        Self::UserInterrupt {
            command: json_safe_excerpt(command),
            bits,
        }
    }

    /// Machine-readable kind of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InitializationFailed(_)
            | Self::BindFailed(_)
            | Self::ConnectFailed(_)
            | Self::SendFailed(_)
            | Self::ReceiveFailed(_) => ErrorCode::TransportFault,
            #[cfg(any(feature = "zmq-client", feature = "zmq-server"))]
            Self::Zmq(_) => ErrorCode::TransportFault,
            Self::Timeout { .. } | Self::ExchangeTimeout { .. } => ErrorCode::Timeout,
            Self::UserInterrupt { .. } => ErrorCode::UserInterrupt,
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            Self::AlreadyRunning | Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::PeerError(_) => ErrorCode::CommandFailed,
            Self::InvalidConfig(_) | Self::InvalidArguments(_) | Self::MessageTooLarge { .. } => {
                ErrorCode::InvalidArguments
            }
            Self::InvalidMessage(_) => ErrorCode::Failed,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

fn json_safe_excerpt(text: &str) -> String {
    truncate_for_log(text)
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_is_json_safe() {
        let err = TransportError::timeout(r#"{"command": "Ping", "path": "C:\\tmp"}"#, Duration::from_millis(1500));
        let text = err.to_string();
        assert!(text.starts_with("Timed out receiving response of command {command: Ping"));
        assert!(text.ends_with("after 1.5 seconds"));
        assert!(!text.contains('"'));
        assert!(!text.contains('\\'));
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[test]
    fn test_timeout_message_truncates_command() {
        let long = "a".repeat(5000);
        let err = TransportError::timeout(&long, Duration::from_secs(1));
        assert!(err.to_string().contains("aaa..."));
        assert!(err.to_string().len() < 1100);
    }

    #[test]
    fn test_codes() {
        assert_eq!(TransportError::SendFailed("x".into()).code(), ErrorCode::TransportFault);
        assert_eq!(TransportError::user_interrupt("{}", 1).code(), ErrorCode::UserInterrupt);
        assert_eq!(TransportError::NotInitialized("req".into()).code(), ErrorCode::NotInitialized);
        assert_eq!(
            TransportError::MessageTooLarge { size: 2, max_size: 1 }.code(),
            ErrorCode::InvalidArguments
        );
        assert_eq!(TransportError::AlreadyRunning.code(), ErrorCode::InvalidState);
        assert_eq!(TransportError::PeerError("busy".into()).code(), ErrorCode::CommandFailed);
        assert_eq!(
            TransportError::ExchangeTimeout { phase: "send request", timeout: Duration::from_secs(1) }
                .to_string(),
            "Timed out trying to send request after 1 seconds"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TransportError::timeout("{}", Duration::from_secs(1)).is_retryable());
        assert!(TransportError::ReceiveFailed("ETERM".into()).is_retryable());
        assert!(!TransportError::user_interrupt("{}", 4).is_retryable());
        assert!(!TransportError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_code_names_are_stable() {
        assert_eq!(ErrorCode::NoResponse.as_str(), "NoResponse");
        assert_eq!(ErrorCode::UserInterrupt.to_string(), "UserInterrupt");
        assert!(ErrorCode::NoResponse.is_retryable());
        assert!(!ErrorCode::CommandFailed.is_retryable());
    }
}
