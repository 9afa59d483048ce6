//! Error types for the bitchat console
//!
//! This module contains all error types used throughout the console engine,
//! including control-channel errors, supervisor errors, and the main
//! ConsoleError type that unifies them all.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised while talking to a daemon's control socket
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control socket {path} is not listening")]
    NotListening { path: String },

    #[error("control command {command} rejected by daemon: {detail}")]
    Rejected { command: String, detail: String },

    #[error("control round trip timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("control I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while managing a daemon process
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to spawn daemon for role {role}: {source}")]
    Spawn {
        role: String,
        #[source]
        source: std::io::Error,
    },

    #[error("supervisor I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the bitchat console
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("control channel error: {0}")]
    Control(#[from] ControlError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid device address: {value}")]
    InvalidAddress { value: String },

    #[error("not ready: {reason}")]
    NotReady { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ConsoleError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ConsoleError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid-address error for a rejected identity token
    pub fn invalid_address<T: Into<String>>(value: T) -> Self {
        ConsoleError::InvalidAddress {
            value: value.into(),
        }
    }

    /// Create a not-ready error for an intent that cannot run yet
    pub fn not_ready<T: Into<String>>(reason: T) -> Self {
        ConsoleError::NotReady {
            reason: reason.into(),
        }
    }
}

impl ControlError {
    /// Create a rejection error carrying the daemon's captured output
    pub fn rejected<C: Into<String>, D: Into<String>>(command: C, detail: D) -> Self {
        ControlError::Rejected {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Create a timeout error from the elapsed bound
    pub fn timeout(duration: Duration) -> Self {
        ControlError::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }
}

// ----------------------------------------------------------------------------
// Type Alias
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, ConsoleError>;
