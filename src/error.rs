//! Error type shared by the transport, capability and settings layers.
//!
//! Binaries and configuration loading stay on `anyhow`; everything a test
//! caller can observe through the library surfaces a [`ButlerError`] so the
//! failure category (protocol, validation, remote, ...) is matchable.

use std::time::Duration;

use thiserror::Error;

use crate::settings::Namespace;

/// Failure categories for butler operations.
#[derive(Debug, Error)]
pub enum ButlerError {
    /// The ADB server or capability peer sent something we could not parse,
    /// or answered a command with `FAIL`.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable description, including the server's FAIL message.
        reason: String,
    },

    /// Underlying socket or process I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An argument was rejected locally before any I/O was attempted.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A settings key has never been written on this device.
    #[error("setting not found: {namespace}/{key}")]
    SettingNotFound {
        /// Settings table the lookup went to.
        namespace: Namespace,
        /// Key that was looked up.
        key: String,
    },

    /// The privileged peer reported a failure while executing a call.
    #[error("{operation} failed on the privileged peer: {message}")]
    Remote {
        /// Name of the operation that failed.
        operation: String,
        /// Diagnostic descriptor of the failing system call.
        message: String,
    },

    /// A platform tool (`settings`, `svc`, `pm`, ...) exited unsuccessfully.
    #[error("`{command}` exited with {status}: {output}")]
    CommandFailed {
        /// Command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured stdout and stderr.
        output: String,
    },

    /// A device-side state change did not become visible in time.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// How long we waited.
        waited: Duration,
    },

    /// Several devices are attached and none could be matched to this host.
    #[error("{count} devices attached and none matched the local identity")]
    AmbiguousDevice {
        /// Number of attached devices.
        count: usize,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ButlerError {
    /// Shorthand for a [`ButlerError::Protocol`] with a formatted reason.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol { reason: reason.into() }
    }

    /// Shorthand for a [`ButlerError::Remote`].
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ButlerError>;
