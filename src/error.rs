//! Error types for ftp-inbound
//!
//! This module provides the error type used across the crate, including:
//! - Protocol errors wrapped with the server and operation that failed
//! - Configuration errors naming the offending property key
//! - A classification ([`ErrorClass`]) that decides how the transport reacts

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ftp-inbound operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ftp-inbound
///
/// Each variant carries enough context (server, operation, path) to be logged
/// on its own. The transport decides what to do with an error through
/// [`Error::class`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The property key that caused the error (e.g., "serverType")
        key: Option<String>,
    },

    /// Transport-level handshake or authentication failed
    #[error("connection to {server} failed: {reason}")]
    Connection {
        /// Server the client tried to reach (host:port)
        server: String,
        /// Why the connection was refused
        reason: String,
    },

    /// A protocol command failed after the session was established
    #[error("{operation} failed on {server}: {reason}")]
    Protocol {
        /// Server the command was issued against
        server: String,
        /// The operation that failed (e.g., "list", "fetch")
        operation: &'static str,
        /// Protocol error text
        reason: String,
    },

    /// A remote operation did not finish within its deadline
    #[error("{operation} on {server} timed out after {}s", after.as_secs())]
    Timeout {
        /// Server the operation was issued against
        server: String,
        /// The operation that timed out
        operation: &'static str,
        /// Configured deadline
        after: Duration,
    },

    /// Remote file vanished or never existed
    #[error("{path} not found on {server}")]
    RemoteNotFound {
        /// Server that reported the missing file
        server: String,
        /// Remote path that was requested
        path: String,
    },

    /// Downloaded file is larger than the configured in-memory limit
    #[error("payload {file} is {size} bytes, exceeding the {limit} byte buffer limit")]
    PayloadTooLarge {
        /// Name of the offending file
        file: String,
        /// Size of the file in bytes, or the bytes received before the
        /// download was cut off
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Cleanup of a delivered file failed
    #[error("failed to remove {path}: {reason}")]
    Cleanup {
        /// Local or remote path that could not be removed
        path: PathBuf,
        /// The reason removal failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// How the transport reacts to an error
///
/// Classes are ordered by severity, so `class >= ErrorClass::TickFatal`
/// selects every error that ends a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorClass {
    /// Expected outcome such as "no such file"; the tick ends quietly
    Benign,
    /// Logged and skipped; the tick carries on with the next file
    Recoverable,
    /// Ends the tick, stops the scheduler and moves the transport to ERROR
    TickFatal,
    /// The transport cannot keep running (bad config, buffer overflow, unknown failure)
    TransportFatal,
}

impl Error {
    /// Build a configuration error for a given property key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Classify this error according to the transport's failure taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::RemoteNotFound { .. } => ErrorClass::Benign,
            Error::Cleanup { .. } => ErrorClass::Recoverable,
            Error::Connection { .. }
            | Error::Protocol { .. }
            | Error::Timeout { .. }
            | Error::Io(_) => ErrorClass::TickFatal,
            Error::Config { .. }
            | Error::PayloadTooLarge { .. }
            | Error::Serialization(_)
            | Error::Other(_) => ErrorClass::TransportFatal,
        }
    }

    /// Whether this error ends the current tick
    pub fn is_fatal(&self) -> bool {
        self.class() >= ErrorClass::TickFatal
    }

    /// Machine-readable error code, used as a structured log field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Connection { .. } => "connection_error",
            Error::Protocol { .. } => "protocol_error",
            Error::Timeout { .. } => "timeout",
            Error::RemoteNotFound { .. } => "remote_not_found",
            Error::PayloadTooLarge { .. } => "buffer_overflow",
            Error::Cleanup { .. } => "cleanup_failed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "unexpected_error",
        }
    }
}
