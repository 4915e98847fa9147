//! Error types for the reconciliation engine
//!
//! This module defines all error types used throughout the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dnsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status the remote authority uses to signal rate limiting
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Core error type for dnsync
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to the remote authority (retryable)
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote authority answered with a structured failure
    #[error("Remote rejected request{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    RemoteRejected {
        /// HTTP status, when the failure came with one
        status: Option<u16>,
        /// Error message reported by the authority
        message: String,
    },

    /// The desired-state document on disk could not be parsed
    #[error("Corrupt document {}: {message}", path.display())]
    CorruptDocument {
        /// Path of the offending document
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A backup file offered for restore is not a valid document
    #[error("Invalid backup {}: {message}", path.display())]
    InvalidBackup {
        /// Path of the offending backup
        path: PathBuf,
        /// Parser or read message
        message: String,
    },

    /// No matching local record (or document)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport-level remote error
    pub fn remote_unavailable(msg: impl Into<String>) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    /// Create a remote rejection error
    pub fn remote_rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            message: message.into(),
        }
    }

    /// Create a corrupt document error
    pub fn corrupt_document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptDocument {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid backup error
    pub fn invalid_backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidBackup {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether another attempt at the same remote call may succeed.
    ///
    /// Transport failures and rate limiting are retryable; every other
    /// rejection is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteUnavailable(_) => true,
            Self::RemoteRejected { status, .. } => *status == Some(STATUS_TOO_MANY_REQUESTS),
            _ => false,
        }
    }
}
