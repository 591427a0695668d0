//! Error types for Garnet value parsing and serialization.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Garnet core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Version string is malformed.
    #[error("malformed version number string '{input}'")]
    InvalidVersion {
        /// Offending input.
        input: String,
    },

    /// Constraint string is malformed.
    #[error("invalid version constraint '{input}': {reason}")]
    InvalidConstraint {
        /// Offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Package name is malformed.
    #[error("invalid package name '{0}'")]
    InvalidPackageName(String),

    /// Platform string is malformed.
    #[error("invalid platform '{0}'")]
    InvalidPlatform(String),

    /// Source location is malformed.
    #[error("invalid source '{input}': {reason}")]
    InvalidSource {
        /// Offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// IO error.
    #[error("io error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Create an IO error with context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for Garnet core operations.
pub type Result<T> = std::result::Result<T, Error>;
