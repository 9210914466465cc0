//! Error types for the configuration registry.

use std::fmt;

/// Errors raised by registry and entry operations.
///
/// Every failure the registry reports is one of these variants, so callers
/// that only care about "something went wrong with configuration" can match
/// on [`Error`] as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Two entries resolved to the same path.
    ///
    /// Supply an explicit path to the second entry to bypass this.
    #[error("an entry at '{path}' already exists")]
    PathConflict { path: String },

    /// An attribute has no value anywhere in the tree for its path.
    #[error("attribute '{key}' doesn't have a defined value at '{path}'")]
    ConfigurationKey { path: String, key: String },

    /// The tree holds a value where a namespace was expected, or the reverse.
    #[error("invalid configuration at '{location}': {reason}")]
    Configuration { location: String, reason: String },

    /// The operation is structurally forbidden.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathConflict,
    ConfigurationKey,
    Configuration,
    InvalidOperation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathConflict => write!(f, "PATH_CONFLICT"),
            Self::ConfigurationKey => write!(f, "CONFIGURATION_KEY"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::InvalidOperation => write!(f, "INVALID_OPERATION"),
        }
    }
}

impl Error {
    /// Create a PATH_CONFLICT error.
    pub fn path_conflict(path: impl Into<String>) -> Self {
        Self::PathConflict { path: path.into() }
    }

    /// Create a CONFIGURATION_KEY error.
    pub fn configuration_key(path: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigurationKey {
            path: path.into(),
            key: key.into(),
        }
    }

    /// Create a CONFIGURATION error.
    pub fn configuration(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create an INVALID_OPERATION error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathConflict { .. } => ErrorKind::PathConflict,
            Self::ConfigurationKey { .. } => ErrorKind::ConfigurationKey,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
