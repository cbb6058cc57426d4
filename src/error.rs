//! Error types for StoreBridge
//!
//! Every storage operation reports failures through [`BridgeError`]. Single
//! object operations fail fast; recursive deletion is the only operation
//! that collects several failures into one [`BridgeError::Aggregate`].

use crate::storage::SessionState;
use thiserror::Error;

/// Boxed source error carried by [`BridgeError::Io`]
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for StoreBridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Session establishment or authentication failed
    #[error("Connection error to '{target}': {message}")]
    Connection {
        /// Backend target that could not be reached
        target: String,
        /// Failure description
        message: String,
    },

    /// Transfer or backend fault, wrapping the original cause
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying cause
        #[source]
        source: BoxedCause,
    },

    /// Non-recursive delete of a directory that still has children
    #[error("Directory is not empty: {0}")]
    NotEmpty(String),

    /// Source file is absent
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Source directory is absent
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// Parent reference belongs to another endpoint
    #[error("Invalid parent '{parent}': {reason}")]
    InvalidParent {
        /// Offending parent directory
        parent: String,
        /// Why it was rejected
        reason: String,
    },

    /// Malformed path or child name
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The owning endpoint is not connected (or no longer exists)
    #[error("Endpoint '{target}' is not connected (state: {state})")]
    NotConnected {
        /// Target of the endpoint
        target: String,
        /// Session state at the time of the call
        state: SessionState,
    },

    /// Recursive delete left some children behind
    #[error("Cannot delete {path}: {} of its children could not be deleted", .failures.len())]
    Aggregate {
        /// Directory that was left behind
        path: String,
        /// One error per child that could not be deleted
        failures: Vec<BridgeError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Wrap a backend or transfer fault
    pub fn io(context: impl Into<String>, cause: impl Into<BoxedCause>) -> Self {
        Self::Io {
            context: context.into(),
            source: cause.into(),
        }
    }

    /// Create a connection error
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-parent error
    pub fn invalid_parent(parent: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            parent: parent.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Child failures of an aggregate error, empty for every other variant
    pub fn failures(&self) -> &[BridgeError] {
        match self {
            Self::Aggregate { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Check whether this error reports a missing source
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound(_) | Self::DirectoryNotFound(_))
    }

    /// Get the remote path associated with this error, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotEmpty(path)
            | Self::FileNotFound(path)
            | Self::DirectoryNotFound(path)
            | Self::InvalidPath(path)
            | Self::Aggregate { path, .. } => Some(path),
            Self::InvalidParent { parent, .. } => Some(parent),
            _ => None,
        }
    }
}

/// Result type alias for StoreBridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for adding context to backend results
pub trait ResultExt<T> {
    /// Wrap the error as [`BridgeError::Io`] with the given context
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BoxedCause>,
{
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| BridgeError::io(context(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_error_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = BridgeError::io("Cannot copy /a to /b", cause);

        assert_eq!(err.to_string(), "Cannot copy /a to /b: pipe closed");
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "pipe closed");
    }

    #[test]
    fn test_aggregate_failures() {
        let err = BridgeError::Aggregate {
            path: "/dir".to_string(),
            failures: vec![
                BridgeError::NotEmpty("/dir/a".to_string()),
                BridgeError::FileNotFound("/dir/b".to_string()),
            ],
        };

        assert_eq!(err.failures().len(), 2);
        assert_eq!(err.path(), Some("/dir"));
        assert!(err.to_string().contains("2 of its children"));

        let single = BridgeError::NotEmpty("/x".to_string());
        assert!(single.failures().is_empty());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(BridgeError::FileNotFound("/f".into()).is_not_found());
        assert!(BridgeError::DirectoryNotFound("/d".into()).is_not_found());
        assert!(!BridgeError::config("bad").is_not_found());
    }

    #[test]
    fn test_io_context_extension() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = res.io_context(|| "Listing /x".to_string()).unwrap_err();
        assert!(matches!(err, BridgeError::Io { .. }));
        assert_eq!(err.to_string(), "Listing /x: boom");
    }
}
