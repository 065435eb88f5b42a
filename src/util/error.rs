//! Error types for the getar library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for getar operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Record path does not match the getar path grammar
    #[error("Malformed record path {path:?}: {reason}")]
    MalformedPath { path: String, reason: String },

    /// Record or frame absent on read
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Operation attempted on a closed archive
    #[error("Archive is closed")]
    Closed,

    /// Write attempted on an archive opened for reading
    #[error("Archive is read-only")]
    ReadOnly,

    /// Backend-level structural inconsistency (bad central directory,
    /// truncated entry, checksum mismatch, ...)
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// Unrecognized container suffix
    #[error("Unsupported archive backend for {0}")]
    UnsupportedBackend(PathBuf),

    /// Sqlite error (relational backend)
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a malformed-path error.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt-container error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }

    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type alias for getar operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::malformed("frames/5", "unterminated frame segment");
        assert!(e.to_string().contains("frames/5"));

        let e = Error::NotFound("frames/0/position.f32.ind".into());
        assert!(e.to_string().contains("position"));

        let e = Error::Closed;
        assert!(e.to_string().contains("closed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
