//! Centralized error types for mboxattach.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxattach library.
#[derive(Error, Debug)]
pub enum MboxError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified archive does not exist or is not a regular file.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),

    /// The character encoding is not supported, or the bytes are not valid in it.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// An export operation failed.
    #[error("Export error: {0}")]
    ExportError(String),

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, MboxError>`.
pub type Result<T> = std::result::Result<T, MboxError>;

/// Helper to convert a bare `std::io::Error` together with a path.
impl MboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying OS error, if this is an I/O failure.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `MboxError`
/// when no path context is available (rare, prefer `MboxError::io`).
impl From<std::io::Error> for MboxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
