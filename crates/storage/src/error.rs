//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist (path includes the library's ubername)
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// No library of that line is installed
    #[display("library not installed: {_0}")]
    LibraryNotFound(#[error(not(source))] String),
    /// A library of that line is already installed
    #[display("library already installed: {_0}")]
    AlreadyInstalled(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes the library root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Path is managed by storage itself (`library.json`)
    #[display("reserved path: {}", _0.display())]
    ReservedPath(#[error(not(source))] PathBuf),
    /// Library metadata could not be read or written
    #[display("invalid library metadata")]
    Metadata,
    /// The backend's own bookkeeping is unreadable
    #[display("corrupt library index")]
    Index,
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// Returns `true` for both missing files and missing libraries.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::LibraryNotFound(_))
    }
}
