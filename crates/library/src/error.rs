//! Library Manager Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A library manager error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a library manager failure.
///
/// ### Input Errors
/// Raised before storage is touched:
/// - [`ErrorKind::Staging`]
/// - [`ErrorKind::Metadata`]
///
/// ### Installation Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Validation`]
/// - [`ErrorKind::RollbackFailed`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The staging directory (or a file in it) could not be read.
    #[display("cannot read staging directory")]
    Staging,
    /// A `library.json` or `semantics.json` document is missing required
    /// fields or is not valid JSON.
    #[display("invalid library metadata")]
    Metadata,
    /// A storage backend operation failed.
    #[display("storage operation failed")]
    Storage,
    /// An installed library is not consistent; the message lists every
    /// problem found, one per line.
    #[display("library validation failed:\n{_0}")]
    Validation(#[error(not(source))] String),
    /// Removing a partially installed library failed after the install
    /// itself had failed. The install error is the child of this one.
    #[display("rollback failed: {_0}")]
    RollbackFailed(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Staging)
    }
}
