//! Metadata Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Machine names are restricted to word characters, dots and dashes.
    #[display("invalid machine name: {_0:?}")]
    InvalidMachineName(#[error(not(source))] String),
    /// A textual library name (`H5P.Example-1.0.2`) could not be parsed.
    #[display("invalid library name: {_0:?}")]
    InvalidLibraryName(#[error(not(source))] String),
    /// The `library.json` document is not valid JSON or misses required fields.
    #[display("malformed library.json")]
    MalformedMetadata,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Metadata is either valid or it isn't.
        false
    }
}
