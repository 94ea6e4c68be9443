//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration could not be assembled from its sources.
    #[display("could not load configuration")]
    Load,
    /// Config files are recognised by extension: toml, yaml/yml or json.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// No setting has that name.
    #[display("unknown setting: {_0}")]
    UnknownSetting(#[error(not(source))] String),
    /// The value does not have the type the setting requires.
    #[display("invalid value for {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
    /// The settings store could not be read or written.
    #[display("settings store failure")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store)
    }
}
