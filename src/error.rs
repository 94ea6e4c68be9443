//! CLI Error Types

use derive_more::{Display, Error};

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for CLI commands.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration or settings could not be loaded or saved.
    #[display("configuration error")]
    Config,
    /// The library storage could not be opened.
    #[display("cannot open library storage")]
    Storage,
    /// A library operation failed.
    #[display("library operation failed")]
    Library,
    /// A command-line argument could not be understood.
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
}
