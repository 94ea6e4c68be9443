//! Library identity and metadata models.
//!
//! Every H5P content-type library is described by a `library.json` file at
//! the root of its directory. This crate models that descriptor
//! ([`LibraryMetadata`]), the identity it declares ([`Library`]), and the
//! records a storage backend keeps for installed libraries
//! ([`InstalledLibrary`]).

mod compare;
pub mod error;
mod installed;
mod library;
mod metadata;

pub use crate::installed::{InstalledLibrary, LibraryId, LoadedLibrary};
pub use crate::library::Library;
pub use crate::metadata::{CoreApi, FileReference, LibraryMetadata, LibraryReference};

/// File name of the descriptor at the root of every library.
pub const METADATA_FILE: &str = "library.json";
/// File name of the editor semantics at the root of a library.
pub const SEMANTICS_FILE: &str = "semantics.json";
/// Directory (relative to the library root) holding translations.
pub const LANGUAGE_DIR: &str = "language";
