//! Path validation for files inside a library.
//!
//! Every file a backend stores is addressed relative to the root of its
//! library directory. These helpers make sure such paths can never reach a
//! sibling library or anything outside the storage root.

use h5p_metadata::METADATA_FILE;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a library-relative path and returns its normalized form.
///
/// `..` components are resolved lexically and may not climb above the
/// library root; empty paths, platform prefixes and NUL bytes are rejected
/// with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use h5p_storage::validate_path;
/// assert!(validate_path("scripts/question.js").is_ok());
/// assert!(validate_path("language/../language/de.json").is_ok());
/// assert!(validate_path("../H5P.Other-1.0/library.json").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(validate_path("./styles//main.css/").unwrap(), Path::new("styles/main.css"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                // Path::components() lets NUL through on Unix; C syscalls would truncate at it.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

/// Validates a path that callers are allowed to write to: anything but the
/// library's own `library.json`, which only storage manages.
pub(crate) fn validate_writable(path: impl AsRef<Path>) -> Result<PathBuf> {
    let validated = validate(path)?;
    if is_metadata(&validated) {
        exn::bail!(ErrorKind::ReservedPath(validated));
    }
    Ok(validated)
}

/// Whether a *validated* path points at the library descriptor.
pub(crate) fn is_metadata(validated: &Path) -> bool {
    validated == Path::new(METADATA_FILE)
}
