//! Installation and consistency checking of H5P libraries.
//!
//! [`LibraryManager`] sits on top of a [storage backend](h5p_storage) and
//! decides, for a candidate library unpacked into a staging directory,
//! whether to install it, apply it as a patch to an installed version, or
//! skip it. Every install or update is verified afterwards; a library that
//! fails verification is removed again so storage never keeps a partial
//! installation.

mod consistency;
pub mod error;
mod install;
mod manager;
mod staging;

pub use crate::manager::{InstalledLibraries, LibraryManager};

/// Maximum number of library files copied into storage at the same time.
pub const MAX_COPY_CONCURRENCY: usize = 16;
/// Maximum number of installed libraries whose metadata is read at the same time.
pub const MAX_READ_CONCURRENCY: usize = 32;
