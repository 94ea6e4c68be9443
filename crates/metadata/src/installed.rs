//! Records for libraries that have been installed into storage.

use crate::{Library, LibraryMetadata};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Storage-assigned identifier of an installed library.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(u64);
impl LibraryId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A library known to storage.
///
/// Dereferences to its [`Library`] identity so records can be compared and
/// sorted like identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledLibrary {
    pub id: LibraryId,
    pub library: Library,
    pub title: String,
    pub runnable: bool,
    /// Restricted libraries may only be used by privileged authors.
    pub restricted: bool,
}
impl InstalledLibrary {
    pub fn new(id: LibraryId, metadata: &LibraryMetadata, restricted: bool) -> Self {
        Self {
            id,
            library: metadata.library.clone(),
            title: metadata.title.clone(),
            runnable: metadata.runnable,
            restricted,
        }
    }

    /// Refresh the fields that are derived from `library.json`.
    ///
    /// The descriptor is authoritative: a record may have been written by an
    /// older install of the same line, so the patch version, title and
    /// runnable flag are taken from the loaded metadata.
    pub fn refresh(&mut self, loaded: &LoadedLibrary) {
        self.id = loaded.id;
        self.library = self.library.clone().with_patch_version(loaded.library.patch_version());
        self.title = loaded.title.clone();
        self.runnable = loaded.runnable;
    }
}
impl Deref for InstalledLibrary {
    type Target = Library;
    fn deref(&self) -> &Library {
        &self.library
    }
}

/// Metadata read back from storage, paired with the id storage resolved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLibrary {
    pub id: LibraryId,
    pub metadata: LibraryMetadata,
}
impl Deref for LoadedLibrary {
    type Target = LibraryMetadata;
    fn deref(&self) -> &LibraryMetadata {
        &self.metadata
    }
}
