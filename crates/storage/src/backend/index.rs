//! On-disk index of installed libraries for [`FileStorage`](super::FileStorage).
//!
//! The index is a single JSON document at the storage root holding one row
//! per installed library line plus the next id to hand out. Ids are never
//! reused, even after a library is removed.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use h5p_metadata::{InstalledLibrary, Library, LibraryId, LibraryMetadata};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// File name of the index, relative to the storage root.
pub(crate) const INDEX_FILE: &str = "libraries.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Index {
    next_id: u64,
    libraries: Vec<IndexRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRow {
    id: u64,
    #[serde(flatten)]
    library: Library,
    title: String,
    runnable: bool,
    restricted: bool,
}
impl From<&IndexRow> for InstalledLibrary {
    fn from(row: &IndexRow) -> Self {
        Self {
            id: LibraryId::new(row.id),
            library: row.library.clone(),
            title: row.title.clone(),
            runnable: row.runnable,
            restricted: row.restricted,
        }
    }
}
impl From<&InstalledLibrary> for IndexRow {
    fn from(record: &InstalledLibrary) -> Self {
        Self {
            id: record.id.get(),
            library: record.library.clone(),
            title: record.title.clone(),
            runnable: record.runnable,
            restricted: record.restricted,
        }
    }
}

impl Index {
    /// Read the index from `path`; a missing file is an empty index.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Index),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }

    /// Write the index to `path` via a temporary sibling and a rename, so a
    /// crash mid-write never leaves a truncated index behind.
    pub(crate) async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Index)?;
        let temporary = path.with_extension("json.tmp");
        fs::write(&temporary, bytes).await.map_err(ErrorKind::Io)?;
        fs::rename(&temporary, path).await.map_err(ErrorKind::Io)?;
        Ok(())
    }

    pub(crate) fn find(&self, library: &Library) -> Option<InstalledLibrary> {
        self.libraries.iter().find(|row| row.library.is_same_line(library)).map(InstalledLibrary::from)
    }

    pub(crate) fn filtered(&self, machine_names: &[&str]) -> Vec<InstalledLibrary> {
        self.libraries
            .iter()
            .filter(|row| machine_names.is_empty() || machine_names.contains(&row.library.machine_name()))
            .map(InstalledLibrary::from)
            .collect()
    }

    /// Allocate an id and record a new library line.
    pub(crate) fn insert(&mut self, metadata: &LibraryMetadata, restricted: bool) -> InstalledLibrary {
        // Ids start at 1 so that 0 never identifies a library.
        self.next_id = self.next_id.max(1);
        let record = InstalledLibrary::new(LibraryId::new(self.next_id), metadata, restricted);
        self.next_id += 1;
        self.libraries.push(IndexRow::from(&record));
        record
    }

    /// Replace the metadata-derived fields of an existing line. Returns
    /// `false` if the line is not in the index.
    pub(crate) fn update(&mut self, library: &Library, metadata: &LibraryMetadata) -> bool {
        let Some(row) = self.libraries.iter_mut().find(|row| row.library.is_same_line(library)) else {
            return false;
        };
        row.library = metadata.library.clone();
        row.title = metadata.title.clone();
        row.runnable = metadata.runnable;
        true
    }

    /// Forget a library line. Returns `false` if it was not in the index.
    pub(crate) fn remove(&mut self, library: &Library) -> bool {
        let before = self.libraries.len();
        self.libraries.retain(|row| !row.library.is_same_line(library));
        self.libraries.len() != before
    }
}
