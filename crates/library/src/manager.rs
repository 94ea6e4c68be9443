use crate::MAX_READ_CONCURRENCY;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::{StreamExt, stream};
use h5p_metadata::{InstalledLibrary, LANGUAGE_DIR, Library, LibraryId, LibraryMetadata, LoadedLibrary, METADATA_FILE, SEMANTICS_FILE};
use h5p_storage::{ByteStream, StorageHandle};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Installed libraries grouped by machine name, each group sorted ascending.
pub type InstalledLibraries = BTreeMap<String, Vec<InstalledLibrary>>;

/// Installs, inspects and verifies libraries held by a storage backend.
///
/// The manager keeps no state besides the shared [`StorageHandle`]; callers
/// are expected to serialise concurrent installs of the same library.
#[derive(Clone)]
pub struct LibraryManager {
    pub(crate) storage: StorageHandle,
}

impl LibraryManager {
    pub fn new(storage: StorageHandle) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Installed libraries grouped by machine name.
    ///
    /// Records are refreshed from their `library.json` (which is authoritative
    /// for patch version, title and runnable flag) before grouping. A record
    /// whose metadata cannot be read is kept as storage returned it.
    #[instrument(skip(self))]
    pub async fn get_installed(&self, machine_names: &[&str]) -> Result<InstalledLibraries> {
        let records = self.storage.get_installed(machine_names).await.or_raise(|| ErrorKind::Storage)?;
        let records: Vec<InstalledLibrary> = stream::iter(records)
            .map(|mut record| async move {
                match self.read_library(&record.library).await {
                    Ok(Some(loaded)) => record.refresh(&loaded),
                    Ok(None) => {},
                    Err(e) => tracing::warn!(library = %record.library, error = ?e, "Could not read installed library metadata"),
                }
                record
            })
            .buffer_unordered(MAX_READ_CONCURRENCY)
            .collect()
            .await;
        let mut grouped = InstalledLibraries::new();
        for record in records {
            grouped.entry(record.machine_name().to_string()).or_default().push(record);
        }
        for group in grouped.values_mut() {
            group.sort_by(|a, b| a.library.cmp(&b.library));
        }
        Ok(grouped)
    }

    /// Id of the installed library of the same line, if any.
    pub async fn get_id(&self, library: &Library) -> Result<Option<LibraryId>> {
        self.storage.get_id(library).await.or_raise(|| ErrorKind::Storage)
    }

    /// Whether `candidate` is newer than every installed version sharing its
    /// machine name. Always `false` when nothing of that name is installed.
    #[instrument(skip(self), fields(library = %candidate))]
    pub async fn library_has_upgrade(&self, candidate: &Library) -> Result<bool> {
        let installed = self.get_installed(&[candidate.machine_name()]).await?;
        let newest = installed.values().flatten().max_by(|a, b| a.compare_versions(b));
        Ok(newest.is_some_and(|newest| newest.compare_versions(candidate) == Ordering::Less))
    }

    /// Whether `candidate` is a newer patch of an installed library line.
    ///
    /// Storage holds at most one patch per line, so only the first installed
    /// version sharing machine name, major and minor version is compared.
    #[instrument(skip(self), fields(library = %candidate))]
    pub async fn is_patched_library(&self, candidate: &Library) -> Result<bool> {
        let installed = self.get_installed(&[candidate.machine_name()]).await?;
        let same_line = installed.values().flatten().find(|record| record.is_same_line(candidate));
        Ok(same_line.is_some_and(|record| record.patch_version() < candidate.patch_version()))
    }

    /// Reads the stored metadata of an installed library.
    ///
    /// Returns `Ok(None)` if nothing of that line is installed, and an error
    /// if it is installed but its `library.json` cannot be read or decoded.
    pub async fn read_library(&self, library: &Library) -> Result<Option<LoadedLibrary>> {
        let Some(id) = self.get_id(library).await? else {
            return Ok(None);
        };
        let bytes = self.storage.read_file(library, Path::new(METADATA_FILE)).await.or_raise(|| ErrorKind::Storage)?;
        let metadata = LibraryMetadata::from_slice(&bytes).or_raise(|| ErrorKind::Metadata)?;
        Ok(Some(LoadedLibrary { id, metadata }))
    }

    /// Like [`read_library()`](Self::read_library), but an unreadable library
    /// is reported as absent.
    pub async fn load_library(&self, library: &Library) -> Option<LoadedLibrary> {
        match self.read_library(library).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(library = %library, error = ?e, "Installed library could not be loaded");
                None
            },
        }
    }

    pub async fn library_file_exists(&self, library: &Library, path: &Path) -> Result<bool> {
        self.storage.file_exists(library, path).await.or_raise(|| ErrorKind::Storage)
    }

    pub async fn get_file_stream(&self, library: &Library, path: &Path) -> Result<ByteStream> {
        self.storage.get_file_stream(library, path).await.or_raise(|| ErrorKind::Storage)
    }

    /// Editor semantics of a library, or `None` if it ships no `semantics.json`.
    pub async fn load_semantics(&self, library: &Library) -> Result<Option<serde_json::Value>> {
        let bytes = match self.storage.read_file(library, Path::new(SEMANTICS_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(&*e, h5p_storage::error::ErrorKind::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.raise(ErrorKind::Storage)),
        };
        Ok(Some(serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Metadata)?))
    }

    /// Raw contents of `language/<code>.json`, or `None` if the translation
    /// cannot be read for any reason.
    pub async fn load_language(&self, library: &Library, code: &str) -> Option<String> {
        let path = Path::new(LANGUAGE_DIR).join(format!("{code}.json"));
        let bytes = match self.storage.read_file(library, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(library = %library, language = code, error = ?e, "Translation not available");
                return None;
            },
        };
        String::from_utf8(bytes).ok()
    }

    /// Language codes the library ships translations for. Empty if they
    /// cannot be listed.
    pub async fn list_languages(&self, library: &Library) -> Vec<String> {
        self.storage.get_language_files(library).await.unwrap_or_else(|e| {
            tracing::warn!(library = %library, error = ?e, "Could not list library translations");
            Vec::new()
        })
    }

    /// Every stored file of the library except its `library.json`.
    pub async fn list_library_files(&self, library: &Library) -> Result<Vec<PathBuf>> {
        self.storage.list_files(library).await.or_raise(|| ErrorKind::Storage)
    }
}
