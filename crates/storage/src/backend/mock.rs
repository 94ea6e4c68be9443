//! In-memory library storage for testing.

use super::{ByteStream, ensure_same_line, language_code};
use crate::error::{ErrorKind, Result};
use crate::path::{is_metadata, validate as validate_path, validate_writable};
use async_trait::async_trait;
use exn::ResultExt;
use h5p_metadata::{InstalledLibrary, Library, LibraryId, LibraryMetadata, METADATA_FILE};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::LibraryStorage;

struct Entry {
    record: InstalledLibrary,
    files: HashMap<PathBuf, Vec<u8>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    /// Keyed by ubername, so one entry per library line.
    libraries: HashMap<String, Entry>,
}

/// In-memory library storage for testing.
///
/// Records and files are kept in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Ideal for
/// unit tests that need a [`LibraryStorage`] without touching the filesystem.
///
/// # Examples
///
/// ```
/// use h5p_metadata::LibraryMetadata;
/// use h5p_storage::{LibraryStorage, backend::MockStorage};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = MockStorage::default();
/// let metadata = LibraryMetadata::from_slice(
///     br#"{"machineName":"H5P.Example","majorVersion":1,"minorVersion":0,"patchVersion":0,"title":"Example"}"#,
/// )?;
/// let record = storage.install_library(&metadata, false).await?;
/// storage.add_library_file(&record.library, Path::new("example.js"), Box::pin(&b"void 0;"[..])).await?;
/// assert!(storage.file_exists(&record.library, Path::new("example.js")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockStorage {
    name: String,
    state: RwLock<State>,
}

impl MockStorage {
    /// Change the name of the mock storage.
    ///
    /// # Example
    ///
    /// ```
    /// use h5p_storage::backend::MockStorage;
    ///
    /// let storage = MockStorage::default().with_name("test");
    /// ```
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
impl Default for MockStorage {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

fn not_installed(library: &Library) -> exn::Exn<ErrorKind> {
    exn::Exn::from(ErrorKind::LibraryNotFound(library.ubername()))
}

#[async_trait]
impl LibraryStorage for MockStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_installed(&self, machine_names: &[&str]) -> Result<Vec<InstalledLibrary>> {
        let guard = self.state.read().await;
        let mut records: Vec<InstalledLibrary> = guard
            .libraries
            .values()
            .filter(|entry| machine_names.is_empty() || machine_names.contains(&entry.record.machine_name()))
            .map(|entry| entry.record.clone())
            .collect();
        // HashMap order is random; keep results stable for callers and tests.
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn get_id(&self, library: &Library) -> Result<Option<LibraryId>> {
        Ok(self.state.read().await.libraries.get(&library.ubername()).map(|entry| entry.record.id))
    }

    async fn install_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary> {
        let key = metadata.library.ubername();
        let bytes = metadata.to_vec().or_raise(|| ErrorKind::Metadata)?;
        let mut guard = self.state.write().await;
        if guard.libraries.contains_key(&key) {
            exn::bail!(ErrorKind::AlreadyInstalled(key));
        }
        guard.next_id += 1;
        let record = InstalledLibrary::new(LibraryId::new(guard.next_id), metadata, restricted);
        let files = HashMap::from([(PathBuf::from(METADATA_FILE), bytes)]);
        guard.libraries.insert(key, Entry { record: record.clone(), files });
        Ok(record)
    }

    async fn update_library(&self, library: &Library, metadata: &LibraryMetadata) -> Result<()> {
        ensure_same_line(library, metadata)?;
        let bytes = metadata.to_vec().or_raise(|| ErrorKind::Metadata)?;
        let mut guard = self.state.write().await;
        let entry = guard.libraries.get_mut(&library.ubername()).ok_or_else(|| not_installed(library))?;
        entry.record = InstalledLibrary::new(entry.record.id, metadata, entry.record.restricted);
        entry.files.insert(PathBuf::from(METADATA_FILE), bytes);
        Ok(())
    }

    async fn clear_library_files(&self, library: &Library) -> Result<()> {
        let mut guard = self.state.write().await;
        let entry = guard.libraries.get_mut(&library.ubername()).ok_or_else(|| not_installed(library))?;
        entry.files.retain(|path, _| is_metadata(path));
        Ok(())
    }

    async fn remove_library(&self, library: &Library) -> Result<()> {
        self.state.write().await.libraries.remove(&library.ubername()).map(|_| ()).ok_or_else(|| not_installed(library))
    }

    async fn add_library_file(&self, library: &Library, path: &Path, mut stream: ByteStream) -> Result<()> {
        let path = validate_writable(path)?;
        // Drain before taking the lock; the stream may be slow.
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;
        let mut guard = self.state.write().await;
        let entry = guard.libraries.get_mut(&library.ubername()).ok_or_else(|| not_installed(library))?;
        entry.files.insert(path, data);
        Ok(())
    }

    async fn file_exists(&self, library: &Library, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        let guard = self.state.read().await;
        Ok(guard.libraries.get(&library.ubername()).is_some_and(|entry| entry.files.contains_key(&path)))
    }

    async fn get_file_stream(&self, library: &Library, path: &Path) -> Result<ByteStream> {
        let path = validate_path(path)?;
        let guard = self.state.read().await;
        let data = guard
            .libraries
            .get(&library.ubername())
            .and_then(|entry| entry.files.get(&path))
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(Path::new(&library.ubername()).join(&path))))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn get_language_files(&self, library: &Library) -> Result<Vec<String>> {
        let guard = self.state.read().await;
        let Some(entry) = guard.libraries.get(&library.ubername()) else {
            return Ok(Vec::new());
        };
        let mut codes: Vec<String> = entry.files.keys().filter_map(|path| language_code(path)).collect();
        codes.sort();
        Ok(codes)
    }

    async fn list_files(&self, library: &Library) -> Result<Vec<PathBuf>> {
        let guard = self.state.read().await;
        let entry = guard.libraries.get(&library.ubername()).ok_or_else(|| not_installed(library))?;
        let mut files: Vec<PathBuf> = entry.files.keys().filter(|path| !is_metadata(path)).cloned().collect();
        files.sort();
        Ok(files)
    }
}
