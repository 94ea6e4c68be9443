//! Library storage trait and implementations.
//!
//! This module defines the [`LibraryStorage`] trait, the contract the library
//! manager uses to persist installed libraries (their metadata records and
//! their files), along with a filesystem implementation and an in-memory one
//! for tests.

mod file;
mod index;
#[cfg(feature = "mock")]
mod mock;

pub use self::file::FileStorage;
#[cfg(feature = "mock")]
pub use self::mock::MockStorage;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use h5p_metadata::{InstalledLibrary, LANGUAGE_DIR, Library, LibraryId, LibraryMetadata};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A readable stream of bytes, detached from the storage that produced it.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Persistence contract for installed libraries.
///
/// Storage keeps at most one installed patch version per library line
/// (machine name, major and minor version): lookups by [`Library`] ignore the
/// patch version, and updates replace the installed patch in place.
///
/// # Path Handling
/// File paths are relative to the library's root directory and validated with
/// [`validate_path`](crate::validate_path). `library.json` is owned by storage:
/// it is written by [`install_library`](Self::install_library) and
/// [`update_library`](Self::update_library) and can be read back like any
/// other file, but never written through
/// [`add_library_file`](Self::add_library_file).
///
/// # Examples
///
/// ```
/// use h5p_metadata::Library;
/// use h5p_storage::{LibraryStorage, error::Result};
///
/// async fn has_translation(storage: &dyn LibraryStorage, library: &Library, code: &str) -> Result<bool> {
///     Ok(storage.get_language_files(library).await?.iter().any(|c| c == code))
/// }
/// ```
#[async_trait]
pub trait LibraryStorage: Send + Sync {
    /// Name of the configured storage, used for logging only.
    fn name(&self) -> &str;

    /// All installed libraries, or only those whose machine name is listed
    /// in `machine_names` when it is non-empty.
    async fn get_installed(&self, machine_names: &[&str]) -> Result<Vec<InstalledLibrary>>;

    /// Id of the installed library of the same line, if any.
    async fn get_id(&self, library: &Library) -> Result<Option<LibraryId>>;

    /// Persist a brand-new library's metadata and allocate its id.
    ///
    /// Returns [`AlreadyInstalled`](ErrorKind::AlreadyInstalled) if a library
    /// of the same line exists.
    async fn install_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary>;

    /// Overwrite the metadata of an installed library, keeping its id.
    ///
    /// Returns [`LibraryNotFound`](ErrorKind::LibraryNotFound) if nothing of
    /// that line is installed.
    async fn update_library(&self, library: &Library, metadata: &LibraryMetadata) -> Result<()>;

    /// Delete every file of the library except its metadata.
    async fn clear_library_files(&self, library: &Library) -> Result<()>;

    /// Delete the library's record and all of its files.
    ///
    /// Returns [`LibraryNotFound`](ErrorKind::LibraryNotFound) if there was
    /// nothing to remove.
    async fn remove_library(&self, library: &Library) -> Result<()>;

    /// Store one file of the library, replacing any previous content.
    async fn add_library_file(&self, library: &Library, path: &Path, stream: ByteStream) -> Result<()>;

    /// Check whether a file of the library exists.
    async fn file_exists(&self, library: &Library, path: &Path) -> Result<bool>;

    /// Open a file of the library for reading.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the file does not exist.
    async fn get_file_stream(&self, library: &Library, path: &Path) -> Result<ByteStream>;

    /// Language codes of the translations shipped in the library's
    /// `language/` directory (`language/de.json` → `de`), sorted.
    async fn get_language_files(&self, library: &Library) -> Result<Vec<String>>;

    /// Paths of every stored file of the library except its metadata.
    async fn list_files(&self, library: &Library) -> Result<Vec<PathBuf>>;

    /// Read a whole file of the library into memory.
    ///
    /// Default implementation drains [`get_file_stream()`](Self::get_file_stream).
    async fn read_file(&self, library: &Library, path: &Path) -> Result<Vec<u8>> {
        let mut stream = self.get_file_stream(library, path).await?;
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }
}

/// Language code of a translation file, given its path relative to the
/// library root (`language/de.json` → `de`).
pub(crate) fn language_code(path: &Path) -> Option<String> {
    let mut components = path.components();
    let (Some(dir), Some(file), None) = (components.next(), components.next(), components.next()) else {
        return None;
    };
    if dir.as_os_str() != LANGUAGE_DIR {
        return None;
    }
    let file = Path::new(file.as_os_str());
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("json") => file.file_stem().and_then(|stem| stem.to_str()).map(ToString::to_string),
        _ => None,
    }
}

/// Metadata handed to storage must describe the library line it is stored under.
pub(crate) fn ensure_same_line(library: &Library, metadata: &LibraryMetadata) -> Result<()> {
    if !library.is_same_line(&metadata.library) {
        exn::bail!(ErrorKind::BackendError(format!(
            "metadata for {} cannot be stored under {}",
            metadata.library,
            library.ubername()
        )));
    }
    Ok(())
}
