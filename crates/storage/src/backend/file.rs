//! Local filesystem library storage.
//!
//! Each installed library lives in its own directory named after its
//! ubername (`H5P.Example-1.2`) beneath the storage root, with its
//! `library.json` at the top. Records and ids are kept in an index document
//! next to those directories. Files are accessed via `tokio::fs`.

use super::index::{INDEX_FILE, Index};
use super::{ByteStream, ensure_same_line, language_code};
use crate::error::{ErrorKind, Result};
use crate::path::{is_metadata, validate as validate_path, validate_writable};
use crate::LibraryStorage;
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use h5p_metadata::{InstalledLibrary, LANGUAGE_DIR, Library, LibraryId, LibraryMetadata, METADATA_FILE};
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Local filesystem library storage.
///
/// # Examples
///
/// ```no_run
/// use h5p_storage::backend::FileStorage;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = FileStorage::new("local", "/var/lib/h5p/libraries")?;
/// # Ok(())
/// # }
/// ```
pub struct FileStorage {
    name: String,
    root: PathBuf,
    /// Serialises read-modify-write cycles of the index file.
    index: Mutex<()>,
}
impl FileStorage {
    /// Create a new filesystem storage rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or if it exists and is
    /// not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root, index: Mutex::new(()) })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn library_dir(&self, library: &Library) -> PathBuf {
        self.root.join(library.ubername())
    }

    /// Absolute path of a (validated) file inside a library directory.
    fn file_path(&self, library: &Library, relative: &Path) -> PathBuf {
        self.library_dir(library).join(relative)
    }

    /// Path used in error messages: `<ubername>/<relative>`.
    fn display_path(library: &Library, relative: &Path) -> PathBuf {
        Path::new(&library.ubername()).join(relative)
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn write_metadata(&self, library: &Library, metadata: &LibraryMetadata) -> Result<()> {
        let bytes = metadata.to_vec().or_raise(|| ErrorKind::Metadata)?;
        let path = self.file_path(library, Path::new(METADATA_FILE));
        fs::write(&path, bytes).await.map_err(|e| Self::map_io_error(e, &Self::display_path(library, Path::new(METADATA_FILE))))?;
        Ok(())
    }

    /// Walk a library directory depth-first, yielding every regular file as a
    /// path relative to the library root.
    fn walk<'a>(&'a self, library: &'a Library) -> impl Stream<Item = Result<PathBuf>> + Send + 'a {
        let base = self.library_dir(library);
        let mut stack = vec![base.clone()];
        stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::map_io_error(e, &current)));
                        continue 'dirs;
                    },
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    let path = entry.path();
                    let file_type = match entry.file_type().await {
                        Ok(file_type) => file_type,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &path))); continue 'entries; },
                    };
                    if file_type.is_dir() {
                        stack.push(path);
                    } else if file_type.is_file() {
                        match path.strip_prefix(&base) {
                            Ok(relative) => yield Ok(relative.to_path_buf()),
                            Err(_) => yield Err(exn::Exn::from(ErrorKind::InvalidPath(path.clone()))),
                        }
                    }
                    // Anything else (most likely a broken symlink) is silently dropped.
                }
            }
        }
    }
}

#[async_trait]
impl LibraryStorage for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_installed(&self, machine_names: &[&str]) -> Result<Vec<InstalledLibrary>> {
        let _guard = self.index.lock().await;
        Ok(Index::load(&self.index_path()).await?.filtered(machine_names))
    }

    async fn get_id(&self, library: &Library) -> Result<Option<LibraryId>> {
        let _guard = self.index.lock().await;
        Ok(Index::load(&self.index_path()).await?.find(library).map(|record| record.id))
    }

    async fn install_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary> {
        let library = &metadata.library;
        let _guard = self.index.lock().await;
        let mut index = Index::load(&self.index_path()).await?;
        if index.find(library).is_some() {
            exn::bail!(ErrorKind::AlreadyInstalled(library.ubername()));
        }
        let dir = self.library_dir(library);
        // A directory without an index row is a leftover of an interrupted
        // install; it is replaced wholesale.
        if fs::try_exists(&dir).await.map_err(ErrorKind::Io)? {
            tracing::warn!(storage = self.name, library = %library, "Replacing orphaned library directory");
            fs::remove_dir_all(&dir).await.map_err(|e| Self::map_io_error(e, &dir))?;
        }
        fs::create_dir_all(&dir).await.map_err(|e| Self::map_io_error(e, &dir))?;
        self.write_metadata(library, metadata).await?;
        let record = index.insert(metadata, restricted);
        index.save(&self.index_path()).await?;
        tracing::debug!(storage = self.name, library = %library, id = %record.id, "Library record created");
        Ok(record)
    }

    async fn update_library(&self, library: &Library, metadata: &LibraryMetadata) -> Result<()> {
        ensure_same_line(library, metadata)?;
        let _guard = self.index.lock().await;
        let mut index = Index::load(&self.index_path()).await?;
        if !index.update(library, metadata) {
            exn::bail!(ErrorKind::LibraryNotFound(library.ubername()));
        }
        self.write_metadata(library, metadata).await?;
        index.save(&self.index_path()).await
    }

    async fn clear_library_files(&self, library: &Library) -> Result<()> {
        let dir = self.library_dir(library);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::LibraryNotFound(library.ubername()),
            _ => Self::map_io_error(e, &dir),
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &dir))? {
            let path = entry.path();
            if is_metadata(Path::new(&entry.file_name())) {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
            if file_type.is_dir() {
                fs::remove_dir_all(&path).await.map_err(|e| Self::map_io_error(e, &path))?;
            } else {
                fs::remove_file(&path).await.map_err(|e| Self::map_io_error(e, &path))?;
            }
        }
        Ok(())
    }

    async fn remove_library(&self, library: &Library) -> Result<()> {
        let _guard = self.index.lock().await;
        let mut index = Index::load(&self.index_path()).await?;
        let had_record = index.remove(library);
        let dir = self.library_dir(library);
        let had_files = fs::try_exists(&dir).await.map_err(ErrorKind::Io)?;
        if !had_record && !had_files {
            exn::bail!(ErrorKind::LibraryNotFound(library.ubername()));
        }
        if had_files {
            fs::remove_dir_all(&dir).await.map_err(|e| Self::map_io_error(e, &dir))?;
        }
        if had_record {
            index.save(&self.index_path()).await?;
        }
        Ok(())
    }

    async fn add_library_file(&self, library: &Library, path: &Path, mut stream: ByteStream) -> Result<()> {
        let relative = validate_writable(path)?;
        let dir = self.library_dir(library);
        if !fs::try_exists(&dir).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::LibraryNotFound(library.ubername()));
        }
        let target = dir.join(&relative);
        let display = Self::display_path(library, &relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, &display))?;
        }
        let mut file = fs::File::create(&target).await.map_err(|e| Self::map_io_error(e, &display))?;
        tokio::io::copy(&mut stream, &mut file).await.map_err(ErrorKind::Io)?;
        file.flush().await.map_err(ErrorKind::Io)?;
        Ok(())
    }

    async fn file_exists(&self, library: &Library, path: &Path) -> Result<bool> {
        let relative = validate_path(path)?;
        match fs::metadata(self.file_path(library, &relative)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }

    async fn get_file_stream(&self, library: &Library, path: &Path) -> Result<ByteStream> {
        let relative = validate_path(path)?;
        let file = fs::File::open(self.file_path(library, &relative))
            .await
            .map_err(|e| Self::map_io_error(e, &Self::display_path(library, &relative)))?;
        Ok(Box::pin(file))
    }

    async fn get_language_files(&self, library: &Library) -> Result<Vec<String>> {
        let dir = self.file_path(library, Path::new(LANGUAGE_DIR));
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // No translations shipped.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => exn::bail!(Self::map_io_error(e, &dir)),
        };
        let mut codes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &dir))? {
            let relative = Path::new(LANGUAGE_DIR).join(entry.file_name());
            if let Some(code) = language_code(&relative) {
                codes.push(code);
            }
        }
        codes.sort();
        Ok(codes)
    }

    async fn list_files(&self, library: &Library) -> Result<Vec<PathBuf>> {
        if !fs::try_exists(self.library_dir(library)).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::LibraryNotFound(library.ubername()));
        }
        let mut files: Vec<PathBuf> = self.walk(library).try_filter(|path| std::future::ready(!is_metadata(path))).try_collect().await?;
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn metadata(patch: u32) -> LibraryMetadata {
        let json = format!(
            r#"{{"machineName":"H5P.Test","majorVersion":1,"minorVersion":0,"patchVersion":{patch},"title":"Test","runnable":1}}"#
        );
        LibraryMetadata::from_slice(json.as_bytes()).unwrap()
    }

    fn bytes(data: &'static [u8]) -> ByteStream {
        Box::pin(Cursor::new(data))
    }

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new("local", temp_dir.path()).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(FileStorage::new("local", temp_dir.path()).is_ok());
        assert!(FileStorage::new("local", "relative/path").is_err());
        let file = temp_dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        assert!(FileStorage::new("local", &file).is_err());
    }

    #[tokio::test]
    async fn test_install_writes_metadata_and_index() {
        let (temp_dir, storage) = storage();
        let record = storage.install_library(&metadata(1), true).await.unwrap();
        assert_eq!(record.id, LibraryId::new(1));
        assert!(record.restricted);
        assert!(temp_dir.path().join("H5P.Test-1.0/library.json").is_file());
        assert!(temp_dir.path().join(INDEX_FILE).is_file());
        assert_eq!(storage.get_id(&metadata(9).library).await.unwrap(), Some(record.id));
        let stored = LibraryMetadata::from_slice(&storage.read_file(&record.library, Path::new(METADATA_FILE)).await.unwrap()).unwrap();
        assert_eq!(stored, metadata(1));
    }

    #[tokio::test]
    async fn test_install_same_line_twice() {
        let (_temp_dir, storage) = storage();
        storage.install_library(&metadata(1), false).await.unwrap();
        let err = storage.install_library(&metadata(2), false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyInstalled(_)));
    }

    #[tokio::test]
    async fn test_files_round_trip() {
        let (_temp_dir, storage) = storage();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        storage.add_library_file(&library, Path::new("js/test.js"), bytes(b"alert(1)")).await.unwrap();
        assert!(storage.file_exists(&library, Path::new("js/test.js")).await.unwrap());
        assert!(!storage.file_exists(&library, Path::new("js/missing.js")).await.unwrap());
        // Directories are not files.
        assert!(!storage.file_exists(&library, Path::new("js")).await.unwrap());
        assert_eq!(storage.read_file(&library, Path::new("js/test.js")).await.unwrap(), b"alert(1)");
        let err = storage.get_file_stream(&library, Path::new("nope.css")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(path) if path == Path::new("H5P.Test-1.0/nope.css")));
    }

    #[tokio::test]
    async fn test_metadata_is_not_writable() {
        let (_temp_dir, storage) = storage();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        let err = storage.add_library_file(&library, Path::new("library.json"), bytes(b"{}")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ReservedPath(_)));
        let err = storage.add_library_file(&library, Path::new("../escape.js"), bytes(b"")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_add_file_requires_installed_library() {
        let (_temp_dir, storage) = storage();
        let err = storage.add_library_file(&metadata(1).library, Path::new("a.js"), bytes(b"")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LibraryNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let (_temp_dir, storage) = storage();
        let record = storage.install_library(&metadata(1), false).await.unwrap();
        storage.update_library(&record.library, &metadata(2)).await.unwrap();
        let installed = storage.get_installed(&["H5P.Test"]).await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].id, record.id);
        assert_eq!(installed[0].patch_version(), 2);
        let err = storage.update_library(&Library::new("H5P.Other", 1, 0, 0).unwrap(), &metadata(2)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BackendError(_)));
    }

    #[tokio::test]
    async fn test_clear_keeps_metadata() {
        let (_temp_dir, storage) = storage();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        storage.add_library_file(&library, Path::new("a.js"), bytes(b"a")).await.unwrap();
        storage.add_library_file(&library, Path::new("css/deep/b.css"), bytes(b"b")).await.unwrap();
        assert_eq!(storage.list_files(&library).await.unwrap(), [PathBuf::from("a.js"), PathBuf::from("css/deep/b.css")]);
        storage.clear_library_files(&library).await.unwrap();
        assert!(storage.list_files(&library).await.unwrap().is_empty());
        assert!(storage.file_exists(&library, Path::new(METADATA_FILE)).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_library() {
        let (temp_dir, storage) = storage();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        storage.add_library_file(&library, Path::new("a.js"), bytes(b"a")).await.unwrap();
        storage.remove_library(&library).await.unwrap();
        assert_eq!(storage.get_id(&library).await.unwrap(), None);
        assert!(!temp_dir.path().join("H5P.Test-1.0").exists());
        let err = storage.remove_library(&library).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LibraryNotFound(_)));
    }

    #[tokio::test]
    async fn test_orphaned_directory_is_replaced() {
        let (temp_dir, storage) = storage();
        std::fs::create_dir_all(temp_dir.path().join("H5P.Test-1.0")).unwrap();
        std::fs::write(temp_dir.path().join("H5P.Test-1.0/stale.js"), b"").unwrap();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        assert!(storage.list_files(&library).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_language_files() {
        let (_temp_dir, storage) = storage();
        let library = storage.install_library(&metadata(1), false).await.unwrap().library;
        assert!(storage.get_language_files(&library).await.unwrap().is_empty());
        storage.add_library_file(&library, Path::new("language/nb.json"), bytes(b"{}")).await.unwrap();
        storage.add_library_file(&library, Path::new("language/de.json"), bytes(b"{}")).await.unwrap();
        storage.add_library_file(&library, Path::new("language/notes.txt"), bytes(b"")).await.unwrap();
        assert_eq!(storage.get_language_files(&library).await.unwrap(), ["de", "nb"]);
    }

    #[tokio::test]
    async fn test_ids_survive_reopening() {
        let (temp_dir, storage) = storage();
        let record = storage.install_library(&metadata(1), false).await.unwrap();
        drop(storage);
        let reopened = FileStorage::new("local", temp_dir.path()).unwrap();
        assert_eq!(reopened.get_id(&record.library).await.unwrap(), Some(record.id));
    }
}
