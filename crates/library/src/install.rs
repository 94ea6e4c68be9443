use crate::error::{ErrorKind, Result};
use crate::{LibraryManager, MAX_COPY_CONCURRENCY, staging};
use exn::ResultExt;
use futures::TryStreamExt;
use h5p_metadata::{Library, LibraryMetadata};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

impl LibraryManager {
    /// Installs the library unpacked in `directory`.
    ///
    /// A library line that is not installed yet is installed fresh. A newer
    /// patch of an installed line replaces the installed files in place,
    /// keeping the library's id. Anything else is skipped, and `false` is
    /// returned.
    ///
    /// If copying files or the consistency check fails, the library is
    /// removed from storage again before the error is returned.
    #[instrument(skip(self), fields(directory = %directory.display()))]
    pub async fn install_from_directory(&self, directory: &Path, restricted: bool) -> Result<bool> {
        let metadata = staging::read_metadata(directory).await?;
        let library = &metadata.library;
        if self.get_id(library).await?.is_some() {
            if !self.is_patched_library(library).await? {
                tracing::info!(library = %library, "Library already installed; skipping");
                return Ok(false);
            }
            let result = self.update_from_directory(directory, &metadata).await;
            self.rollback_on_failure(library, result).await?;
            tracing::info!(library = %library, "Library patched");
        } else {
            self.storage.install_library(&metadata, restricted).await.or_raise(|| ErrorKind::Storage)?;
            let result = self.populate_from_directory(directory, library).await;
            self.rollback_on_failure(library, result).await?;
            tracing::info!(library = %library, restricted, "Library installed");
        }
        Ok(true)
    }

    async fn update_from_directory(&self, directory: &Path, metadata: &LibraryMetadata) -> Result<()> {
        let library = &metadata.library;
        self.storage.update_library(library, metadata).await.or_raise(|| ErrorKind::Storage)?;
        self.storage.clear_library_files(library).await.or_raise(|| ErrorKind::Storage)?;
        self.populate_from_directory(directory, library).await
    }

    async fn populate_from_directory(&self, directory: &Path, library: &Library) -> Result<()> {
        self.copy_library_files(directory, library).await?;
        self.check_consistency(library).await
    }

    /// Removes a partially installed library if `result` is an error, then
    /// returns the error.
    async fn rollback_on_failure(&self, library: &Library, result: Result<()>) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };
        tracing::warn!(library = %library, error = ?err, "Installation failed; removing library");
        match self.storage.remove_library(library).await {
            Ok(()) => Err(err),
            // Nothing was left behind.
            Err(removal) if removal.is_not_found() => Err(err),
            Err(removal) => {
                tracing::error!(library = %library, error = ?removal, "Could not remove partially installed library");
                let message = format!("could not remove {}: {}", library.ubername(), *removal);
                Err(err.raise(ErrorKind::RollbackFailed(message)))
            },
        }
    }

    /// Copies every file below `directory` into storage for `library`,
    /// except the root `library.json`. Up to [`MAX_COPY_CONCURRENCY`] files
    /// are copied at the same time; the first failure aborts the copy.
    #[instrument(skip(self), fields(directory = %directory.display(), library = %library))]
    pub async fn copy_library_files(&self, directory: &Path, library: &Library) -> Result<()> {
        staging::walk(directory)
            .try_for_each_concurrent(MAX_COPY_CONCURRENCY, |relative| async move {
                self.copy_library_file(directory, library, relative).await
            })
            .await
    }

    async fn copy_library_file(&self, directory: &Path, library: &Library, relative: PathBuf) -> Result<()> {
        tracing::debug!(path = %relative.display(), "Copying library file");
        let file = fs::File::open(directory.join(&relative)).await.or_raise(|| ErrorKind::Staging)?;
        self.storage.add_library_file(library, &relative, Box::pin(file)).await.or_raise(|| ErrorKind::Storage)
    }

    /// Removes an installed library and all of its files. Returns `false` if
    /// nothing of that line was installed.
    #[instrument(skip(self), fields(library = %library))]
    pub async fn uninstall_library(&self, library: &Library) -> Result<bool> {
        match self.storage.remove_library(library).await {
            Ok(()) => {
                tracing::info!("Library uninstalled");
                Ok(true)
            },
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.raise(ErrorKind::Storage)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use h5p_metadata::{InstalledLibrary, LibraryId};
    use h5p_storage::backend::MockStorage;
    use h5p_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
    use h5p_storage::{ByteStream, LibraryStorage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    pub(crate) fn library(name: &str, major: u32, minor: u32, patch: u32) -> Library {
        Library::new(name, major, minor, patch).unwrap()
    }

    /// A `library.json` document preloading the given JavaScript files.
    pub(crate) fn metadata(name: &str, major: u32, minor: u32, patch: u32, preloaded_js: &[&str]) -> String {
        let preloaded: Vec<String> = preloaded_js.iter().map(|path| format!(r#"{{"path":"{path}"}}"#)).collect();
        format!(
            r#"{{"machineName":"{name}","majorVersion":{major},"minorVersion":{minor},"patchVersion":{patch},"title":"{name}","runnable":1,"preloadedJs":[{}]}}"#,
            preloaded.join(",")
        )
    }

    /// A staging directory holding `library.json` and the given files.
    pub(crate) fn stage(metadata: &str, files: &[(&str, &str)]) -> (TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = temp_dir.path().to_path_buf();
        std::fs::write(directory.join("library.json"), metadata).unwrap();
        for (path, content) in files {
            let path = directory.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        (temp_dir, directory)
    }

    /// Delegates to [`MockStorage`], failing file uploads or removals on demand.
    #[derive(Default)]
    struct FaultyStorage {
        inner: MockStorage,
        fail_uploads: AtomicBool,
        fail_removals: AtomicBool,
    }

    #[async_trait]
    impl LibraryStorage for FaultyStorage {
        fn name(&self) -> &str {
            "faulty"
        }
        async fn get_installed(&self, machine_names: &[&str]) -> StorageResult<Vec<InstalledLibrary>> {
            self.inner.get_installed(machine_names).await
        }
        async fn get_id(&self, library: &Library) -> StorageResult<Option<LibraryId>> {
            self.inner.get_id(library).await
        }
        async fn install_library(&self, metadata: &LibraryMetadata, restricted: bool) -> StorageResult<InstalledLibrary> {
            self.inner.install_library(metadata, restricted).await
        }
        async fn update_library(&self, library: &Library, metadata: &LibraryMetadata) -> StorageResult<()> {
            self.inner.update_library(library, metadata).await
        }
        async fn clear_library_files(&self, library: &Library) -> StorageResult<()> {
            self.inner.clear_library_files(library).await
        }
        async fn remove_library(&self, library: &Library) -> StorageResult<()> {
            if self.fail_removals.load(Ordering::SeqCst) {
                exn::bail!(StorageErrorKind::BackendError("removal refused".to_string()));
            }
            self.inner.remove_library(library).await
        }
        async fn add_library_file(&self, library: &Library, path: &Path, stream: ByteStream) -> StorageResult<()> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                exn::bail!(StorageErrorKind::BackendError("upload refused".to_string()));
            }
            self.inner.add_library_file(library, path, stream).await
        }
        async fn file_exists(&self, library: &Library, path: &Path) -> StorageResult<bool> {
            self.inner.file_exists(library, path).await
        }
        async fn get_file_stream(&self, library: &Library, path: &Path) -> StorageResult<ByteStream> {
            self.inner.get_file_stream(library, path).await
        }
        async fn get_language_files(&self, library: &Library) -> StorageResult<Vec<String>> {
            self.inner.get_language_files(library).await
        }
        async fn list_files(&self, library: &Library) -> StorageResult<Vec<PathBuf>> {
            self.inner.list_files(library).await
        }
    }

    fn faulty() -> (Arc<FaultyStorage>, LibraryManager) {
        let storage = Arc::new(FaultyStorage::default());
        (storage.clone(), LibraryManager::new(storage))
    }

    #[tokio::test]
    async fn test_install_twice() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let json = metadata("H5P.Test", 1, 0, 1, &["test.js"]);
        let (_staging, directory) = stage(&json, &[("test.js", "")]);
        assert!(manager.install_from_directory(&directory, false).await.unwrap());
        assert!(!manager.install_from_directory(&directory, false).await.unwrap());
        assert_eq!(manager.get_installed(&[]).await.unwrap()["H5P.Test"].len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_id() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let json = metadata("H5P.Test", 1, 0, 0, &[]);
        let (_staging, directory) = stage(&json, &[]);
        manager.install_from_directory(&directory, true).await.unwrap();
        let test = library("H5P.Test", 1, 0, 0);
        let id = manager.get_id(&test).await.unwrap().unwrap();
        assert_eq!(manager.load_library(&test).await.unwrap().id, id);
        let record = &manager.get_installed(&[]).await.unwrap()["H5P.Test"][0];
        assert!(record.restricted);
    }

    #[tokio::test]
    async fn test_missing_preloaded_file_rolls_back() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let json = metadata("H5P.Test", 1, 0, 1, &["test.js"]);
        let (_staging, directory) = stage(&json, &[]);
        let err = manager.install_from_directory(&directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(message) if message.contains("test.js is missing.")));
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_patch_upgrade() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let old = metadata("H5P.Test", 1, 0, 1, &["old.js"]);
        let (_old_staging, old_directory) = stage(&old, &[("old.js", "")]);
        manager.install_from_directory(&old_directory, false).await.unwrap();
        let id = manager.get_id(&library("H5P.Test", 1, 0, 1)).await.unwrap();

        let new = metadata("H5P.Test", 1, 0, 2, &["new.js"]);
        let (_new_staging, new_directory) = stage(&new, &[("new.js", "")]);
        assert!(manager.is_patched_library(&library("H5P.Test", 1, 0, 2)).await.unwrap());
        assert!(manager.install_from_directory(&new_directory, false).await.unwrap());

        let installed = manager.get_installed(&["H5P.Test"]).await.unwrap();
        assert_eq!(installed["H5P.Test"].len(), 1);
        assert_eq!(installed["H5P.Test"][0].patch_version(), 2);
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 2)).await.unwrap(), id);
        let test = library("H5P.Test", 1, 0, 2);
        // Files of the old patch are gone.
        assert_eq!(manager.list_library_files(&test).await.unwrap(), [PathBuf::from("new.js")]);
        // An older patch is skipped.
        assert!(!manager.install_from_directory(&old_directory, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_new_minor_version_is_separate_install() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let (_a, first) = stage(&metadata("H5P.Test", 1, 0, 0, &[]), &[]);
        let (_b, second) = stage(&metadata("H5P.Test", 1, 1, 0, &[]), &[]);
        assert!(manager.install_from_directory(&first, false).await.unwrap());
        assert!(manager.install_from_directory(&second, false).await.unwrap());
        assert_eq!(manager.get_installed(&["H5P.Test"]).await.unwrap()["H5P.Test"].len(), 2);
    }

    #[tokio::test]
    async fn test_failed_patch_removes_library() {
        let (storage, manager) = faulty();
        let (_old, old_directory) = stage(&metadata("H5P.Test", 1, 0, 1, &[]), &[("a.js", "")]);
        manager.install_from_directory(&old_directory, false).await.unwrap();

        let (_new, new_directory) = stage(&metadata("H5P.Test", 1, 0, 2, &["b.js"]), &[]);
        let err = manager.install_from_directory(&new_directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 1)).await.unwrap(), None);
        assert!(storage.inner.get_installed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_copy_removes_library() {
        let (storage, manager) = faulty();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &[]), &[("a.js", ""), ("b/c.css", "")]);
        let err = manager.install_from_directory(&directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_copy_during_patch_removes_library() {
        let (storage, manager) = faulty();
        let (_old, old_directory) = stage(&metadata("H5P.Test", 1, 0, 1, &[]), &[]);
        manager.install_from_directory(&old_directory, false).await.unwrap();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        let (_new, new_directory) = stage(&metadata("H5P.Test", 1, 0, 2, &[]), &[("a.js", "")]);
        assert!(manager.install_from_directory(&new_directory, false).await.is_err());
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_rollback_wraps_error() {
        let (storage, manager) = faulty();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        storage.fail_removals.store(true, Ordering::SeqCst);
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &[]), &[("a.js", "")]);
        let err = manager.install_from_directory(&directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RollbackFailed(message) if message.contains("removal refused")));
        // The partial install is still there.
        assert!(manager.get_id(&library("H5P.Test", 1, 0, 0)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_staging_directory_touches_nothing() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let temp_dir = tempfile::tempdir().unwrap();
        let err = manager.install_from_directory(temp_dir.path(), false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Staging));
        let (_staging, directory) = stage("{\"machineName\":\"H5P.Test\"}", &[]);
        let err = manager.install_from_directory(&directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Metadata));
        assert!(manager.get_installed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall() {
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &[]), &[("a.js", "")]);
        manager.install_from_directory(&directory, false).await.unwrap();
        let test = library("H5P.Test", 1, 0, 0);
        assert!(manager.uninstall_library(&test).await.unwrap());
        assert!(!manager.uninstall_library(&test).await.unwrap());
        assert_eq!(manager.get_id(&test).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_copies_nested_files_to_file_storage() {
        let root = tempfile::tempdir().unwrap();
        let storage = h5p_storage::backend::FileStorage::new("local", root.path()).unwrap();
        let manager = LibraryManager::new(Arc::new(storage));
        let files: Vec<(String, &str)> = (0..40).map(|i| (format!("assets/{}/file{i}.txt", i % 4), "x")).collect();
        let files: Vec<(&str, &str)> = files.iter().map(|(path, content)| (path.as_str(), *content)).collect();
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &["assets/0/file0.txt"]), &files);
        assert!(manager.install_from_directory(&directory, false).await.unwrap());
        let test = library("H5P.Test", 1, 0, 0);
        assert_eq!(manager.list_library_files(&test).await.unwrap().len(), 40);
        assert!(root.path().join("H5P.Test-1.0/assets/3/file39.txt").is_file());
    }

    #[tokio::test]
    async fn test_preloaded_directory_is_not_a_file() {
        let root = tempfile::tempdir().unwrap();
        let storage = h5p_storage::backend::FileStorage::new("local", root.path()).unwrap();
        let manager = LibraryManager::new(Arc::new(storage));
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &["js"]), &[("js/other.js", "")]);
        let err = manager.install_from_directory(&directory, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(message) if message == "js is missing."));
        assert_eq!(manager.get_id(&library("H5P.Test", 1, 0, 0)).await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_in_staging_are_not_copied() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        let manager = LibraryManager::new(Arc::new(MockStorage::default()));
        let (_staging, directory) = stage(&metadata("H5P.Test", 1, 0, 0, &["test.js"]), &[("test.js", "")]);
        std::os::unix::fs::symlink(outside.path(), directory.join("link")).unwrap();
        assert!(manager.install_from_directory(&directory, false).await.unwrap());
        let files = manager.list_library_files(&library("H5P.Test", 1, 0, 0)).await.unwrap();
        assert_eq!(files, [PathBuf::from("test.js")]);
    }
}
