//! Reading a candidate library from its staging directory.

use crate::error::{Error, ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use h5p_metadata::{LibraryMetadata, METADATA_FILE};
use std::path::{Path, PathBuf};
use tokio::fs;

fn staging_error(err: std::io::Error) -> Error {
    exn::Exn::from(err).raise(ErrorKind::Staging)
}

/// Decode the `library.json` at the root of a staging directory.
pub(crate) async fn read_metadata(directory: &Path) -> Result<LibraryMetadata> {
    let bytes = fs::read(directory.join(METADATA_FILE)).await.or_raise(|| ErrorKind::Staging)?;
    LibraryMetadata::from_slice(&bytes).or_raise(|| ErrorKind::Metadata)
}

/// Walks a staging directory depth-first, yielding every regular file as a
/// path relative to `directory`. Symbolic links are skipped. The root
/// `library.json` is not yielded; storage writes it from the decoded metadata.
pub(crate) fn walk(directory: &Path) -> impl Stream<Item = Result<PathBuf>> + Send + 'static {
    let base = directory.to_path_buf();
    let mut stack = vec![base.clone()];
    stream! {
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(staging_error(e));
                    continue 'dirs;
                },
            };
            'entries: loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(e) => { yield Err(staging_error(e)); continue 'entries; },
                };
                let path = entry.path();
                // Not followed: a link could point outside the staging directory.
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => { yield Err(staging_error(e)); continue 'entries; },
                };
                if file_type.is_symlink() {
                    tracing::warn!(path = %path.display(), "Skipping symbolic link in staging directory");
                    continue 'entries;
                }
                if file_type.is_dir() {
                    stack.push(path);
                    continue 'entries;
                }
                let Ok(relative) = path.strip_prefix(&base).map(Path::to_path_buf) else {
                    continue 'entries;
                };
                if file_type.is_file() && relative != Path::new(METADATA_FILE) {
                    yield Ok(relative);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_walk_skips_root_metadata() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("library.json"), b"{}").unwrap();
        std::fs::create_dir_all(root.join("js/vendor")).unwrap();
        std::fs::write(root.join("js/vendor/library.json"), b"{}").unwrap();
        std::fs::write(root.join("js/main.js"), b"").unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        let mut files: Vec<PathBuf> = walk(root).try_collect().await.unwrap();
        files.sort();
        assert_eq!(files, [PathBuf::from("js/main.js"), PathBuf::from("js/vendor/library.json")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_skips_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("main.js"), b"").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("secret.txt")).unwrap();
        let files: Vec<PathBuf> = walk(root).try_collect().await.unwrap();
        assert_eq!(files, [PathBuf::from("main.js")]);
    }

    #[tokio::test]
    async fn test_walk_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<PathBuf>> = walk(&temp_dir.path().join("missing")).try_collect().await;
        assert!(matches!(&*result.unwrap_err(), ErrorKind::Staging));
    }

    #[tokio::test]
    async fn test_read_metadata_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = read_metadata(temp_dir.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Staging));
        std::fs::write(temp_dir.path().join("library.json"), b"{\"title\":\"No identity\"}").unwrap();
        let err = read_metadata(temp_dir.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Metadata));
    }
}
