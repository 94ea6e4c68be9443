use crate::LibraryManager;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use futures::future::try_join_all;
use h5p_metadata::{Library, METADATA_FILE};
use std::path::Path;
use tracing::instrument;

impl LibraryManager {
    /// Verifies that an installed library is complete.
    ///
    /// The library must have an id, a readable `library.json`, and every file
    /// its metadata preloads. All missing files are reported together in one
    /// [`Validation`](ErrorKind::Validation) error, one `<path> is missing.`
    /// line each.
    #[instrument(skip(self), fields(library = %library))]
    pub async fn check_consistency(&self, library: &Library) -> Result<()> {
        let loaded = self
            .read_library(library)
            .await
            .or_raise(|| ErrorKind::Validation(format!("{METADATA_FILE} of {} is not readable.", library.ubername())))?
            .ok_or_raise(|| ErrorKind::Validation(format!("{} is not installed.", library.ubername())))?;
        let checks = loaded.preloaded_files().map(|path| async move {
            let exists = self.storage.file_exists(library, Path::new(path)).await.or_raise(|| ErrorKind::Storage)?;
            Ok::<_, crate::error::Error>((!exists).then_some(path))
        });
        let missing: Vec<String> = try_join_all(checks).await?.into_iter().flatten().map(|path| format!("{path} is missing.")).collect();
        if !missing.is_empty() {
            exn::bail!(ErrorKind::Validation(missing.join("\n")));
        }
        Ok(())
    }
}
