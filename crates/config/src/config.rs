use crate::error::{ErrorKind, Result};
use crate::settings::{SettingKey, SettingValue, Settings};
use crate::store::SettingsStore;
use crate::ENV_PREFIX;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An immutable configuration snapshot.
///
/// # Examples
///
/// ```no_run
/// use h5p_config::Config;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load(Some(Path::new("/etc/h5p/config.toml")))?;
/// println!("libraries are kept in {}", config.libraries_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the filesystem library storage.
    pub libraries_path: PathBuf,
    /// JSON file the settings table is persisted in.
    pub settings_path: PathBuf,
    #[serde(default)]
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("org", "H5P", "h5p")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("h5p"));
        Self {
            libraries_path: data_dir.join("libraries"),
            settings_path: data_dir.join("settings.json"),
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// The layered configuration sources: defaults, then `file` (if given),
    /// then `H5P_*` environment variables. Nested keys are separated by a
    /// double underscore, as in `H5P_SETTINGS__PLATFORM_NAME`.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = match file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        tracing::debug!(libraries = %config.libraries_path.display(), settings = %config.settings_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Overlay the settings persisted in `store` on this snapshot.
    pub async fn with_stored_settings(mut self, store: &dyn SettingsStore) -> Result<Self> {
        self.settings = self.settings.overlay(store).await?;
        Ok(self)
    }

    /// Change one setting: validate it, persist it to `store`, and return the
    /// resulting snapshot. `self` is left untouched.
    pub async fn update(&self, key: SettingKey, value: SettingValue, store: &dyn SettingsStore) -> Result<Self> {
        let mut updated = self.clone();
        let persisted = value.to_json();
        updated.settings.set(key, value)?;
        store.save(key.name(), persisted).await.or_raise(|| ErrorKind::Store)?;
        tracing::info!(setting = %key, "Setting updated");
        Ok(updated)
    }
}
