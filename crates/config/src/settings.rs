//! The H5P platform settings table.
//!
//! Every setting is listed in [`SettingKey`] together with its kind and its
//! default, so settings can be read, written and persisted by name without
//! reflection.

use crate::error::{ErrorKind, Result};
use crate::store::SettingsStore;
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Type of value a setting holds.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    #[display("boolean")]
    Bool,
    #[display("integer")]
    Integer,
    #[display("text")]
    Text,
}

/// A typed setting value.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}
impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Bool(_) => SettingKind::Bool,
            Self::Integer(_) => SettingKind::Integer,
            Self::Text(_) => SettingKind::Text,
        }
    }

    /// Parse user input (for example a command-line argument) as a value of
    /// the kind `key` requires.
    pub fn parse(key: SettingKey, input: &str) -> Result<Self> {
        let invalid = |reason: &str| ErrorKind::InvalidSetting { key: key.name(), reason: reason.to_string() };
        Ok(match key.kind() {
            SettingKind::Bool => match input.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Self::Bool(true),
                "false" | "0" | "no" | "off" => Self::Bool(false),
                _ => exn::bail!(invalid("expected true or false")),
            },
            SettingKind::Integer => Self::Integer(input.trim().parse::<i64>().or_raise(|| invalid("expected an integer"))?),
            SettingKind::Text => Self::Text(input.to_string()),
        })
    }

    /// Decode a persisted value for `key`.
    pub fn from_json(key: SettingKey, value: &Value) -> Result<Self> {
        let decoded = match (key.kind(), value) {
            (SettingKind::Bool, Value::Bool(b)) => Some(Self::Bool(*b)),
            (SettingKind::Integer, Value::Number(n)) => n.as_i64().map(Self::Integer),
            (SettingKind::Text, Value::String(s)) => Some(Self::Text(s.clone())),
            _ => None,
        };
        decoded.ok_or_else(|| {
            exn::Exn::from(ErrorKind::InvalidSetting { key: key.name(), reason: format!("expected {}, found {value}", key.kind()) })
        })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Names of every H5P setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    FetchingDisabled,
    Uuid,
    SiteType,
    SendUsageStatistics,
    ContentTypeCacheRefreshInterval,
    EnableLrsContentTypes,
    ContentWhitelist,
    LibraryWhitelist,
    HubRegistrationEndpoint,
    HubContentTypesEndpoint,
    PlatformName,
    PlatformVersion,
    H5pVersion,
    CoreApiVersion,
}

impl SettingKey {
    pub const ALL: [SettingKey; 14] = [
        Self::FetchingDisabled,
        Self::Uuid,
        Self::SiteType,
        Self::SendUsageStatistics,
        Self::ContentTypeCacheRefreshInterval,
        Self::EnableLrsContentTypes,
        Self::ContentWhitelist,
        Self::LibraryWhitelist,
        Self::HubRegistrationEndpoint,
        Self::HubContentTypesEndpoint,
        Self::PlatformName,
        Self::PlatformVersion,
        Self::H5pVersion,
        Self::CoreApiVersion,
    ];

    /// Name under which the setting is persisted.
    pub fn name(self) -> &'static str {
        match self {
            Self::FetchingDisabled => "fetchingDisabled",
            Self::Uuid => "uuid",
            Self::SiteType => "siteType",
            Self::SendUsageStatistics => "sendUsageStatistics",
            Self::ContentTypeCacheRefreshInterval => "contentTypeCacheRefreshInterval",
            Self::EnableLrsContentTypes => "enableLrsContentTypes",
            Self::ContentWhitelist => "contentWhitelist",
            Self::LibraryWhitelist => "libraryWhitelist",
            Self::HubRegistrationEndpoint => "hubRegistrationEndpoint",
            Self::HubContentTypesEndpoint => "hubContentTypesEndpoint",
            Self::PlatformName => "platformName",
            Self::PlatformVersion => "platformVersion",
            Self::H5pVersion => "h5pVersion",
            Self::CoreApiVersion => "coreApiVersion",
        }
    }

    pub fn kind(self) -> SettingKind {
        match self {
            Self::FetchingDisabled | Self::SendUsageStatistics | Self::EnableLrsContentTypes => SettingKind::Bool,
            Self::ContentTypeCacheRefreshInterval => SettingKind::Integer,
            _ => SettingKind::Text,
        }
    }

    pub fn default_value(self) -> SettingValue {
        Settings::default().get(self)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKey {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownSetting(s.to_string())))
    }
}

/// H5P platform settings.
///
/// Field names follow Rust conventions so that config files and environment
/// variables read naturally; [`SettingKey::name()`] gives the persisted name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Never contact the H5P Hub.
    pub fetching_disabled: bool,
    /// Site identifier assigned on hub registration.
    pub uuid: String,
    /// `local`, `network` or `internet`.
    pub site_type: String,
    pub send_usage_statistics: bool,
    /// Milliseconds between refreshes of the hub's content type list.
    pub content_type_cache_refresh_interval: i64,
    pub enable_lrs_content_types: bool,
    /// Space separated file extensions allowed in content.
    pub content_whitelist: String,
    /// Space separated file extensions allowed in libraries, on top of the
    /// content whitelist.
    pub library_whitelist: String,
    pub hub_registration_endpoint: String,
    pub hub_content_types_endpoint: String,
    pub platform_name: String,
    pub platform_version: String,
    pub h5p_version: String,
    /// `<major>.<minor>` of the core API implemented by this platform.
    pub core_api_version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetching_disabled: false,
            uuid: String::new(),
            site_type: "local".to_string(),
            send_usage_statistics: true,
            content_type_cache_refresh_interval: 24 * 60 * 60 * 1000,
            enable_lrs_content_types: true,
            content_whitelist: "json png jpg jpeg gif bmp tif tiff svg eot ttf woff woff2 otf webm mp4 ogg mp3 m4a wav txt \
                                pdf rtf doc docx xls xlsx ppt pptx odt ods odp xml csv diff patch swf md textile vtt webvtt"
                .to_string(),
            library_whitelist: "js css".to_string(),
            hub_registration_endpoint: "https://api.h5p.org/v1/sites".to_string(),
            hub_content_types_endpoint: "https://api.h5p.org/v1/content-types/".to_string(),
            platform_name: "H5P Rust".to_string(),
            platform_version: env!("CARGO_PKG_VERSION").to_string(),
            h5p_version: "1.24".to_string(),
            core_api_version: "1.24".to_string(),
        }
    }
}

impl Settings {
    pub fn get(&self, key: SettingKey) -> SettingValue {
        use SettingValue::{Bool, Integer, Text};
        match key {
            SettingKey::FetchingDisabled => Bool(self.fetching_disabled),
            SettingKey::Uuid => Text(self.uuid.clone()),
            SettingKey::SiteType => Text(self.site_type.clone()),
            SettingKey::SendUsageStatistics => Bool(self.send_usage_statistics),
            SettingKey::ContentTypeCacheRefreshInterval => Integer(self.content_type_cache_refresh_interval),
            SettingKey::EnableLrsContentTypes => Bool(self.enable_lrs_content_types),
            SettingKey::ContentWhitelist => Text(self.content_whitelist.clone()),
            SettingKey::LibraryWhitelist => Text(self.library_whitelist.clone()),
            SettingKey::HubRegistrationEndpoint => Text(self.hub_registration_endpoint.clone()),
            SettingKey::HubContentTypesEndpoint => Text(self.hub_content_types_endpoint.clone()),
            SettingKey::PlatformName => Text(self.platform_name.clone()),
            SettingKey::PlatformVersion => Text(self.platform_version.clone()),
            SettingKey::H5pVersion => Text(self.h5p_version.clone()),
            SettingKey::CoreApiVersion => Text(self.core_api_version.clone()),
        }
    }

    /// Change one setting. Fails if the value is of the wrong kind.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<()> {
        use SettingValue::{Bool, Integer, Text};
        match (key, value) {
            (SettingKey::FetchingDisabled, Bool(v)) => self.fetching_disabled = v,
            (SettingKey::Uuid, Text(v)) => self.uuid = v,
            (SettingKey::SiteType, Text(v)) => self.site_type = v,
            (SettingKey::SendUsageStatistics, Bool(v)) => self.send_usage_statistics = v,
            (SettingKey::ContentTypeCacheRefreshInterval, Integer(v)) => self.content_type_cache_refresh_interval = v,
            (SettingKey::EnableLrsContentTypes, Bool(v)) => self.enable_lrs_content_types = v,
            (SettingKey::ContentWhitelist, Text(v)) => self.content_whitelist = v,
            (SettingKey::LibraryWhitelist, Text(v)) => self.library_whitelist = v,
            (SettingKey::HubRegistrationEndpoint, Text(v)) => self.hub_registration_endpoint = v,
            (SettingKey::HubContentTypesEndpoint, Text(v)) => self.hub_content_types_endpoint = v,
            (SettingKey::PlatformName, Text(v)) => self.platform_name = v,
            (SettingKey::PlatformVersion, Text(v)) => self.platform_version = v,
            (SettingKey::H5pVersion, Text(v)) => self.h5p_version = v,
            (SettingKey::CoreApiVersion, Text(v)) => self.core_api_version = v,
            (key, value) => exn::bail!(ErrorKind::InvalidSetting {
                key: key.name(),
                reason: format!("expected {}, found {}", key.kind(), value.kind()),
            }),
        }
        Ok(())
    }

    /// Settings read from `store`, with defaults for anything not stored.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        Self::default().overlay(store).await
    }

    /// Replace every setting that `store` holds a value for.
    pub async fn overlay(mut self, store: &dyn SettingsStore) -> Result<Self> {
        for key in SettingKey::ALL {
            let Some(stored) = store.load(key.name()).await.or_raise(|| ErrorKind::Store)? else {
                continue;
            };
            self.set(key, SettingValue::from_json(key, &stored)?)?;
        }
        Ok(self)
    }

    /// Persist every setting to `store`.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        for key in SettingKey::ALL {
            store.save(key.name(), self.get(key).to_json()).await.or_raise(|| ErrorKind::Store)?;
        }
        Ok(())
    }
}
