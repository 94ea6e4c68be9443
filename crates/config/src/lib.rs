//! Configuration for the H5P library tooling.
//!
//! Two layers live here:
//! - [`Config`], the boot configuration (where libraries and settings are
//!   kept), assembled from defaults, an optional config file and `H5P_`
//!   environment variables.
//! - [`Settings`], the table of H5P platform settings. Settings are persisted
//!   key by key in a [`SettingsStore`] and can be changed at runtime with
//!   [`Config::update()`], which returns a new snapshot instead of mutating a
//!   shared one.

mod config;
pub mod error;
mod settings;
mod store;

pub use crate::config::Config;
pub use crate::settings::{SettingKey, SettingKind, SettingValue, Settings};
pub use crate::store::{JsonFileStore, MemoryStore, SettingsStore};

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "H5P_";
