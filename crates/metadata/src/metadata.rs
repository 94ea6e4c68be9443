//! The `library.json` descriptor.

use crate::Library;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// Decoded contents of a library's `library.json`.
///
/// Only the fields the library manager acts upon are modelled; anything else
/// in the document is ignored on the way in. `runnable` and `fullscreen` are
/// accepted as either booleans or `0`/`1` and are always written as `0`/`1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMetadata {
    #[serde(flatten)]
    pub library: Library,
    pub title: String,
    #[serde(default, with = "flag")]
    pub runnable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_api: Option<CoreApi>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embed_types: Vec<String>,
    #[serde(default, with = "flag", skip_serializing_if = "is_false")]
    pub fullscreen: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_js: Vec<FileReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_css: Vec<FileReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_dependencies: Vec<LibraryReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_dependencies: Vec<LibraryReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editor_dependencies: Vec<LibraryReference>,
}

/// A file listed in `preloadedJs` or `preloadedCss`, relative to the library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
}

/// Version of the H5P core API a library requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreApi {
    pub major_version: u32,
    pub minor_version: u32,
}

/// A dependency on another library line (no patch version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryReference {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl LibraryMetadata {
    /// Parse a `library.json` document.
    ///
    /// # Examples
    ///
    /// ```
    /// use h5p_metadata::LibraryMetadata;
    ///
    /// let metadata = LibraryMetadata::from_slice(br#"{
    ///     "machineName": "H5P.Test", "majorVersion": 1, "minorVersion": 0, "patchVersion": 1,
    ///     "title": "Test", "runnable": 1, "preloadedJs": [{"path": "test.js"}]
    /// }"#).unwrap();
    /// assert!(metadata.runnable);
    /// assert_eq!(metadata.library.to_string(), "H5P.Test-1.0.1");
    /// ```
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::MalformedMetadata)
    }

    /// Serialize back into a pretty-printed `library.json` document.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::MalformedMetadata)
    }

    /// Every file the library declares it needs at runtime, scripts first.
    pub fn preloaded_files(&self) -> impl Iterator<Item = &str> {
        self.preloaded_js.iter().chain(&self.preloaded_css).map(|file| file.path.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// H5P writes boolean flags as `0`/`1`, but hand-written descriptors use
/// `true`/`false` just as often.
mod flag {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Int(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Bool(value) => Ok(value),
            Repr::Int(0) => Ok(false),
            Repr::Int(1) => Ok(true),
            Repr::Int(other) => Err(D::Error::custom(format!("expected 0 or 1, found {other}"))),
        }
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }
}
