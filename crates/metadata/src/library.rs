use crate::error::{Error, ErrorKind, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

// ASCII word characters, as H5P machine names use them.
static MACHINE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,255}$").unwrap());

/// Identity of a library: its machine name and semantic version triple.
///
/// Two identities belong to the same *library line* when their machine name,
/// major and minor versions match; storage keeps at most one patch version of
/// each line installed at a time. Ordering is total: machine name first
/// (lexical), then major, minor and patch version.
///
/// # Examples
///
/// ```
/// use h5p_metadata::Library;
///
/// let library: Library = "H5P.MultiChoice-1.16.4".parse().unwrap();
/// assert_eq!(library.machine_name(), "H5P.MultiChoice");
/// assert_eq!(library.ubername(), "H5P.MultiChoice-1.16");
/// assert_eq!(library.to_string(), "H5P.MultiChoice-1.16.4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawLibrary")]
pub struct Library {
    machine_name: String,
    major_version: u32,
    minor_version: u32,
    patch_version: u32,
}

/// Unvalidated wire form, checked on its way into [`Library`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLibrary {
    machine_name: String,
    major_version: u32,
    minor_version: u32,
    patch_version: u32,
}
impl TryFrom<RawLibrary> for Library {
    type Error = ErrorKind;
    fn try_from(raw: RawLibrary) -> std::result::Result<Self, Self::Error> {
        Library::new(raw.machine_name, raw.major_version, raw.minor_version, raw.patch_version).map_err(|e| (*e).clone())
    }
}

impl Library {
    /// Create a library identity, validating the machine name.
    pub fn new(machine_name: impl Into<String>, major_version: u32, minor_version: u32, patch_version: u32) -> Result<Self> {
        let machine_name = machine_name.into();
        if !MACHINE_NAME.is_match(&machine_name) {
            exn::bail!(ErrorKind::InvalidMachineName(machine_name));
        }
        Ok(Self { machine_name, major_version, minor_version, patch_version })
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    pub fn patch_version(&self) -> u32 {
        self.patch_version
    }

    /// The same identity with a different patch version.
    pub fn with_patch_version(mut self, patch_version: u32) -> Self {
        self.patch_version = patch_version;
        self
    }

    /// Whether both identities belong to the same library line (machine name,
    /// major and minor version match; patch version is ignored).
    pub fn is_same_line(&self, other: &Self) -> bool {
        self.machine_name == other.machine_name
            && self.major_version == other.major_version
            && self.minor_version == other.minor_version
    }

    /// The name of the library line, e.g. `H5P.Example-1.2`. Storage backends
    /// use it as the directory name of an installed library.
    pub fn ubername(&self) -> String {
        format!("{}-{}.{}", self.machine_name, self.major_version, self.minor_version)
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}.{}", self.machine_name, self.major_version, self.minor_version, self.patch_version)
    }
}

impl FromStr for Library {
    type Err = Error;

    /// Parses `Machine.Name-1.2.3`, `Machine.Name 1.2.3` or the line form
    /// `Machine.Name-1.2` (patch version `0`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ErrorKind::InvalidLibraryName(s.to_string());
        // Machine names may contain dashes, versions never do.
        let (name, version) = s.trim().rsplit_once(['-', ' ']).ok_or_else(invalid)?;
        let mut numbers = version.split('.').map(u32::from_str);
        let (major, minor, patch) = match (numbers.next(), numbers.next(), numbers.next(), numbers.next()) {
            (Some(Ok(major)), Some(Ok(minor)), None, None) => (major, minor, 0),
            (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) => (major, minor, patch),
            _ => exn::bail!(invalid()),
        };
        Library::new(name, major, minor, patch).map_err(|e| e.raise(invalid()))
    }
}
