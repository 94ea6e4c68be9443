//! Library Ordering

use crate::Library;
use std::cmp::Ordering;

impl Library {
    /// Compare only the version triple (major, minor, patch), ignoring the
    /// machine name. Used when deciding whether a candidate upgrades an
    /// installed library.
    pub fn compare_versions(&self, other: &Self) -> Ordering {
        self.major_version()
            .cmp(&other.major_version())
            .then_with(|| self.minor_version().cmp(&other.minor_version()))
            .then_with(|| self.patch_version().cmp(&other.patch_version()))
    }
}
impl Ord for Library {
    /// Machine name (lexical) first, then the version triple.
    fn cmp(&self, other: &Self) -> Ordering {
        self.machine_name().cmp(other.machine_name()).then_with(|| self.compare_versions(other))
    }
}
impl PartialOrd for Library {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
