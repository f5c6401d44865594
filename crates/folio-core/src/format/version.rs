//! Archive format versioning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Current archive format version written into every manifest.
pub const CURRENT_ARCHIVE_VERSION: &str = "1.1.0";

/// Format version of an archive, as found in its manifest.
///
/// Older writers emitted `major.minor` only; a missing patch component
/// reads as zero. Ordering is by major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `major.minor[.patch]`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut components = [0u32; 3];
        let mut count = 0;
        for part in raw.trim().split('.') {
            if count == components.len() {
                return Err(format!("too many components in version '{}'", raw.trim()));
            }
            components[count] = part
                .parse()
                .map_err(|_| format!("'{}' is not a version number in '{}'", part, raw.trim()))?;
            count += 1;
        }
        if count < 2 {
            return Err(format!("version '{}' needs at least major.minor", raw.trim()));
        }
        let [major, minor, patch] = components;
        Ok(Self::new(major, minor, patch))
    }

    /// The version this build writes.
    pub fn current() -> Self {
        Self::parse(CURRENT_ARCHIVE_VERSION).unwrap_or(Self::new(1, 1, 0))
    }

    pub fn same_major(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
