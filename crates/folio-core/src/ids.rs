//! Global identifiers naming any record or folder across the system.
//!
//! The textual form is `<PREFIX><id>[v<version>]`, for example `SD12`,
//! `SD12v3` or `FL4`. Links compare identifiers by prefix and numeric id
//! only, so a link survives revision changes of its target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Two-letter type prefix of a [`GlobalIdentifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalIdPrefix {
    /// Structured document
    SD,
    /// Notebook
    NB,
    /// Folder
    FL,
    /// Generic gallery file
    GL,
    /// Image
    IM,
    /// Audio
    AU,
    /// Video
    AV,
    /// Chemistry structure
    CH,
    /// Sketch
    SK,
    /// Image annotation
    AN,
    /// Math expression
    MA,
    /// Network filesystem file reference
    NF,
    /// Form (document schema)
    FM,
}

impl GlobalIdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalIdPrefix::SD => "SD",
            GlobalIdPrefix::NB => "NB",
            GlobalIdPrefix::FL => "FL",
            GlobalIdPrefix::GL => "GL",
            GlobalIdPrefix::IM => "IM",
            GlobalIdPrefix::AU => "AU",
            GlobalIdPrefix::AV => "AV",
            GlobalIdPrefix::CH => "CH",
            GlobalIdPrefix::SK => "SK",
            GlobalIdPrefix::AN => "AN",
            GlobalIdPrefix::MA => "MA",
            GlobalIdPrefix::NF => "NF",
            GlobalIdPrefix::FM => "FM",
        }
    }

    /// Whether records with this prefix live in the gallery (media) tree.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            GlobalIdPrefix::GL
                | GlobalIdPrefix::IM
                | GlobalIdPrefix::AU
                | GlobalIdPrefix::AV
                | GlobalIdPrefix::CH
                | GlobalIdPrefix::SK
                | GlobalIdPrefix::AN
                | GlobalIdPrefix::MA
        )
    }

    /// Whether records with this prefix are folders (notebooks included).
    pub fn is_folder(&self) -> bool {
        matches!(self, GlobalIdPrefix::FL | GlobalIdPrefix::NB)
    }
}

impl FromStr for GlobalIdPrefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let prefix = match s {
            "SD" => GlobalIdPrefix::SD,
            "NB" => GlobalIdPrefix::NB,
            "FL" => GlobalIdPrefix::FL,
            "GL" => GlobalIdPrefix::GL,
            "IM" => GlobalIdPrefix::IM,
            "AU" => GlobalIdPrefix::AU,
            "AV" => GlobalIdPrefix::AV,
            "CH" => GlobalIdPrefix::CH,
            "SK" => GlobalIdPrefix::SK,
            "AN" => GlobalIdPrefix::AN,
            "MA" => GlobalIdPrefix::MA,
            "NF" => GlobalIdPrefix::NF,
            "FM" => GlobalIdPrefix::FM,
            other => {
                return Err(Error::InvalidInput(format!(
                    "Unknown global id prefix: {}",
                    other
                )))
            }
        };
        Ok(prefix)
    }
}

impl fmt::Display for GlobalIdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version-independent part of a [`GlobalIdentifier`], used as the key for links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub prefix: GlobalIdPrefix,
    pub id: u64,
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.id)
    }
}

/// A `(prefix, id, version)` triple uniquely naming a record or folder.
///
/// Derived equality compares all three parts; use [`GlobalIdentifier::link_eq`]
/// when the version must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalIdentifier {
    pub prefix: GlobalIdPrefix,
    pub id: u64,
    pub version: Option<u32>,
}

impl GlobalIdentifier {
    pub fn new(prefix: GlobalIdPrefix, id: u64) -> Self {
        Self {
            prefix,
            id,
            version: None,
        }
    }

    pub fn versioned(prefix: GlobalIdPrefix, id: u64, version: u32) -> Self {
        Self {
            prefix,
            id,
            version: Some(version),
        }
    }

    pub fn document(id: u64) -> Self {
        Self::new(GlobalIdPrefix::SD, id)
    }

    pub fn folder(id: u64) -> Self {
        Self::new(GlobalIdPrefix::FL, id)
    }

    /// Drop the version component.
    pub fn unversioned(&self) -> Self {
        Self::new(self.prefix, self.id)
    }

    pub fn with_version(&self, version: u32) -> Self {
        Self::versioned(self.prefix, self.id, version)
    }

    pub fn link_key(&self) -> LinkKey {
        LinkKey {
            prefix: self.prefix,
            id: self.id,
        }
    }

    /// Link equality: prefix and id match, version ignored.
    pub fn link_eq(&self, other: &GlobalIdentifier) -> bool {
        self.prefix == other.prefix && self.id == other.id
    }

    /// Parse `SD12`, `SD12v3` and similar forms.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() < 3 || !s.is_char_boundary(2) {
            return Err(Error::InvalidInput(format!("Invalid global id: {}", s)));
        }
        let (prefix, rest) = s.split_at(2);
        let prefix: GlobalIdPrefix = prefix.parse()?;

        let (id_part, version_part) = match rest.find('v') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let id = id_part
            .parse::<u64>()
            .map_err(|_| Error::InvalidInput(format!("Invalid global id number: {}", s)))?;
        let version = match version_part {
            Some(v) => Some(
                v.parse::<u32>()
                    .map_err(|_| Error::InvalidInput(format!("Invalid global id version: {}", s)))?,
            ),
            None => None,
        };

        Ok(Self {
            prefix,
            id,
            version,
        })
    }
}

impl fmt::Display for GlobalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}{}v{}", self.prefix, self.id, v),
            None => write!(f, "{}{}", self.prefix, self.id),
        }
    }
}

impl FromStr for GlobalIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GlobalIdentifier::parse(s)
    }
}

impl Serialize for GlobalIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GlobalIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GlobalIdentifier::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unversioned() {
        let gid = GlobalIdentifier::parse("SD12").unwrap();
        assert_eq!(gid.prefix, GlobalIdPrefix::SD);
        assert_eq!(gid.id, 12);
        assert_eq!(gid.version, None);
        assert_eq!(gid.to_string(), "SD12");
    }

    #[test]
    fn test_parse_versioned() {
        let gid = GlobalIdentifier::parse("GL7v3").unwrap();
        assert_eq!(gid.prefix, GlobalIdPrefix::GL);
        assert_eq!(gid.id, 7);
        assert_eq!(gid.version, Some(3));
        assert_eq!(gid.to_string(), "GL7v3");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(GlobalIdentifier::parse("").is_err());
        assert!(GlobalIdentifier::parse("XX12").is_err());
        assert!(GlobalIdentifier::parse("SD").is_err());
        assert!(GlobalIdentifier::parse("SDabc").is_err());
        assert!(GlobalIdentifier::parse("SD12vx").is_err());
    }

    #[test]
    fn test_link_eq_ignores_version() {
        let a = GlobalIdentifier::versioned(GlobalIdPrefix::SD, 5, 1);
        let b = GlobalIdentifier::versioned(GlobalIdPrefix::SD, 5, 9);
        let c = GlobalIdentifier::new(GlobalIdPrefix::NB, 5);
        assert!(a.link_eq(&b));
        assert_ne!(a, b);
        assert!(!a.link_eq(&c));
        assert_eq!(a.link_key(), b.link_key());
    }

    #[test]
    fn test_serde_as_string() {
        let gid = GlobalIdentifier::versioned(GlobalIdPrefix::SD, 42, 2);
        let json = serde_json::to_string(&gid).unwrap();
        assert_eq!(json, "\"SD42v2\"");
        let back: GlobalIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gid);
    }

    #[test]
    fn test_prefix_classification() {
        assert!(GlobalIdPrefix::IM.is_media());
        assert!(!GlobalIdPrefix::SD.is_media());
        assert!(GlobalIdPrefix::NB.is_folder());
        assert!(!GlobalIdPrefix::NF.is_media());
    }
}
