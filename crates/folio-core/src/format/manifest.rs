//! The archive manifest: a flat `key: value` text file with provenance.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::version::Version;
use crate::error::{Error, Result};

pub const KEY_SOURCE: &str = "Source";
pub const KEY_VERSION: &str = "Version";
pub const KEY_APPLICATION_VERSION: &str = "Application-Version";
pub const KEY_EXPORTED_BY: &str = "Exported-By";
pub const KEY_EXPORT_SCOPE: &str = "Export-Scope";
pub const KEY_ARCHIVE_TYPE: &str = "Archive-Type";
pub const KEY_CREATED: &str = "Created";
pub const KEY_REVISION_HISTORY: &str = "Revision-History";
pub const KEY_SCHEMA_VERSION: &str = "Schema-Version";

/// Output format of an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Structured JSON units; importable.
    #[default]
    Json,
    /// Structured units plus rendered HTML for reading; not importable.
    Html,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Html => "html",
        }
    }

    pub fn is_importable(&self) -> bool {
        matches!(self, ArchiveFormat::Json)
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ArchiveFormat::Json),
            "html" => Ok(ArchiveFormat::Html),
            other => Err(Error::InvalidInput(format!("Unknown archive type: {}", other))),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breadth of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Selection,
    User,
    Group,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Selection => "selection",
            ScopeKind::User => "user",
            ScopeKind::Group => "group",
        }
    }
}

impl FromStr for ScopeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "selection" => Ok(ScopeKind::Selection),
            "user" => Ok(ScopeKind::User),
            "group" => Ok(ScopeKind::Group),
            other => Err(Error::InvalidInput(format!("Unknown export scope: {}", other))),
        }
    }
}

/// Parsed manifest. Key order is preserved and unknown keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveManifest {
    entries: Vec<(String, String)>,
}

impl ArchiveManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Self::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                Error::Format(format!("manifest line {} is not 'key: value'", n + 1))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Format(format!("manifest line {} has no key", n + 1)));
            }
            manifest.set(key, value.trim());
        }
        Ok(manifest)
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}: {}\n", k, v))
            .collect()
    }

    /// Insert or replace a key.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn source(&self) -> Option<&str> {
        self.get(KEY_SOURCE)
    }

    /// Archive format version; required.
    pub fn version(&self) -> Result<Version> {
        let raw = self
            .get(KEY_VERSION)
            .ok_or_else(|| Error::Format("manifest has no Version".to_string()))?;
        Version::parse(raw).map_err(Error::Format)
    }

    /// Archive type; manifests written before the key existed are JSON.
    pub fn archive_format(&self) -> Result<ArchiveFormat> {
        self.get(KEY_ARCHIVE_TYPE)
            .map(str::parse)
            .unwrap_or(Ok(ArchiveFormat::Json))
    }

    pub fn scope(&self) -> Option<ScopeKind> {
        self.get(KEY_EXPORT_SCOPE).and_then(|s| s.parse().ok())
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.get(KEY_CREATED)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    pub fn includes_revision_history(&self) -> bool {
        self.get(KEY_REVISION_HISTORY)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Both required keys are present and the version parses.
    pub fn validate(&self) -> Result<()> {
        if self.source().is_none() {
            return Err(Error::Format("manifest has no Source".to_string()));
        }
        self.version()?;
        self.archive_format()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let text = "Source: folio\nVersion: 1.1.0\n# comment\n\nExported-By: alice\n";
        let manifest = ArchiveManifest::parse(text).unwrap();
        assert_eq!(manifest.source(), Some("folio"));
        assert_eq!(manifest.version().unwrap(), Version::parse("1.1.0").unwrap());
        assert_eq!(manifest.get(KEY_EXPORTED_BY), Some("alice"));
        assert_eq!(
            manifest.render(),
            "Source: folio\nVersion: 1.1.0\nExported-By: alice\n"
        );
    }

    #[test]
    fn test_value_may_contain_colon() {
        let manifest = ArchiveManifest::parse("Created: 2026-01-01T10:00:00Z").unwrap();
        assert!(manifest.created().is_some());
    }

    #[test]
    fn test_parse_rejects_line_without_separator() {
        assert!(ArchiveManifest::parse("Source folio").is_err());
        assert!(ArchiveManifest::parse(": value").is_err());
    }

    #[test]
    fn test_validate_requires_source_and_version() {
        let mut manifest = ArchiveManifest::new();
        assert!(manifest.validate().is_err());
        manifest.set(KEY_SOURCE, "folio");
        assert!(manifest.validate().is_err());
        manifest.set(KEY_VERSION, "1.0.0");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_archive_format_defaults_to_json() {
        let manifest = ArchiveManifest::parse("Source: folio\nVersion: 1.0.0").unwrap();
        assert_eq!(manifest.archive_format().unwrap(), ArchiveFormat::Json);
        assert!(!manifest.includes_revision_history());
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut manifest = ArchiveManifest::new();
        manifest.set(KEY_VERSION, "1.0.0");
        manifest.set(KEY_VERSION, "1.1.0");
        assert_eq!(manifest.entries().count(), 1);
        assert_eq!(manifest.get(KEY_VERSION), Some("1.1.0"));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("Group".parse::<ScopeKind>().unwrap(), ScopeKind::Group);
        assert!("team".parse::<ScopeKind>().is_err());
    }
}
