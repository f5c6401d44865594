//! Archive engine configuration.

use std::path::PathBuf;

use folio_core::defaults;
use folio_core::Version;

/// Settings shared by export and import.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Directory finished packages are written to.
    pub export_dir: PathBuf,
    /// Maximum explicit ids accepted by one selection export.
    pub max_export_ids: usize,
    /// NFS files above this size are recorded as unreachable.
    pub max_nfs_file_bytes: u64,
    /// Free space required in `export_dir` before an export starts.
    pub min_free_disk_bytes: u64,
    /// Newest archive format version accepted on import.
    pub max_archive_version: Version,
    /// Copy referenced NFS files into exports.
    pub include_nfs: bool,
    /// Clamp creation times later than modification times instead of failing.
    pub allow_created_after_modified: bool,
    /// Hours a finished export stays downloadable.
    pub expiry_hours: i64,
    /// Application version recorded in manifests.
    pub application_version: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            export_dir: std::env::temp_dir().join("folio-exports"),
            max_export_ids: defaults::MAX_EXPORT_IDS,
            max_nfs_file_bytes: defaults::MAX_NFS_FILE_BYTES,
            min_free_disk_bytes: defaults::MIN_FREE_DISK_BYTES,
            max_archive_version: Version::current(),
            include_nfs: true,
            allow_created_after_modified: true,
            expiry_hours: defaults::ARCHIVE_EXPIRY_HOURS,
            application_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `FOLIO_EXPORT_DIR`, `FOLIO_MAX_EXPORT_IDS`,
    /// `FOLIO_MAX_NFS_FILE_BYTES`, `FOLIO_MIN_FREE_DISK_BYTES`,
    /// `FOLIO_MAX_ARCHIVE_VERSION`, `FOLIO_EXPORT_NFS`,
    /// `FOLIO_ALLOW_CREATED_AFTER_MODIFIED` and `FOLIO_ARCHIVE_EXPIRY_HOURS`.
    pub fn from_env() -> Self {
        let base = Self::default();

        let export_dir = std::env::var("FOLIO_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or(base.export_dir);

        let max_export_ids = std::env::var("FOLIO_MAX_EXPORT_IDS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(base.max_export_ids)
            .max(1);

        let max_nfs_file_bytes = std::env::var("FOLIO_MAX_NFS_FILE_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(base.max_nfs_file_bytes);

        let min_free_disk_bytes = std::env::var("FOLIO_MIN_FREE_DISK_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(base.min_free_disk_bytes);

        let max_archive_version = std::env::var("FOLIO_MAX_ARCHIVE_VERSION")
            .ok()
            .and_then(|v| Version::parse(&v).ok())
            .unwrap_or(base.max_archive_version);

        let include_nfs = std::env::var("FOLIO_EXPORT_NFS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(base.include_nfs);

        let allow_created_after_modified = std::env::var("FOLIO_ALLOW_CREATED_AFTER_MODIFIED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(base.allow_created_after_modified);

        let expiry_hours = std::env::var("FOLIO_ARCHIVE_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(base.expiry_hours);

        Self {
            export_dir,
            max_export_ids,
            max_nfs_file_bytes,
            min_free_disk_bytes,
            max_archive_version,
            include_nfs,
            allow_created_after_modified,
            expiry_hours,
            application_version: base.application_version,
        }
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    pub fn with_max_export_ids(mut self, max: usize) -> Self {
        self.max_export_ids = max;
        self
    }

    pub fn with_max_nfs_file_bytes(mut self, max: u64) -> Self {
        self.max_nfs_file_bytes = max;
        self
    }

    pub fn with_min_free_disk_bytes(mut self, min: u64) -> Self {
        self.min_free_disk_bytes = min;
        self
    }

    pub fn with_max_archive_version(mut self, version: Version) -> Self {
        self.max_archive_version = version;
        self
    }

    pub fn with_include_nfs(mut self, include: bool) -> Self {
        self.include_nfs = include;
        self
    }

    pub fn with_allow_created_after_modified(mut self, allow: bool) -> Self {
        self.allow_created_after_modified = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.max_export_ids, 2000);
        assert_eq!(config.max_archive_version, Version::current());
        assert!(config.include_nfs);
    }

    #[test]
    fn test_builders() {
        let config = ArchiveConfig::default()
            .with_export_dir("/srv/exports")
            .with_max_export_ids(5)
            .with_include_nfs(false)
            .with_allow_created_after_modified(false);
        assert_eq!(config.export_dir, PathBuf::from("/srv/exports"));
        assert_eq!(config.max_export_ids, 5);
        assert!(!config.include_nfs);
        assert!(!config.allow_created_after_modified);
    }
}
