//! Archive version compatibility checking.

use super::version::{Version, CURRENT_ARCHIVE_VERSION};

/// Result of checking an archive's format version against this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityResult {
    /// Written by the same format version.
    Compatible,

    /// Older archive; entities are upgraded through the schema migrations.
    RequiresMigration { from: String, to: String },

    /// Newer minor version still under the configured ceiling.
    NewerMinor {
        archive_version: String,
        warnings: Vec<String>,
    },

    /// Newer than the configured forward-compatibility ceiling.
    TooNew {
        archive_version: String,
        ceiling: String,
    },

    /// Cannot be imported at all.
    Incompatible { reason: String },
}

impl CompatibilityResult {
    /// Whether an import may proceed.
    pub fn is_importable(&self) -> bool {
        matches!(
            self,
            CompatibilityResult::Compatible
                | CompatibilityResult::RequiresMigration { .. }
                | CompatibilityResult::NewerMinor { .. }
        )
    }
}

/// Check an archive's manifest version against this build and a
/// forward-compatibility `ceiling` (usually the current version).
pub fn check_archive_compatibility(manifest_version: &str, ceiling: &Version) -> CompatibilityResult {
    let current = Version::current();

    let archive = match Version::parse(manifest_version) {
        Ok(v) => v,
        Err(e) => {
            return CompatibilityResult::Incompatible {
                reason: format!("Invalid archive version: {}", e),
            }
        }
    };

    if archive > *ceiling {
        return CompatibilityResult::TooNew {
            archive_version: archive.to_string(),
            ceiling: ceiling.to_string(),
        };
    }

    if !archive.same_major(&current) {
        return CompatibilityResult::Incompatible {
            reason: format!(
                "Archive major version {} is incompatible with current major version {}",
                archive.major, current.major
            ),
        };
    }

    if archive == current {
        return CompatibilityResult::Compatible;
    }

    if archive > current {
        return CompatibilityResult::NewerMinor {
            archive_version: archive.to_string(),
            warnings: vec![
                format!(
                    "Archive was created with a newer format ({}) than current ({})",
                    archive, CURRENT_ARCHIVE_VERSION
                ),
                "Unknown fields will be ignored".to_string(),
            ],
        };
    }

    CompatibilityResult::RequiresMigration {
        from: archive.to_string(),
        to: CURRENT_ARCHIVE_VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_version_compatible() {
        let result = check_archive_compatibility(CURRENT_ARCHIVE_VERSION, &Version::current());
        assert_eq!(result, CompatibilityResult::Compatible);
        assert!(result.is_importable());
    }

    #[test]
    fn test_older_version_requires_migration() {
        let result = check_archive_compatibility("1.0.0", &Version::current());
        assert_eq!(
            result,
            CompatibilityResult::RequiresMigration {
                from: "1.0.0".to_string(),
                to: CURRENT_ARCHIVE_VERSION.to_string(),
            }
        );
        assert!(result.is_importable());
    }

    #[test]
    fn test_newer_than_ceiling_is_too_new() {
        let result = check_archive_compatibility("1.5.0", &Version::current());
        match result {
            CompatibilityResult::TooNew {
                archive_version,
                ceiling,
            } => {
                assert_eq!(archive_version, "1.5.0");
                assert_eq!(ceiling, CURRENT_ARCHIVE_VERSION);
            }
            other => panic!("Expected TooNew, got {:?}", other),
        }
    }

    #[test]
    fn test_newer_minor_under_raised_ceiling() {
        let ceiling = Version::parse("1.9.0").unwrap();
        let result = check_archive_compatibility("1.5.0", &ceiling);
        match result {
            CompatibilityResult::NewerMinor { warnings, .. } => assert!(!warnings.is_empty()),
            other => panic!("Expected NewerMinor, got {:?}", other),
        }
    }

    #[test]
    fn test_different_major_incompatible() {
        let ceiling = Version::parse("9.0.0").unwrap();
        let result = check_archive_compatibility("2.0.0", &ceiling);
        match result {
            CompatibilityResult::Incompatible { reason } => {
                assert!(reason.contains("major version"))
            }
            other => panic!("Expected Incompatible, got {:?}", other),
        }
        assert!(!check_archive_compatibility("0.9.0", &ceiling).is_importable());
    }

    #[test]
    fn test_invalid_version_incompatible() {
        match check_archive_compatibility("invalid", &Version::current()) {
            CompatibilityResult::Incompatible { reason } => {
                assert!(reason.contains("Invalid archive version"))
            }
            other => panic!("Expected Incompatible, got {:?}", other),
        }
    }
}
