//! Archive validation: an ordered set of rules run before anything is parsed.
//!
//! Rules run in [`ValidationRule::ORDER`]. A rule only runs when every rule
//! before it passed or was untested; once one fails, the remaining rules are
//! recorded as [`RuleOutcome::Untested`]. The report is sealed with
//! [`ValidationReport::complete`] and ignores submissions afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use folio_core::defaults::{CONTENT_CHECKSUM_FILE, MANIFEST_FILE};
use folio_core::{check_archive_compatibility, ArchiveManifest, CompatibilityResult, Version};

use crate::checksum;
use crate::package::{self, ArchiveTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// The package is a readable gzip-compressed tar.
    ValidPackage,
    /// The manifest exists and parses.
    ManifestPresent,
    /// The archive format version is within the accepted range.
    NotTooNew,
    /// A content checksum could be computed from the unpacked files.
    ChecksumCalculated,
    /// A stored checksum matches a freshly computed one.
    ChecksumMatches,
}

impl ValidationRule {
    pub const ORDER: [ValidationRule; 5] = [
        ValidationRule::ValidPackage,
        ValidationRule::ManifestPresent,
        ValidationRule::NotTooNew,
        ValidationRule::ChecksumCalculated,
        ValidationRule::ChecksumMatches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRule::ValidPackage => "valid_package",
            ValidationRule::ManifestPresent => "manifest_present",
            ValidationRule::NotTooNew => "not_too_new",
            ValidationRule::ChecksumCalculated => "checksum_calculated",
            ValidationRule::ChecksumMatches => "checksum_matches",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RuleOutcome {
    Pass,
    Fail(String),
    Untested,
}

impl RuleOutcome {
    pub fn is_fail(&self) -> bool {
        matches!(self, RuleOutcome::Fail(_))
    }
}

/// Outcome of every rule for one archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    results: Vec<(ValidationRule, RuleOutcome)>,
    warnings: Vec<String>,
    complete: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rule outcome. Ignored once the report is complete; a later
    /// submission for the same rule replaces the earlier one.
    pub fn submit(&mut self, rule: ValidationRule, outcome: RuleOutcome) -> bool {
        if self.complete {
            return false;
        }
        match self.results.iter_mut().find(|(r, _)| *r == rule) {
            Some(existing) => existing.1 = outcome,
            None => self.results.push((rule, outcome)),
        }
        true
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        if !self.complete {
            self.warnings.push(warning.into());
        }
    }

    /// Seal the report. Rules never submitted are recorded as untested.
    pub fn complete(&mut self) {
        if self.complete {
            return;
        }
        for rule in ValidationRule::ORDER {
            if self.outcome(rule).is_none() {
                self.results.push((rule, RuleOutcome::Untested));
            }
        }
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Successful iff no rule failed.
    pub fn is_successful(&self) -> bool {
        !self.results.iter().any(|(_, o)| o.is_fail())
    }

    pub fn outcome(&self, rule: ValidationRule) -> Option<&RuleOutcome> {
        self.results
            .iter()
            .find(|(r, _)| *r == rule)
            .map(|(_, o)| o)
    }

    pub fn results(&self) -> &[(ValidationRule, RuleOutcome)] {
        &self.results
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn failures(&self) -> Vec<(ValidationRule, &str)> {
        self.results
            .iter()
            .filter_map(|(r, o)| match o {
                RuleOutcome::Fail(reason) => Some((*r, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// One line per failed rule, for error messages.
    pub fn summary(&self) -> String {
        let failures = self.failures();
        if failures.is_empty() {
            return "all checks passed".to_string();
        }
        failures
            .iter()
            .map(|(rule, reason)| format!("{}: {}", rule, reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Unpacked contents of an archive that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedArchive {
    pub path: PathBuf,
    pub tree: ArchiveTree,
    pub manifest: ArchiveManifest,
    pub compatibility: CompatibilityResult,
}

/// Runs the validation rules against a package on disk.
#[derive(Debug, Clone)]
pub struct ArchiveValidator {
    max_version: Version,
}

impl Default for ArchiveValidator {
    fn default() -> Self {
        Self::new(Version::current())
    }
}

impl ArchiveValidator {
    pub fn new(max_version: Version) -> Self {
        Self { max_version }
    }

    #[instrument(skip(self), fields(subsystem = "import", component = "validator", op = "validate", archive_path = %path.display()))]
    pub fn validate(&self, path: &Path) -> (ValidationReport, Option<ValidatedArchive>) {
        let mut report = ValidationReport::new();
        let validated = self.run_rules(path, &mut report);
        report.complete();

        info!(
            successful = report.is_successful(),
            failures = report.failures().len(),
            "Archive validation finished"
        );
        let validated = if report.is_successful() {
            validated
        } else {
            None
        };
        (report, validated)
    }

    fn run_rules(&self, path: &Path, report: &mut ValidationReport) -> Option<ValidatedArchive> {
        let tree = match package::unpack(path) {
            Ok(tree) => {
                pass(report, ValidationRule::ValidPackage);
                tree
            }
            Err(e) => {
                fail(report, ValidationRule::ValidPackage, e.to_string());
                return None;
            }
        };

        let manifest = match tree.get(MANIFEST_FILE) {
            None => {
                fail(report, ValidationRule::ManifestPresent, "manifest.txt is missing".to_string());
                return None;
            }
            Some(bytes) => {
                let parsed = std::str::from_utf8(bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|text| ArchiveManifest::parse(text).map_err(|e| e.to_string()))
                    .and_then(|m| m.validate().map(|_| m).map_err(|e| e.to_string()));
                match parsed {
                    Ok(m) => {
                        pass(report, ValidationRule::ManifestPresent);
                        m
                    }
                    Err(reason) => {
                        fail(report, ValidationRule::ManifestPresent, reason);
                        return None;
                    }
                }
            }
        };

        let version = manifest
            .get(folio_core::format::manifest::KEY_VERSION)
            .unwrap_or_default();
        let compatibility = check_archive_compatibility(version, &self.max_version);
        match &compatibility {
            CompatibilityResult::TooNew {
                archive_version,
                ceiling,
            } => {
                fail(
                    report,
                    ValidationRule::NotTooNew,
                    format!("archive version {} is newer than {}", archive_version, ceiling),
                );
                return None;
            }
            CompatibilityResult::Incompatible { reason } => {
                fail(report, ValidationRule::NotTooNew, reason.clone());
                return None;
            }
            CompatibilityResult::NewerMinor { warnings, .. } => {
                for w in warnings {
                    report.warn(w.clone());
                }
                pass(report, ValidationRule::NotTooNew);
            }
            CompatibilityResult::Compatible | CompatibilityResult::RequiresMigration { .. } => {
                pass(report, ValidationRule::NotTooNew);
            }
        }

        let fresh = match checksum::content_checksum(&tree) {
            Some(c) => {
                pass(report, ValidationRule::ChecksumCalculated);
                c
            }
            None => {
                fail(
                    report,
                    ValidationRule::ChecksumCalculated,
                    "archive holds no files to checksum".to_string(),
                );
                return None;
            }
        };

        match self.check_stored_checksums(path, &tree, &fresh) {
            Ok(outcome) => {
                if outcome.is_fail() {
                    warn!(rule = "checksum_matches", "Stored checksum does not match");
                }
                report.submit(ValidationRule::ChecksumMatches, outcome);
            }
            Err(reason) => fail(report, ValidationRule::ChecksumMatches, reason),
        }

        Some(ValidatedArchive {
            path: path.to_path_buf(),
            tree,
            manifest,
            compatibility,
        })
    }

    /// Content checksum first, package sidecar as alternative.
    fn check_stored_checksums(
        &self,
        path: &Path,
        tree: &ArchiveTree,
        fresh_content: &str,
    ) -> Result<RuleOutcome, String> {
        let stored_content = tree
            .get(CONTENT_CHECKSUM_FILE)
            .map(|b| String::from_utf8_lossy(b).trim().to_string());
        if stored_content.as_deref() == Some(fresh_content) {
            return Ok(RuleOutcome::Pass);
        }

        let stored_package = checksum::read_sidecar(path).map_err(|e| e.to_string())?;
        if let Some(stored) = &stored_package {
            let fresh_package = checksum::package_checksum(path).map_err(|e| e.to_string())?;
            if *stored == fresh_package {
                debug!("Content checksum absent or stale; package checksum matches");
                return Ok(RuleOutcome::Pass);
            }
        }

        if stored_content.is_none() && stored_package.is_none() {
            return Ok(RuleOutcome::Untested);
        }
        Ok(RuleOutcome::Fail(
            "stored checksum does not match archive contents".to_string(),
        ))
    }
}

fn pass(report: &mut ValidationReport, rule: ValidationRule) {
    debug!(rule = rule.as_str(), "Rule passed");
    report.submit(rule, RuleOutcome::Pass);
}

fn fail(report: &mut ValidationReport, rule: ValidationRule, reason: String) {
    warn!(rule = rule.as_str(), reason = %reason, "Rule failed");
    report.submit(rule, RuleOutcome::Fail(reason));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submissions_ignored_after_complete() {
        let mut report = ValidationReport::new();
        assert!(report.submit(ValidationRule::ValidPackage, RuleOutcome::Pass));
        report.complete();
        assert!(!report.submit(
            ValidationRule::ValidPackage,
            RuleOutcome::Fail("late".into())
        ));
        assert!(report.is_successful());
        assert_eq!(
            report.outcome(ValidationRule::ChecksumMatches),
            Some(&RuleOutcome::Untested)
        );
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut report = ValidationReport::new();
        report.submit(ValidationRule::ValidPackage, RuleOutcome::Fail("bad".into()));
        report.complete();
        let first = report.results().to_vec();
        report.complete();
        assert_eq!(report.results(), first.as_slice());
        assert!(!report.is_successful());
        assert_eq!(report.summary(), "valid_package: bad");
    }

    #[test]
    fn test_untested_is_not_failure() {
        let mut report = ValidationReport::new();
        report.submit(ValidationRule::ChecksumMatches, RuleOutcome::Untested);
        report.complete();
        assert!(report.is_successful());
    }

    #[test]
    fn test_missing_file_fails_first_rule() {
        let validator = ArchiveValidator::default();
        let (report, archive) = validator.validate(Path::new("/nonexistent/archive.tar.gz"));
        assert!(archive.is_none());
        assert!(report.outcome(ValidationRule::ValidPackage).unwrap().is_fail());
        assert_eq!(
            report.outcome(ValidationRule::ManifestPresent),
            Some(&RuleOutcome::Untested)
        );
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        let mut tree = ArchiveTree::new();
        tree.insert("folders.json", b"{\"folders\": []}".to_vec());
        package::pack(&tree, "a", &path).unwrap();

        let (report, archive) = ArchiveValidator::default().validate(&path);
        assert!(archive.is_none());
        assert_eq!(report.outcome(ValidationRule::ValidPackage), Some(&RuleOutcome::Pass));
        assert!(report.outcome(ValidationRule::ManifestPresent).unwrap().is_fail());
    }

    #[test]
    fn test_too_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        let mut tree = ArchiveTree::new();
        tree.insert("manifest.txt", b"Source: folio\nVersion: 9.0.0\n".to_vec());
        package::pack(&tree, "a", &path).unwrap();

        let (report, _) = ArchiveValidator::default().validate(&path);
        assert!(report.outcome(ValidationRule::NotTooNew).unwrap().is_fail());
    }

    #[test]
    fn test_no_stored_checksum_is_untested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        let mut tree = ArchiveTree::new();
        tree.insert("manifest.txt", b"Source: folio\nVersion: 1.1.0\n".to_vec());
        package::pack(&tree, "a", &path).unwrap();

        let (report, archive) = ArchiveValidator::default().validate(&path);
        assert!(archive.is_some());
        assert_eq!(
            report.outcome(ValidationRule::ChecksumMatches),
            Some(&RuleOutcome::Untested)
        );
    }
}
