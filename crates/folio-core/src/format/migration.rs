//! Schema migration trait and registry for archived entities.

use super::warning::MigrationWarning;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::archival::CURRENT_SCHEMA_VERSION;

/// Why an archived entity could not be brought up to the current schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no migration registered from schema {from} towards {to}")]
    NoMigrationPath { from: u32, to: u32 },

    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("bad schema version: {0}")]
    InvalidVersion(String),
}

impl From<MigrationError> for crate::Error {
    fn from(e: MigrationError) -> Self {
        crate::Error::Format(e.to_string())
    }
}

/// An upgraded entity plus whatever the upgrade had to report.
#[derive(Debug)]
pub struct MigrationResult {
    pub data: Value,
    pub warnings: Vec<MigrationWarning>,
}

/// One upgrade step of an archived entity's JSON.
#[allow(clippy::wrong_self_convention)]
pub trait SchemaMigration: Send + Sync {
    fn from_version(&self) -> u32;

    fn to_version(&self) -> u32 {
        self.from_version() + 1
    }

    fn description(&self) -> &str;

    fn migrate(&self, data: Value) -> Result<MigrationResult, MigrationError>;
}

/// Upgrade steps keyed by the schema version they start from.
///
/// Steps are chained in order; at most one step may start at a version,
/// a later registration replaces an earlier one.
#[derive(Default)]
pub struct MigrationRegistry {
    steps: BTreeMap<u32, Box<dyn SchemaMigration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every migration shipped with this build.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for migration in super::migrations::all_migrations() {
            registry.register(migration);
        }
        registry
    }

    pub fn register(&mut self, migration: Box<dyn SchemaMigration>) {
        self.steps.insert(migration.from_version(), migration);
    }

    /// Steps leading from `from` to exactly `to`, in application order.
    pub fn chain(&self, from: u32, to: u32) -> Result<Vec<&dyn SchemaMigration>, MigrationError> {
        let mut chain = Vec::new();
        let mut at = from;
        while at < to {
            let step = self
                .steps
                .get(&at)
                .filter(|step| step.to_version() > at && step.to_version() <= to)
                .ok_or(MigrationError::NoMigrationPath { from: at, to })?;
            chain.push(step.as_ref());
            at = step.to_version();
        }
        if at != to {
            return Err(MigrationError::NoMigrationPath { from, to });
        }
        Ok(chain)
    }

    /// Apply every step from `from` to `to`, collecting their warnings.
    pub fn migrate(&self, data: Value, from: u32, to: u32) -> Result<MigrationResult, MigrationError> {
        let mut upgraded = MigrationResult {
            data,
            warnings: Vec::new(),
        };
        for step in self.chain(from, to)? {
            let MigrationResult { data, warnings } = step.migrate(upgraded.data)?;
            upgraded.data = data;
            upgraded.warnings.extend(warnings);
        }
        Ok(upgraded)
    }

    /// Bring a serialized entity up to [`CURRENT_SCHEMA_VERSION`].
    ///
    /// A missing `schema_version` means the entity is already current.
    pub fn upgrade(&self, data: Value) -> Result<MigrationResult, MigrationError> {
        let version = match data.get("schema_version") {
            None => CURRENT_SCHEMA_VERSION,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| MigrationError::InvalidVersion(v.to_string()))?,
        };
        if version > CURRENT_SCHEMA_VERSION {
            return Err(MigrationError::InvalidVersion(format!(
                "schema {} is newer than supported schema {}",
                version, CURRENT_SCHEMA_VERSION
            )));
        }
        self.migrate(data, version, CURRENT_SCHEMA_VERSION)
    }
}
