//! Archive format definitions: manifest, version compatibility and schema migrations.

pub mod compatibility;
pub mod manifest;
pub mod migration;
pub mod migrations;
pub mod version;
pub mod warning;

pub use compatibility::{check_archive_compatibility, CompatibilityResult};
pub use manifest::{ArchiveFormat, ArchiveManifest, ScopeKind};
pub use migration::{MigrationError, MigrationRegistry, MigrationResult, SchemaMigration};
pub use version::{Version, CURRENT_ARCHIVE_VERSION};
pub use warning::MigrationWarning;
