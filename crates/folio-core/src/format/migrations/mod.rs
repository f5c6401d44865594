//! Schema migration handlers.
//!
//! Each migration transforms one archived document from one schema version
//! to the next. Migrations are registered with the MigrationRegistry and
//! applied automatically while an archive is parsed.

pub mod v1_to_v2;

/// Get all registered migrations
pub fn all_migrations() -> Vec<Box<dyn super::SchemaMigration>> {
    vec![Box::new(v1_to_v2::TaggedGalleryRefs)]
}
