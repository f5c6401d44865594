//! # folio-core
//!
//! Core types, traits, and archive format definitions for folio.
//!
//! This crate provides the identifiers, content-graph models, exported
//! (archival) representation and collaborator traits that the archive
//! engine and job runner depend on.

pub mod archival;
pub mod content;
pub mod defaults;
pub mod error;
pub mod format;
pub mod ids;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use archival::*;
pub use content::{render_nfs_ref, render_ref, rewrite_refs, scan_refs, EmbeddedRef, RefKind};
pub use error::{first_line, Error, Result};
pub use format::{
    check_archive_compatibility, ArchiveFormat, ArchiveManifest, CompatibilityResult,
    MigrationRegistry, ScopeKind, Version, CURRENT_ARCHIVE_VERSION,
};
pub use ids::{GlobalIdPrefix, GlobalIdentifier, LinkKey};
pub use models::*;
pub use traits::*;
