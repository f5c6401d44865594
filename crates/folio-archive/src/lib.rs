//! # folio-archive
//!
//! Export and import of folio content graphs as self-describing archives.
//!
//! This crate provides:
//! - Export selection: expanding ids, users or groups into a record list
//! - Archive writing with a content checksum and a package checksum sidecar
//! - Ordered validation rules and parsing into an in-memory model
//! - Import graph reconstruction with id remapping, link rewriting and
//!   media file conflict resolution
//!
//! ## Example
//!
//! ```ignore
//! use folio_archive::{
//!     ArchiveConfig, ArchiveImporter, ArchiveRequest, ArchiveWriter, ExportScope,
//!     NoProgress, SelectionCollector,
//! };
//!
//! let config = ArchiveConfig::from_env();
//! let scope = ExportScope::User("alice".into());
//! let list = SelectionCollector::new(&store, &permissions)
//!     .collect(&scope, &principal)
//!     .await?;
//! let archive = ArchiveWriter::new(&store, &permissions, &nfs, &config)
//!     .write(&list, &ArchiveRequest::new(principal, scope.kind()), &NoProgress)
//!     .await?;
//!
//! let report = ArchiveImporter::new(&other_store, &config)
//!     .import_quietly(&archive.path, None, "bob")
//!     .await?;
//! ```

pub mod checksum;
pub mod config;
pub mod html;
pub mod importer;
pub mod package;
pub mod parser;
pub mod reconstruct;
pub mod selection;
pub mod validation;
pub mod writer;

pub use config::ArchiveConfig;
pub use importer::ArchiveImporter;
pub use package::ArchiveTree;
pub use parser::{
    ArchiveModel, ArchiveParser, ParsedDocument, ParsedForm, ParsedMedia, UnitFailure,
};
pub use reconstruct::{
    FolderReuse, FolderReusePolicy, ImportReport, ImportStage, ItemFailure, Reconstructor,
    RemapTable,
};
pub use selection::{ExportFolderPolicy, ExportRecordList, ExportScope, SelectionCollector};
pub use validation::{
    ArchiveValidator, RuleOutcome, ValidatedArchive, ValidationReport, ValidationRule,
};
pub use writer::{ArchiveRequest, ArchiveResult, ArchiveWriter, NoProgress, ProgressSink};

// Re-export core types
pub use folio_core::*;
