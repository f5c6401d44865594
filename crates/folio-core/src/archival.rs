//! Exported representation of the content graph.
//!
//! Every serialized entity carries `schema_version`, defaulted to
//! [`CURRENT_SCHEMA_VERSION`] when absent, so structural changes are
//! detectable without renaming the container format.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{scan_refs, RefKind};
use crate::error::{Error, Result};
use crate::ids::{GlobalIdPrefix, GlobalIdentifier, LinkKey};
use crate::models::{ExternalWorkflowRef, FieldDefinition, FieldType, Folder, FolderKind, MediaKind};

/// Schema version written into every serialized entity.
///
/// Version 1 stored one metadata list per gallery kind on each field;
/// version 2 stores a single tagged `gallery_refs` list.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

pub fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

// =============================================================================
// FOLDERS
// =============================================================================

/// One node of the exported folder tree. Equality is by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveFolder {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub kind: FolderKind,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ArchiveFolder {
    pub fn global_id(&self) -> GlobalIdentifier {
        GlobalIdentifier::new(self.kind.global_id_prefix(), self.id)
    }
}

impl From<&Folder> for ArchiveFolder {
    fn from(folder: &Folder) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: folder.id,
            parent_id: folder.parent_id,
            name: folder.name.clone(),
            kind: folder.kind,
            owner: folder.owner.clone(),
            created_at: folder.created_at,
            modified_at: folder.modified_at,
        }
    }
}

impl PartialEq for ArchiveFolder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ArchiveFolder {}

impl Hash for ArchiveFolder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Contents of the folder-tree file: a flat list with parent references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveFolderTree {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub folders: Vec<ArchiveFolder>,
}

// =============================================================================
// GALLERY REFERENCES
// =============================================================================

/// Metadata of a media item referenced from a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalGalleryMetadata {
    pub global_id: GlobalIdentifier,
    pub name: String,
    pub file_name: String,
    pub extension: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub description: Option<String>,
    /// Archive-relative directory of the media unit, when it was exported.
    #[serde(default)]
    pub archive_path: Option<String>,
}

impl ArchivalGalleryMetadata {
    /// Entry that names the item and nothing else.
    pub fn empty(target: &GlobalIdentifier, archive_path: Option<String>) -> Self {
        Self {
            global_id: target.unversioned(),
            name: String::new(),
            file_name: String::new(),
            extension: String::new(),
            content_type: String::new(),
            size: 0,
            description: None,
            archive_path,
        }
    }
}

/// A link from a field to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalLinkedRecord {
    pub target: GlobalIdentifier,
    pub name: String,
    /// Archive-relative directory of the target, `None` if it was not exported.
    #[serde(default)]
    pub archive_path: Option<String>,
}

/// A file living on a network filesystem outside the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalNfsFile {
    pub file_system_id: u64,
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// False when the file could not be read (or was too large) at export time.
    pub reachable: bool,
    /// Archive-relative location of the copied file.
    #[serde(default)]
    pub archive_path: Option<String>,
}

impl ArchivalNfsFile {
    pub fn global_id(&self) -> GlobalIdentifier {
        GlobalIdentifier::new(GlobalIdPrefix::NF, self.file_system_id)
    }

    /// Archive location a copied file is stored under.
    pub fn archive_location(file_system_id: u64, path: &str) -> String {
        format!(
            "{}/{}/{}",
            crate::defaults::NFS_DIR,
            file_system_id,
            path.trim_start_matches('/')
        )
    }
}

/// Every kind of item a field may reference, as one ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GalleryRef {
    Image(ArchivalGalleryMetadata),
    Audio(ArchivalGalleryMetadata),
    Video(ArchivalGalleryMetadata),
    Chem(ArchivalGalleryMetadata),
    Annotation(ArchivalGalleryMetadata),
    Attachment(ArchivalGalleryMetadata),
    Link(ArchivalLinkedRecord),
    Sketch(ArchivalGalleryMetadata),
    Math(ArchivalGalleryMetadata),
    NfsFile(ArchivalNfsFile),
}

impl GalleryRef {
    /// Wrap gallery metadata under the variant matching `kind`.
    pub fn from_media(kind: RefKind, meta: ArchivalGalleryMetadata) -> Result<Self> {
        let r = match kind {
            RefKind::Image => GalleryRef::Image(meta),
            RefKind::Audio => GalleryRef::Audio(meta),
            RefKind::Video => GalleryRef::Video(meta),
            RefKind::Chem => GalleryRef::Chem(meta),
            RefKind::Annotation => GalleryRef::Annotation(meta),
            RefKind::Attachment => GalleryRef::Attachment(meta),
            RefKind::Sketch => GalleryRef::Sketch(meta),
            RefKind::Math => GalleryRef::Math(meta),
            RefKind::Link | RefKind::NfsFile => {
                return Err(Error::InvalidInput(format!(
                    "{:?} is not a gallery reference kind",
                    kind
                )))
            }
        };
        Ok(r)
    }

    pub fn ref_kind(&self) -> RefKind {
        match self {
            GalleryRef::Image(_) => RefKind::Image,
            GalleryRef::Audio(_) => RefKind::Audio,
            GalleryRef::Video(_) => RefKind::Video,
            GalleryRef::Chem(_) => RefKind::Chem,
            GalleryRef::Annotation(_) => RefKind::Annotation,
            GalleryRef::Attachment(_) => RefKind::Attachment,
            GalleryRef::Link(_) => RefKind::Link,
            GalleryRef::Sketch(_) => RefKind::Sketch,
            GalleryRef::Math(_) => RefKind::Math,
            GalleryRef::NfsFile(_) => RefKind::NfsFile,
        }
    }

    /// Identifier of the referenced item.
    pub fn target(&self) -> GlobalIdentifier {
        match self {
            GalleryRef::Image(m)
            | GalleryRef::Audio(m)
            | GalleryRef::Video(m)
            | GalleryRef::Chem(m)
            | GalleryRef::Annotation(m)
            | GalleryRef::Attachment(m)
            | GalleryRef::Sketch(m)
            | GalleryRef::Math(m) => m.global_id,
            GalleryRef::Link(l) => l.target,
            GalleryRef::NfsFile(f) => f.global_id(),
        }
    }

    /// Gallery metadata; `None` for links and NFS files.
    pub fn media(&self) -> Option<&ArchivalGalleryMetadata> {
        match self {
            GalleryRef::Link(_) | GalleryRef::NfsFile(_) => None,
            GalleryRef::Image(m)
            | GalleryRef::Audio(m)
            | GalleryRef::Video(m)
            | GalleryRef::Chem(m)
            | GalleryRef::Annotation(m)
            | GalleryRef::Attachment(m)
            | GalleryRef::Sketch(m)
            | GalleryRef::Math(m) => Some(m),
        }
    }
}

// =============================================================================
// FIELDS, FORMS, DOCUMENTS
// =============================================================================

/// A field as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalField {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    pub field_type: FieldType,
    pub data: String,
    #[serde(default)]
    pub gallery_refs: Vec<GalleryRef>,
    #[serde(default)]
    pub workflows: Vec<ExternalWorkflowRef>,
}

/// A mismatch between field data and its reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInconsistency {
    /// Marker in the data without a metadata entry.
    MissingMetadata { kind: RefKind, target: GlobalIdentifier },
    /// Metadata entry without a marker in the data.
    OrphanMetadata { kind: RefKind, target: GlobalIdentifier },
}

impl fmt::Display for FieldInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldInconsistency::MissingMetadata { kind, target } => {
                write!(f, "{:?} {} is embedded without a metadata entry", kind, target)
            }
            FieldInconsistency::OrphanMetadata { kind, target } => {
                write!(f, "{:?} {} has metadata but is not embedded", kind, target)
            }
        }
    }
}

impl ArchivalField {
    /// Check that every embedded marker has a metadata entry and vice versa.
    pub fn check_consistency(&self) -> Vec<FieldInconsistency> {
        let embedded: Vec<(RefKind, LinkKey)> = scan_refs(&self.data)
            .into_iter()
            .map(|r| (r.kind, r.target.link_key()))
            .collect();
        let listed: Vec<(RefKind, LinkKey)> = self
            .gallery_refs
            .iter()
            .map(|g| (g.ref_kind(), g.target().link_key()))
            .collect();

        let mut problems = Vec::new();
        for r in scan_refs(&self.data) {
            if !listed.contains(&(r.kind, r.target.link_key())) {
                problems.push(FieldInconsistency::MissingMetadata {
                    kind: r.kind,
                    target: r.target,
                });
            }
        }
        for g in &self.gallery_refs {
            if !embedded.contains(&(g.ref_kind(), g.target().link_key())) {
                problems.push(FieldInconsistency::OrphanMetadata {
                    kind: g.ref_kind(),
                    target: g.target(),
                });
            }
        }
        problems
    }
}

/// Reference from a document to the form it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalFormRef {
    pub id: u64,
    pub name: String,
    pub version: u32,
}

/// A form as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalForm {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: u64,
    pub name: String,
    pub version: u32,
    pub owner: String,
    pub fields: Vec<FieldDefinition>,
    /// Icon file name inside the form directory.
    #[serde(default)]
    pub icon_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One revision of a document as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Versioned identifier (`SD12v3`).
    pub global_id: GlobalIdentifier,
    pub name: String,
    pub owner: String,
    pub parent_folder_id: Option<u64>,
    #[serde(default)]
    pub form: Option<ArchivalFormRef>,
    pub revision: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub fields: Vec<ArchivalField>,
}

impl ArchivalDocument {
    /// Archive directory name for this revision.
    pub fn unit_name(&self) -> String {
        self.global_id.unversioned().with_version(self.revision).to_string()
    }

    /// All references across all fields, in field order.
    pub fn gallery_refs(&self) -> impl Iterator<Item = &GalleryRef> {
        self.fields.iter().flat_map(|f| f.gallery_refs.iter())
    }
}

/// A gallery item as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalMedia {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub global_id: GlobalIdentifier,
    pub kind: MediaKind,
    pub name: String,
    pub owner: String,
    pub parent_folder_id: Option<u64>,
    /// Canonical file name recorded for the item.
    pub file_name: String,
    /// Canonical extension recorded for the item, without a dot.
    pub extension: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub description: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Candidate files stored in the media directory.
    pub files: Vec<String>,
}

// =============================================================================
// LINK RESOLUTION
// =============================================================================

/// Contents of the link-resolution file: every referenced identifier mapped
/// to its archive location, or to `None` when the target was not exported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkResolution {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub links: BTreeMap<String, Option<String>>,
}

impl LinkResolution {
    pub fn insert(&mut self, target: &GlobalIdentifier, archive_path: Option<String>) {
        self.links
            .entry(target.link_key().to_string())
            .and_modify(|existing| {
                if existing.is_none() {
                    *existing = archive_path.clone();
                }
            })
            .or_insert(archive_path);
    }

    /// Whether the target travels inside the archive.
    pub fn is_exported(&self, target: &GlobalIdentifier) -> bool {
        matches!(self.links.get(&target.link_key().to_string()), Some(Some(_)))
    }
}

// =============================================================================
// IMPORT OVERRIDES
// =============================================================================

/// Timestamps and owner used to stamp a reconstructed entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOverride {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub original_owner: String,
    /// Tolerate creation-after-modification left behind by old exports.
    pub allow_created_after_modified: bool,
}

/// Result of applying an [`ImportOverride`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOverride {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub original_owner: String,
    /// True when the creation time was clamped to the modification time.
    pub clamped: bool,
}

impl ImportOverride {
    pub fn new(
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        original_owner: impl Into<String>,
        allow_created_after_modified: bool,
    ) -> Self {
        Self {
            created_at,
            modified_at,
            original_owner: original_owner.into(),
            allow_created_after_modified,
        }
    }

    pub fn for_document(doc: &ArchivalDocument, allow_created_after_modified: bool) -> Self {
        Self::new(
            doc.created_at,
            doc.modified_at,
            &doc.owner,
            allow_created_after_modified,
        )
    }

    pub fn for_media(media: &ArchivalMedia, allow_created_after_modified: bool) -> Self {
        Self::new(
            media.created_at,
            media.modified_at,
            &media.owner,
            allow_created_after_modified,
        )
    }

    pub fn for_folder(folder: &ArchiveFolder, allow_created_after_modified: bool) -> Self {
        Self::new(
            folder.created_at,
            folder.modified_at,
            &folder.owner,
            allow_created_after_modified,
        )
    }

    pub fn resolve(&self) -> Result<ResolvedOverride> {
        if self.created_at <= self.modified_at {
            return Ok(ResolvedOverride {
                created_at: self.created_at,
                modified_at: self.modified_at,
                original_owner: self.original_owner.clone(),
                clamped: false,
            });
        }
        if !self.allow_created_after_modified {
            return Err(Error::InvalidInput(format!(
                "creation time {} is after modification time {}",
                self.created_at, self.modified_at
            )));
        }
        Ok(ResolvedOverride {
            created_at: self.modified_at,
            modified_at: self.modified_at,
            original_owner: self.original_owner.clone(),
            clamped: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::render_ref;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn image_meta(id: u64) -> ArchivalGalleryMetadata {
        ArchivalGalleryMetadata {
            global_id: GlobalIdentifier::new(GlobalIdPrefix::IM, id),
            name: "gel".into(),
            file_name: "gel.png".into(),
            extension: "png".into(),
            content_type: "image/png".into(),
            size: 10,
            description: None,
            archive_path: None,
        }
    }

    fn field_with(data: String, refs: Vec<GalleryRef>) -> ArchivalField {
        ArchivalField {
            schema_version: CURRENT_SCHEMA_VERSION,
            name: "Data".into(),
            field_type: FieldType::Text,
            data,
            gallery_refs: refs,
            workflows: vec![],
        }
    }

    #[test]
    fn test_archive_folder_equality_by_id() {
        let a = ArchiveFolder {
            schema_version: 2,
            id: 1,
            parent_id: None,
            name: "a".into(),
            kind: FolderKind::Normal,
            owner: "u".into(),
            created_at: ts(0),
            modified_at: ts(0),
        };
        let mut b = a.clone();
        b.name = "renamed".into();
        b.parent_id = Some(9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gallery_ref_tagged_serialization() {
        let r = GalleryRef::Image(image_meta(3));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["global_id"], "IM3");
        let back: GalleryRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_consistent_field() {
        let gid = GlobalIdentifier::new(GlobalIdPrefix::IM, 3);
        let field = field_with(
            render_ref(RefKind::Image, &gid, "gel"),
            vec![GalleryRef::Image(image_meta(3))],
        );
        assert!(field.check_consistency().is_empty());
    }

    #[test]
    fn test_inconsistent_field() {
        let gid = GlobalIdentifier::new(GlobalIdPrefix::IM, 3);
        let field = field_with(
            render_ref(RefKind::Image, &gid, "gel"),
            vec![GalleryRef::Image(image_meta(4))],
        );
        let problems = field.check_consistency();
        assert_eq!(problems.len(), 2);
        assert!(matches!(
            problems[0],
            FieldInconsistency::MissingMetadata { .. }
        ));
        assert!(matches!(problems[1], FieldInconsistency::OrphanMetadata { .. }));
    }

    #[test]
    fn test_schema_version_defaults() {
        let json = r#"{"folders": []}"#;
        let tree: ArchiveFolderTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_link_resolution_prefers_exported_location() {
        let mut links = LinkResolution::default();
        let gid = GlobalIdentifier::document(5);
        links.insert(&gid, None);
        assert!(!links.is_exported(&gid));
        links.insert(&gid.with_version(2), Some("records/SD5v2".into()));
        assert!(links.is_exported(&gid));
        links.insert(&gid, None);
        assert!(links.is_exported(&gid));
    }

    #[test]
    fn test_override_in_order() {
        let o = ImportOverride::new(ts(10), ts(20), "alice", false);
        let r = o.resolve().unwrap();
        assert_eq!(r.created_at, ts(10));
        assert!(!r.clamped);
    }

    #[test]
    fn test_override_created_after_modified_rejected() {
        let o = ImportOverride::new(ts(30), ts(20), "alice", false);
        assert!(o.resolve().is_err());
    }

    #[test]
    fn test_override_created_after_modified_tolerated() {
        let o = ImportOverride::new(ts(30), ts(20), "alice", true);
        let r = o.resolve().unwrap();
        assert_eq!(r.created_at, ts(20));
        assert_eq!(r.modified_at, ts(20));
        assert!(r.clamped);
    }

    #[test]
    fn test_nfs_archive_location() {
        assert_eq!(
            ArchivalNfsFile::archive_location(3, "/runs/a.csv"),
            "nfs/3/runs/a.csv"
        );
    }
}
