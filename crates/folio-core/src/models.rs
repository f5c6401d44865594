//! Content-graph entities as seen through the persistence layer.
//!
//! These are the shapes exchanged with the external record store. The
//! exported representation lives in [`crate::archival`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{GlobalIdPrefix, GlobalIdentifier};

// =============================================================================
// PRINCIPALS
// =============================================================================

/// The user on whose behalf an export or import runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_admin: true,
        }
    }
}

// =============================================================================
// FOLDERS
// =============================================================================

/// Type tag of a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    #[default]
    Normal,
    /// A user's home folder
    Root,
    /// Other system-managed folder
    System,
    /// Gallery root holding media items
    MediaRoot,
    /// Inbox for records created through the API
    ApiInbox,
    /// Root of the user's document templates
    Templates,
    /// Container of records shared with the user
    Shared,
    /// Notebook (ordered journal of entries)
    Notebook,
}

impl FolderKind {
    /// Folders the system creates and manages itself.
    pub fn is_system(&self) -> bool {
        !matches!(self, FolderKind::Normal | FolderKind::Notebook)
    }

    pub fn global_id_prefix(&self) -> GlobalIdPrefix {
        match self {
            FolderKind::Notebook => GlobalIdPrefix::NB,
            _ => GlobalIdPrefix::FL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub kind: FolderKind,
    pub owner: String,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Folder {
    pub fn global_id(&self) -> GlobalIdentifier {
        GlobalIdentifier::new(self.kind.global_id_prefix(), self.id)
    }
}

/// One child listed by [`crate::traits::FolderRepository::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub global_id: GlobalIdentifier,
    pub name: String,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct CreateFolderRequest {
    pub parent_id: u64,
    pub name: String,
    pub kind: FolderKind,
    pub owner: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

// =============================================================================
// FORMS AND FIELDS
// =============================================================================

/// Type of a document field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Rich text that may embed links and gallery references
    #[default]
    Text,
    String,
    Number,
    Date,
    Time,
    Choice,
    Radio,
    Reference,
}

impl FieldType {
    /// Only rich text fields carry embedded references.
    pub fn may_embed_references(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

/// Field layout entry of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormIcon {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A form: the schema defining a document's field layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: u64,
    pub name: String,
    pub version: u32,
    pub owner: String,
    pub fields: Vec<FieldDefinition>,
    pub icon: Option<FormIcon>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateFormRequest {
    pub name: String,
    pub version: u32,
    pub owner: String,
    pub fields: Vec<FieldDefinition>,
    pub icon: Option<FormIcon>,
}

/// Reference from a field to a run in an external workflow system.
///
/// `record` names the content the workflow consumed and must be rewritten
/// when the graph is reconstructed elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalWorkflowRef {
    pub service: String,
    pub external_id: String,
    pub base_url: String,
    pub record: GlobalIdentifier,
}

/// A stored document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub data: String,
    #[serde(default)]
    pub workflows: Vec<ExternalWorkflowRef>,
}

impl Field {
    pub fn text(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            data: data.into(),
            workflows: Vec::new(),
        }
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// A document at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
    pub owner: String,
    pub form_id: Option<u64>,
    pub revision: u32,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Document {
    pub fn global_id(&self) -> GlobalIdentifier {
        GlobalIdentifier::document(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    pub parent_id: u64,
    pub name: String,
    pub owner: String,
    pub form_id: Option<u64>,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Historical snapshot attached to an existing document.
#[derive(Debug, Clone)]
pub struct HistoricalRevisionRequest {
    pub revision: u32,
    pub name: String,
    pub fields: Vec<Field>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

// =============================================================================
// MEDIA
// =============================================================================

/// Kind of gallery item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Chemistry,
    Sketch,
    Annotation,
    Math,
    Document,
    #[default]
    Misc,
}

impl MediaKind {
    pub fn global_id_prefix(&self) -> GlobalIdPrefix {
        match self {
            MediaKind::Image => GlobalIdPrefix::IM,
            MediaKind::Audio => GlobalIdPrefix::AU,
            MediaKind::Video => GlobalIdPrefix::AV,
            MediaKind::Chemistry => GlobalIdPrefix::CH,
            MediaKind::Sketch => GlobalIdPrefix::SK,
            MediaKind::Annotation => GlobalIdPrefix::AN,
            MediaKind::Math => GlobalIdPrefix::MA,
            MediaKind::Document | MediaKind::Misc => GlobalIdPrefix::GL,
        }
    }
}

/// A gallery item's metadata. File bytes are fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: u64,
    pub kind: MediaKind,
    pub name: String,
    pub parent_id: Option<u64>,
    pub owner: String,
    pub file_name: String,
    pub extension: String,
    pub content_type: String,
    pub size: u64,
    pub version: u32,
    pub description: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn global_id(&self) -> GlobalIdentifier {
        GlobalIdentifier::new(self.kind.global_id_prefix(), self.id)
    }
}

/// A file stored for a media item. The canonical file comes first; further
/// entries are alternate encodings such as previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CreateMediaRequest {
    pub parent_id: u64,
    pub kind: MediaKind,
    pub name: String,
    pub owner: String,
    pub file_name: String,
    pub extension: String,
    pub content_type: String,
    pub description: Option<String>,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_kind_is_system() {
        assert!(!FolderKind::Normal.is_system());
        assert!(!FolderKind::Notebook.is_system());
        assert!(FolderKind::Root.is_system());
        assert!(FolderKind::MediaRoot.is_system());
        assert!(FolderKind::Shared.is_system());
    }

    #[test]
    fn test_folder_global_id_prefix() {
        assert_eq!(FolderKind::Notebook.global_id_prefix(), GlobalIdPrefix::NB);
        assert_eq!(FolderKind::ApiInbox.global_id_prefix(), GlobalIdPrefix::FL);
    }

    #[test]
    fn test_media_kind_prefix() {
        assert_eq!(MediaKind::Image.global_id_prefix(), GlobalIdPrefix::IM);
        assert_eq!(MediaKind::Misc.global_id_prefix(), GlobalIdPrefix::GL);
        assert_eq!(MediaKind::Document.global_id_prefix(), GlobalIdPrefix::GL);
    }

    #[test]
    fn test_folder_kind_serialization() {
        let json = serde_json::to_string(&FolderKind::ApiInbox).unwrap();
        assert_eq!(json, "\"api_inbox\"");
        let parsed: FolderKind = serde_json::from_str("\"media_root\"").unwrap();
        assert_eq!(parsed, FolderKind::MediaRoot);
    }
}
