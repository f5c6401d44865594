//! Interfaces of the external collaborators the archive engine relies on.
//!
//! The engine never talks to a concrete database, permission model or
//! filesystem share directly; it goes through these traits so the same
//! export/import code runs against any backend that satisfies them.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::GlobalIdentifier;
use crate::models::*;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Repository for folder reads and creation.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Fetch a folder by id (soft-deleted folders included).
    async fn get_folder(&self, id: u64) -> Result<Folder>;

    /// List the direct children of a folder, soft-deleted ones flagged.
    async fn list_children(&self, folder_id: u64) -> Result<Vec<FolderEntry>>;

    /// Home folder of a user.
    async fn root_folder(&self, username: &str) -> Result<u64>;

    /// A fixed system folder of a user, if the user has one of that kind.
    async fn system_folder(&self, username: &str, kind: FolderKind) -> Result<Option<u64>>;

    /// Create a folder under an existing parent.
    async fn create_folder(&self, req: CreateFolderRequest) -> Result<u64>;
}

/// Repository for documents and their revision history.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Fetch the current revision of a document.
    async fn get_document(&self, id: u64) -> Result<Document>;

    /// All revisions of a document, oldest first, current last.
    async fn list_revisions(&self, id: u64) -> Result<Vec<Document>>;

    /// Create a document and return its id.
    async fn create_document(&self, req: CreateDocumentRequest) -> Result<u64>;

    /// Attach a historical snapshot to an existing document.
    async fn add_historical_revision(&self, id: u64, req: HistoricalRevisionRequest)
        -> Result<()>;

    /// Replace the fields of the current revision (`revision = None`) or of a
    /// historical snapshot.
    async fn update_fields(&self, id: u64, revision: Option<u32>, fields: Vec<Field>)
        -> Result<()>;
}

/// Repository for gallery items.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn get_media(&self, id: u64) -> Result<MediaItem>;

    /// Stored files of a media item, canonical file first.
    async fn media_files(&self, id: u64) -> Result<Vec<StoredFile>>;

    async fn create_media(&self, req: CreateMediaRequest) -> Result<u64>;
}

/// Repository for forms.
#[async_trait]
pub trait FormRepository: Send + Sync {
    async fn get_form(&self, id: u64) -> Result<Form>;

    async fn create_form(&self, req: CreateFormRequest) -> Result<u64>;
}

/// Directory of users and groups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, username: &str) -> Result<bool>;

    async fn group_members(&self, group: &str) -> Result<Vec<String>>;
}

/// Everything the engine needs from the persistence layer.
pub trait ContentStore:
    FolderRepository + DocumentRepository + MediaRepository + FormRepository + UserDirectory
{
}

impl<T> ContentStore for T where
    T: FolderRepository + DocumentRepository + MediaRepository + FormRepository + UserDirectory
{
}

// =============================================================================
// PERMISSIONS
// =============================================================================

/// Answers whether a principal may read records or export whole scopes.
#[async_trait]
pub trait PermissionEvaluator: Send + Sync {
    /// Record-level read permission.
    async fn can_read(&self, principal: &Principal, record: &GlobalIdentifier) -> Result<bool>;

    /// Permission to export everything a user owns.
    async fn can_export_user(&self, principal: &Principal, username: &str) -> Result<bool>;

    /// Permission to export everything a group's members own.
    async fn can_export_group(&self, principal: &Principal, group: &str) -> Result<bool>;
}

// =============================================================================
// FILE ACCESS
// =============================================================================

/// Access to files living on network filesystems outside the record store.
#[async_trait]
pub trait NfsFileSource: Send + Sync {
    /// Read a file, or `None` when it is unreachable or larger than `max_bytes`.
    async fn read(&self, file_system_id: u64, path: &str, max_bytes: u64)
        -> Result<Option<Vec<u8>>>;
}

/// NFS source used when no network filesystem is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNfs;

#[async_trait]
impl NfsFileSource for NoNfs {
    async fn read(&self, _: u64, _: &str, _: u64) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Reports free space where archives are staged.
pub trait DiskSpaceSource: Send + Sync {
    fn available_bytes(&self, path: &Path) -> Result<u64>;
}

/// Disk space source that never reports a shortage.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedDiskSpace;

impl DiskSpaceSource for UnlimitedDiskSpace {
    fn available_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_nfs_is_unreachable() {
        let source = NoNfs;
        let result = source.read(1, "/data/file.txt", 1024).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unlimited_disk_space() {
        let disk = UnlimitedDiskSpace;
        assert_eq!(disk.available_bytes(Path::new("/tmp")).unwrap(), u64::MAX);
    }
}
