//! In-memory content store implementing every persistence trait.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use folio_core::{
    CreateDocumentRequest, CreateFolderRequest, CreateFormRequest, CreateMediaRequest, Document,
    DocumentRepository, Error, Field, Folder, FolderEntry, FolderKind, FolderRepository, Form,
    FormRepository, GlobalIdPrefix, GlobalIdentifier, HistoricalRevisionRequest, MediaItem,
    MediaKind, MediaRepository, Result, StoredFile, UserDirectory,
};

/// System folders created for every user, in creation order.
const HOME_LAYOUT: &[(FolderKind, &str)] = &[
    (FolderKind::MediaRoot, "Gallery"),
    (FolderKind::ApiInbox, "Api Inbox"),
    (FolderKind::Templates, "Templates"),
    (FolderKind::Shared, "Shared"),
];

/// Folder ids created by [`MemoryStore::add_user`].
#[derive(Debug, Clone)]
pub struct UserHome {
    pub root: u64,
    pub system: HashMap<FolderKind, u64>,
}

impl UserHome {
    pub fn gallery(&self) -> u64 {
        self.system[&FolderKind::MediaRoot]
    }

    pub fn shared(&self) -> u64 {
        self.system[&FolderKind::Shared]
    }
}

#[derive(Debug, Clone)]
struct DocumentEntry {
    current: Document,
    history: Vec<Document>,
}

#[derive(Debug, Clone)]
struct MediaEntry {
    item: MediaItem,
    files: Vec<StoredFile>,
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    folders: BTreeMap<u64, Folder>,
    documents: BTreeMap<u64, DocumentEntry>,
    media: BTreeMap<u64, MediaEntry>,
    forms: BTreeMap<u64, Form>,
    users: BTreeMap<String, UserHome>,
    groups: BTreeMap<String, Group>,
}

#[derive(Debug, Clone)]
struct Group {
    owner: String,
    members: Vec<String>,
}

impl StoreState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn folder(&self, id: u64) -> Result<&Folder> {
        self.folders.get(&id).ok_or(Error::FolderNotFound(id))
    }

    fn insert_folder(
        &mut self,
        parent_id: Option<u64>,
        name: &str,
        kind: FolderKind,
        owner: &str,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> u64 {
        let id = self.allocate();
        self.folders.insert(
            id,
            Folder {
                id,
                parent_id,
                name: name.to_string(),
                kind,
                owner: owner.to_string(),
                deleted: false,
                created_at,
                modified_at,
            },
        );
        id
    }
}

/// A complete record store held in memory.
///
/// Ids come from one sequence shared by all entity kinds, starting after a
/// configurable offset so that two stores hand out disjoint ids.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose first allocated id is `offset + 1`.
    pub fn with_id_offset(offset: u64) -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_id: offset,
                ..Default::default()
            }),
        }
    }

    // ---- seeding ---------------------------------------------------------

    /// Create a user with a home folder and the standard system folders.
    pub async fn add_user(&self, username: &str) -> UserHome {
        let mut state = self.state.write().await;
        if let Some(home) = state.users.get(username) {
            return home.clone();
        }
        let now = Utc::now();
        let root = state.insert_folder(None, username, FolderKind::Root, username, now, now);
        let mut system = HashMap::new();
        for (kind, name) in HOME_LAYOUT {
            let id = state.insert_folder(Some(root), name, *kind, username, now, now);
            system.insert(*kind, id);
        }
        let home = UserHome { root, system };
        state.users.insert(username.to_string(), home.clone());
        debug!(username, root, "Created user home");
        home
    }

    pub async fn add_group(&self, name: &str, owner: &str, members: &[&str]) {
        let mut state = self.state.write().await;
        state.groups.insert(
            name.to_string(),
            Group {
                owner: owner.to_string(),
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    pub async fn add_folder(&self, parent_id: u64, name: &str, kind: FolderKind, owner: &str) -> u64 {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.insert_folder(Some(parent_id), name, kind, owner, now, now)
    }

    pub async fn add_document(
        &self,
        parent_id: u64,
        name: &str,
        owner: &str,
        form_id: Option<u64>,
        fields: Vec<Field>,
    ) -> u64 {
        let now = Utc::now();
        let req = CreateDocumentRequest {
            parent_id,
            name: name.to_string(),
            owner: owner.to_string(),
            form_id,
            fields,
            tags: Vec::new(),
            created_at: now,
            modified_at: now,
        };
        let mut state = self.state.write().await;
        insert_document(&mut state, req)
    }

    /// Save a new revision of a document; the previous one moves to history.
    pub async fn revise_document(&self, id: u64, fields: Vec<Field>) -> Result<u32> {
        let mut state = self.state.write().await;
        let entry = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| Error::RecordNotFound(GlobalIdentifier::document(id).to_string()))?;
        let previous = entry.current.clone();
        entry.history.push(previous);
        entry.current.revision += 1;
        entry.current.fields = fields;
        entry.current.modified_at = Utc::now();
        Ok(entry.current.revision)
    }

    pub async fn add_media(
        &self,
        parent_id: u64,
        kind: MediaKind,
        name: &str,
        owner: &str,
        files: Vec<StoredFile>,
    ) -> u64 {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let id = state.allocate();
        let canonical = files.first().cloned().unwrap_or(StoredFile {
            file_name: name.to_string(),
            bytes: Vec::new(),
        });
        let extension = extension_of(&canonical.file_name);
        state.media.insert(
            id,
            MediaEntry {
                item: MediaItem {
                    id,
                    kind,
                    name: name.to_string(),
                    parent_id: Some(parent_id),
                    owner: owner.to_string(),
                    file_name: canonical.file_name.clone(),
                    content_type: content_type_for(&extension).to_string(),
                    extension,
                    size: canonical.bytes.len() as u64,
                    version: 1,
                    description: None,
                    deleted: false,
                    created_at: now,
                    modified_at: now,
                },
                files,
            },
        );
        id
    }

    pub async fn add_form(&self, req: CreateFormRequest) -> u64 {
        let mut state = self.state.write().await;
        insert_form(&mut state, req)
    }

    /// Mark a folder, document or media item as soft-deleted.
    pub async fn soft_delete(&self, gid: &GlobalIdentifier) -> Result<()> {
        let mut state = self.state.write().await;
        let found = if gid.prefix.is_folder() {
            state.folders.get_mut(&gid.id).map(|f| f.deleted = true)
        } else if gid.prefix == GlobalIdPrefix::SD {
            state
                .documents
                .get_mut(&gid.id)
                .map(|d| d.current.deleted = true)
        } else {
            state.media.get_mut(&gid.id).map(|m| m.item.deleted = true)
        };
        found.ok_or_else(|| Error::RecordNotFound(gid.to_string()))
    }

    // ---- inspection ------------------------------------------------------

    /// Owner of any record or folder, used by the permission model.
    pub async fn owner_of(&self, gid: &GlobalIdentifier) -> Option<String> {
        let state = self.state.read().await;
        match gid.prefix {
            GlobalIdPrefix::FL | GlobalIdPrefix::NB => {
                state.folders.get(&gid.id).map(|f| f.owner.clone())
            }
            GlobalIdPrefix::SD => state.documents.get(&gid.id).map(|d| d.current.owner.clone()),
            GlobalIdPrefix::FM => state.forms.get(&gid.id).map(|f| f.owner.clone()),
            GlobalIdPrefix::NF => None,
            _ => state.media.get(&gid.id).map(|m| m.item.owner.clone()),
        }
    }

    pub async fn group_owner(&self, group: &str) -> Option<String> {
        let state = self.state.read().await;
        state.groups.get(group).map(|g| g.owner.clone())
    }

    /// Every folder owned by `owner`, in id order.
    pub async fn folders_owned_by(&self, owner: &str) -> Vec<Folder> {
        let state = self.state.read().await;
        state
            .folders
            .values()
            .filter(|f| f.owner == owner)
            .cloned()
            .collect()
    }

    /// Current revision of every document owned by `owner`, in id order.
    pub async fn documents_owned_by(&self, owner: &str) -> Vec<Document> {
        let state = self.state.read().await;
        state
            .documents
            .values()
            .filter(|d| d.current.owner == owner)
            .map(|d| d.current.clone())
            .collect()
    }

    pub async fn media_owned_by(&self, owner: &str) -> Vec<MediaItem> {
        let state = self.state.read().await;
        state
            .media
            .values()
            .filter(|m| m.item.owner == owner)
            .map(|m| m.item.clone())
            .collect()
    }

    pub async fn forms_owned_by(&self, owner: &str) -> Vec<Form> {
        let state = self.state.read().await;
        state
            .forms
            .values()
            .filter(|f| f.owner == owner)
            .cloned()
            .collect()
    }

    /// Historical snapshots of a document, oldest first.
    pub async fn history_of(&self, id: u64) -> Vec<Document> {
        let state = self.state.read().await;
        state
            .documents
            .get(&id)
            .map(|d| d.history.clone())
            .unwrap_or_default()
    }
}

fn insert_document(state: &mut StoreState, req: CreateDocumentRequest) -> u64 {
    let id = state.allocate();
    state.documents.insert(
        id,
        DocumentEntry {
            current: Document {
                id,
                name: req.name,
                parent_id: Some(req.parent_id),
                owner: req.owner,
                form_id: req.form_id,
                revision: 1,
                fields: req.fields,
                tags: req.tags,
                deleted: false,
                created_at: req.created_at,
                modified_at: req.modified_at,
            },
            history: Vec::new(),
        },
    );
    id
}

fn insert_form(state: &mut StoreState, req: CreateFormRequest) -> u64 {
    let id = state.allocate();
    state.forms.insert(
        id,
        Form {
            id,
            name: req.name,
            version: req.version,
            owner: req.owner,
            fields: req.fields,
            icon: req.icon,
            created_at: Utc::now(),
        },
    );
    id
}

fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "mol" => "chemical/x-mdl-molfile",
        "pdf" => "application/pdf",
        "txt" | "csv" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl FolderRepository for MemoryStore {
    async fn get_folder(&self, id: u64) -> Result<Folder> {
        let state = self.state.read().await;
        state.folder(id).cloned()
    }

    async fn list_children(&self, folder_id: u64) -> Result<Vec<FolderEntry>> {
        let state = self.state.read().await;
        state.folder(folder_id)?;

        let folders = state
            .folders
            .values()
            .filter(|f| f.parent_id == Some(folder_id))
            .map(|f| FolderEntry {
                global_id: f.global_id(),
                name: f.name.clone(),
                deleted: f.deleted,
            });
        let documents = state
            .documents
            .values()
            .filter(|d| d.current.parent_id == Some(folder_id))
            .map(|d| FolderEntry {
                global_id: d.current.global_id(),
                name: d.current.name.clone(),
                deleted: d.current.deleted,
            });
        let media = state
            .media
            .values()
            .filter(|m| m.item.parent_id == Some(folder_id))
            .map(|m| FolderEntry {
                global_id: m.item.global_id(),
                name: m.item.name.clone(),
                deleted: m.item.deleted,
            });

        let mut children: Vec<FolderEntry> = folders.chain(documents).chain(media).collect();
        children.sort_by_key(|c| c.global_id.id);
        Ok(children)
    }

    async fn root_folder(&self, username: &str) -> Result<u64> {
        let state = self.state.read().await;
        state
            .users
            .get(username)
            .map(|h| h.root)
            .ok_or_else(|| Error::NotFound(format!("user {}", username)))
    }

    async fn system_folder(&self, username: &str, kind: FolderKind) -> Result<Option<u64>> {
        let state = self.state.read().await;
        let home = state
            .users
            .get(username)
            .ok_or_else(|| Error::NotFound(format!("user {}", username)))?;
        if kind == FolderKind::Root {
            return Ok(Some(home.root));
        }
        Ok(home.system.get(&kind).copied())
    }

    async fn create_folder(&self, req: CreateFolderRequest) -> Result<u64> {
        let mut state = self.state.write().await;
        let parent = state.folder(req.parent_id)?;
        if parent.deleted {
            return Err(Error::Storage(format!(
                "parent folder {} is deleted",
                req.parent_id
            )));
        }
        let now = Utc::now();
        Ok(state.insert_folder(
            Some(req.parent_id),
            &req.name,
            req.kind,
            &req.owner,
            req.created_at.unwrap_or(now),
            req.modified_at.unwrap_or(now),
        ))
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn get_document(&self, id: u64) -> Result<Document> {
        let state = self.state.read().await;
        state
            .documents
            .get(&id)
            .map(|d| d.current.clone())
            .ok_or_else(|| Error::RecordNotFound(GlobalIdentifier::document(id).to_string()))
    }

    async fn list_revisions(&self, id: u64) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let entry = state
            .documents
            .get(&id)
            .ok_or_else(|| Error::RecordNotFound(GlobalIdentifier::document(id).to_string()))?;
        let mut revisions = entry.history.clone();
        revisions.push(entry.current.clone());
        Ok(revisions)
    }

    async fn create_document(&self, req: CreateDocumentRequest) -> Result<u64> {
        let mut state = self.state.write().await;
        state.folder(req.parent_id)?;
        Ok(insert_document(&mut state, req))
    }

    async fn add_historical_revision(&self, id: u64, req: HistoricalRevisionRequest) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| Error::RecordNotFound(GlobalIdentifier::document(id).to_string()))?;
        let mut snapshot = entry.current.clone();
        snapshot.revision = req.revision;
        snapshot.name = req.name;
        snapshot.fields = req.fields;
        snapshot.created_at = req.created_at;
        snapshot.modified_at = req.modified_at;
        entry.history.push(snapshot);
        entry.history.sort_by_key(|d| d.revision);
        Ok(())
    }

    async fn update_fields(&self, id: u64, revision: Option<u32>, fields: Vec<Field>) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| Error::RecordNotFound(GlobalIdentifier::document(id).to_string()))?;
        match revision {
            None => entry.current.fields = fields,
            Some(rev) => {
                let snapshot = entry
                    .history
                    .iter_mut()
                    .find(|d| d.revision == rev)
                    .ok_or_else(|| {
                        Error::RecordNotFound(
                            GlobalIdentifier::document(id).with_version(rev).to_string(),
                        )
                    })?;
                snapshot.fields = fields;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MediaRepository for MemoryStore {
    async fn get_media(&self, id: u64) -> Result<MediaItem> {
        let state = self.state.read().await;
        state
            .media
            .get(&id)
            .map(|m| m.item.clone())
            .ok_or_else(|| Error::RecordNotFound(format!("media {}", id)))
    }

    async fn media_files(&self, id: u64) -> Result<Vec<StoredFile>> {
        let state = self.state.read().await;
        state
            .media
            .get(&id)
            .map(|m| m.files.clone())
            .ok_or_else(|| Error::RecordNotFound(format!("media {}", id)))
    }

    async fn create_media(&self, req: CreateMediaRequest) -> Result<u64> {
        let mut state = self.state.write().await;
        state.folder(req.parent_id)?;
        let id = state.allocate();
        let file = StoredFile {
            file_name: req.file_name.clone(),
            bytes: req.bytes,
        };
        state.media.insert(
            id,
            MediaEntry {
                item: MediaItem {
                    id,
                    kind: req.kind,
                    name: req.name,
                    parent_id: Some(req.parent_id),
                    owner: req.owner,
                    file_name: req.file_name,
                    extension: req.extension,
                    content_type: req.content_type,
                    size: file.bytes.len() as u64,
                    version: 1,
                    description: req.description,
                    deleted: false,
                    created_at: req.created_at,
                    modified_at: req.modified_at,
                },
                files: vec![file],
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl FormRepository for MemoryStore {
    async fn get_form(&self, id: u64) -> Result<Form> {
        let state = self.state.read().await;
        state
            .forms
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::RecordNotFound(format!("form {}", id)))
    }

    async fn create_form(&self, req: CreateFormRequest) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(insert_form(&mut state, req))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, username: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.users.contains_key(username))
    }

    async fn group_members(&self, group: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        state
            .groups
            .get(group)
            .map(|g| g.members.clone())
            .ok_or_else(|| Error::NotFound(format!("group {}", group)))
    }
}
