//! Archive writer: serialize an export selection into a checksummed package.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use folio_core::defaults::{
    CONTENT_CHECKSUM_FILE, DOCUMENT_FILE, DOCUMENT_HTML_FILE, FOLDER_TREE_FILE, FORMS_DIR,
    FORM_FILE, LINK_RESOLUTION_FILE, MANIFEST_FILE, MEDIA_DIR, MEDIA_FILE, RECORDS_DIR,
    SOURCE_TAG,
};
use folio_core::format::manifest::{
    KEY_APPLICATION_VERSION, KEY_ARCHIVE_TYPE, KEY_CREATED, KEY_EXPORTED_BY, KEY_EXPORT_SCOPE,
    KEY_REVISION_HISTORY, KEY_SCHEMA_VERSION, KEY_SOURCE, KEY_VERSION,
};
use folio_core::{
    scan_refs, ArchivalDocument, ArchivalField, ArchivalForm, ArchivalFormRef,
    ArchivalGalleryMetadata, ArchivalLinkedRecord, ArchivalMedia, ArchivalNfsFile,
    ArchiveFolderTree, ArchiveFormat, ArchiveManifest, ContentStore, Document, Error, Field,
    GalleryRef, GlobalIdPrefix, GlobalIdentifier, LinkKey, LinkResolution, MediaItem,
    NfsFileSource, PermissionEvaluator, Principal, RefKind, Result, ScopeKind,
    CURRENT_ARCHIVE_VERSION, CURRENT_SCHEMA_VERSION,
};

use crate::checksum;
use crate::config::ArchiveConfig;
use crate::html;
use crate::package::{self, ArchiveTree};
use crate::selection::ExportRecordList;

/// Receives per-record progress from the writer.
pub trait ProgressSink: Send + Sync {
    /// One record unit (document with its revisions, or media item) was written.
    fn record_written(&self, record: &GlobalIdentifier);

    /// Number of record units the run expects to write, once known.
    fn records_expected(&self, _count: usize) {}

    /// The package and its checksums are on disk.
    fn packaging_finished(&self) {}
}

/// Sink that discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn record_written(&self, _record: &GlobalIdentifier) {}
}

/// Parameters of one archive.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub principal: Principal,
    pub scope: ScopeKind,
    pub format: ArchiveFormat,
    /// Export every revision instead of only the current one.
    pub include_revisions: bool,
    /// Package base name; generated from the principal and time when absent.
    pub name: Option<String>,
}

impl ArchiveRequest {
    pub fn new(principal: Principal, scope: ScopeKind) -> Self {
        Self {
            principal,
            scope,
            format: ArchiveFormat::Json,
            include_revisions: false,
            name: None,
        }
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_revisions(mut self, include: bool) -> Self {
        self.include_revisions = include;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn archive_name(&self) -> String {
        match &self.name {
            Some(name) => sanitize(name),
            None => format!(
                "{}-{}-{}",
                SOURCE_TAG,
                sanitize(&self.principal.username),
                Utc::now().format("%Y%m%d-%H%M%S%3f")
            ),
        }
    }
}

/// A finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    /// Relative paths of every file inside the archive.
    pub files: Vec<String>,
    /// Package location.
    pub path: PathBuf,
    /// Sidecar holding `archive_checksum`.
    pub checksum_path: PathBuf,
    /// BLAKE3 checksum of the package.
    pub archive_checksum: String,
    /// SHA-256 content checksum stored inside the archive.
    pub content_checksum: String,
    /// Package size in bytes.
    pub size: u64,
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Documents and media of the selection, loaded once up front.
struct LoadedSelection {
    /// Revisions per document, oldest first, current last.
    documents: Vec<Vec<Document>>,
    media: Vec<MediaItem>,
    /// Archive directory of every exported unit, by link key.
    locations: HashMap<LinkKey, String>,
}

/// Serializes an [`ExportRecordList`] into the archive layout.
///
/// Records referenced from exported fields but outside the selection are
/// described only when the requesting principal may read them.
pub struct ArchiveWriter<'a> {
    store: &'a dyn ContentStore,
    permissions: &'a dyn PermissionEvaluator,
    nfs: &'a dyn NfsFileSource,
    config: &'a ArchiveConfig,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        permissions: &'a dyn PermissionEvaluator,
        nfs: &'a dyn NfsFileSource,
        config: &'a ArchiveConfig,
    ) -> Self {
        Self {
            store,
            permissions,
            nfs,
            config,
        }
    }

    #[instrument(skip(self, list, request, progress), fields(subsystem = "export", component = "writer", op = "write", principal = %request.principal.username, record_count = list.record_count()))]
    pub async fn write(
        &self,
        list: &ExportRecordList,
        request: &ArchiveRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ArchiveResult> {
        let start = Instant::now();
        let name = request.archive_name();
        progress.records_expected(list.record_count());
        let selection = self.load(list, request.include_revisions).await?;

        let mut tree = ArchiveTree::new();
        let mut links = LinkResolution::default();
        let mut nfs_cache: HashMap<(u64, String), ArchivalNfsFile> = HashMap::new();

        self.write_forms(&selection, &mut tree).await?;

        for item in &selection.media {
            self.write_media(item, &mut tree).await?;
            progress.record_written(&item.global_id());
        }

        let mut current_docs: Vec<ArchivalDocument> = Vec::new();
        for revisions in &selection.documents {
            for (i, revision) in revisions.iter().enumerate() {
                let doc = self
                    .archival_document(
                        revision,
                        &request.principal,
                        &selection,
                        &mut links,
                        &mut nfs_cache,
                        &mut tree,
                    )
                    .await?;
                let unit = format!("{}/{}", RECORDS_DIR, doc.unit_name());
                tree.insert(format!("{}/{}", unit, DOCUMENT_FILE), to_json(&doc)?);
                if request.format == ArchiveFormat::Html {
                    tree.insert(
                        format!("{}/{}", unit, DOCUMENT_HTML_FILE),
                        html::render_document(&doc),
                    );
                }
                if i + 1 == revisions.len() {
                    current_docs.push(doc);
                }
            }
            if let Some(current) = revisions.last() {
                progress.record_written(&current.global_id());
            }
        }

        tree.insert(
            FOLDER_TREE_FILE,
            to_json(&ArchiveFolderTree {
                schema_version: CURRENT_SCHEMA_VERSION,
                folders: list.folders.clone(),
            })?,
        );
        tree.insert(LINK_RESOLUTION_FILE, to_json(&links)?);
        tree.insert(MANIFEST_FILE, self.manifest(request).render());

        if request.format == ArchiveFormat::Html {
            let docs: Vec<&ArchivalDocument> = current_docs.iter().collect();
            tree.insert("index.html", html::render_index(&name, &list.folders, &docs));
        }

        let content_checksum = checksum::content_checksum(&tree)
            .ok_or_else(|| Error::Internal("archive has no content to checksum".to_string()))?;
        tree.insert(CONTENT_CHECKSUM_FILE, format!("{}\n", content_checksum));

        let path = self.config.export_dir.join(format!("{}.tar.gz", name));
        let size = package::pack(&tree, &name, &path)?;
        let archive_checksum = checksum::package_checksum(&path)?;
        let checksum_path = checksum::write_sidecar(&path, &archive_checksum)?;
        progress.packaging_finished();

        info!(
            archive_path = %path.display(),
            size,
            files = tree.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Archive written"
        );

        Ok(ArchiveResult {
            files: tree.paths().map(str::to_string).collect(),
            path,
            checksum_path,
            archive_checksum,
            content_checksum,
            size,
        })
    }

    async fn load(&self, list: &ExportRecordList, include_revisions: bool) -> Result<LoadedSelection> {
        let mut locations = HashMap::new();

        let mut media = Vec::new();
        for gid in list.media() {
            let item = self.store.get_media(gid.id).await?;
            locations.insert(
                item.global_id().link_key(),
                format!("{}/{}", MEDIA_DIR, item.global_id()),
            );
            media.push(item);
        }

        let mut documents = Vec::new();
        for gid in list.documents() {
            let revisions = if include_revisions {
                self.store.list_revisions(gid.id).await?
            } else {
                vec![self.store.get_document(gid.id).await?]
            };
            let Some(current) = revisions.last() else {
                continue;
            };
            let unit = current.global_id().with_version(current.revision);
            locations.insert(
                current.global_id().link_key(),
                format!("{}/{}", RECORDS_DIR, unit),
            );
            documents.push(revisions);
        }

        for folder in &list.folders {
            locations.insert(folder.global_id().link_key(), FOLDER_TREE_FILE.to_string());
        }

        Ok(LoadedSelection {
            documents,
            media,
            locations,
        })
    }

    async fn write_forms(&self, selection: &LoadedSelection, tree: &mut ArchiveTree) -> Result<()> {
        let form_ids: HashSet<u64> = selection
            .documents
            .iter()
            .flatten()
            .filter_map(|d| d.form_id)
            .collect();
        let mut form_ids: Vec<u64> = form_ids.into_iter().collect();
        form_ids.sort_unstable();

        for id in form_ids {
            let form = self.store.get_form(id).await?;
            let dir = format!(
                "{}/{}",
                FORMS_DIR,
                GlobalIdentifier::new(GlobalIdPrefix::FM, form.id)
            );
            let archival = ArchivalForm {
                schema_version: CURRENT_SCHEMA_VERSION,
                id: form.id,
                name: form.name.clone(),
                version: form.version,
                owner: form.owner.clone(),
                fields: form.fields.clone(),
                icon_file: form.icon.as_ref().map(|i| i.file_name.clone()),
                created_at: form.created_at,
            };
            tree.insert(format!("{}/{}", dir, FORM_FILE), to_json(&archival)?);
            if let Some(icon) = &form.icon {
                tree.insert(format!("{}/{}", dir, icon.file_name), icon.bytes.clone());
            }
        }
        Ok(())
    }

    async fn write_media(&self, item: &MediaItem, tree: &mut ArchiveTree) -> Result<()> {
        let dir = format!("{}/{}", MEDIA_DIR, item.global_id());
        let files: Vec<_> = self
            .store
            .media_files(item.id)
            .await?
            .into_iter()
            .filter(|f| {
                let reserved = f.file_name == MEDIA_FILE || f.file_name.contains('/');
                if reserved {
                    warn!(global_id = %item.global_id(), file = %f.file_name, "Skipping media file with reserved name");
                }
                !reserved
            })
            .collect();
        let archival = ArchivalMedia {
            schema_version: CURRENT_SCHEMA_VERSION,
            global_id: item.global_id(),
            kind: item.kind,
            name: item.name.clone(),
            owner: item.owner.clone(),
            parent_folder_id: item.parent_id,
            file_name: item.file_name.clone(),
            extension: item.extension.clone(),
            content_type: item.content_type.clone(),
            size: item.size,
            description: item.description.clone(),
            version: item.version,
            created_at: item.created_at,
            modified_at: item.modified_at,
            files: files.iter().map(|f| f.file_name.clone()).collect(),
        };
        for file in files {
            tree.insert(format!("{}/{}", dir, file.file_name), file.bytes);
        }
        tree.insert(format!("{}/{}", dir, MEDIA_FILE), to_json(&archival)?);
        Ok(())
    }

    async fn archival_document(
        &self,
        doc: &Document,
        principal: &Principal,
        selection: &LoadedSelection,
        links: &mut LinkResolution,
        nfs_cache: &mut HashMap<(u64, String), ArchivalNfsFile>,
        tree: &mut ArchiveTree,
    ) -> Result<ArchivalDocument> {
        let form = match doc.form_id {
            Some(id) => {
                let form = self.store.get_form(id).await?;
                Some(ArchivalFormRef {
                    id: form.id,
                    name: form.name,
                    version: form.version,
                })
            }
            None => None,
        };

        let mut fields = Vec::with_capacity(doc.fields.len());
        for field in &doc.fields {
            fields.push(
                self.archival_field(field, principal, selection, links, nfs_cache, tree)
                    .await?,
            );
        }

        Ok(ArchivalDocument {
            schema_version: CURRENT_SCHEMA_VERSION,
            global_id: doc.global_id().with_version(doc.revision),
            name: doc.name.clone(),
            owner: doc.owner.clone(),
            parent_folder_id: doc.parent_id,
            form,
            revision: doc.revision,
            tags: doc.tags.clone(),
            created_at: doc.created_at,
            modified_at: doc.modified_at,
            fields,
        })
    }

    /// Build the field with one reference entry per distinct embedded marker.
    async fn archival_field(
        &self,
        field: &Field,
        principal: &Principal,
        selection: &LoadedSelection,
        links: &mut LinkResolution,
        nfs_cache: &mut HashMap<(u64, String), ArchivalNfsFile>,
        tree: &mut ArchiveTree,
    ) -> Result<ArchivalField> {
        let mut gallery_refs = Vec::new();
        let mut seen: HashSet<(RefKind, LinkKey, Option<String>)> = HashSet::new();

        for r in scan_refs(&field.data) {
            if !seen.insert((r.kind, r.target.link_key(), r.path.clone())) {
                continue;
            }
            let location = selection.locations.get(&r.target.link_key()).cloned();
            let entry = match r.kind {
                RefKind::Link => {
                    links.insert(&r.target, location.clone());
                    GalleryRef::Link(ArchivalLinkedRecord {
                        target: r.target,
                        name: if self.readable(principal, &r.target, selection).await? {
                            self.record_name(&r.target).await?
                        } else {
                            String::new()
                        },
                        archive_path: location,
                    })
                }
                RefKind::NfsFile => {
                    let path = r.path.clone().unwrap_or_default();
                    let file = self
                        .nfs_file(r.target.id, &path, nfs_cache, tree)
                        .await?;
                    links.insert(&r.target, file.archive_path.clone());
                    GalleryRef::NfsFile(file)
                }
                kind => {
                    links.insert(&r.target, location.clone());
                    let metadata = if self.readable(principal, &r.target, selection).await? {
                        self.gallery_metadata(&r.target, location).await?
                    } else {
                        debug!(global_id = %r.target, "Embedded gallery item is not readable");
                        ArchivalGalleryMetadata::empty(&r.target, location)
                    };
                    GalleryRef::from_media(kind, metadata)?
                }
            };
            gallery_refs.push(entry);
        }

        for workflow in &field.workflows {
            let location = selection.locations.get(&workflow.record.link_key()).cloned();
            links.insert(&workflow.record, location);
        }

        Ok(ArchivalField {
            schema_version: CURRENT_SCHEMA_VERSION,
            name: field.name.clone(),
            field_type: field.field_type,
            data: field.data.clone(),
            gallery_refs,
            workflows: field.workflows.clone(),
        })
    }

    /// Exported units were filtered by read permission during selection.
    async fn readable(
        &self,
        principal: &Principal,
        target: &GlobalIdentifier,
        selection: &LoadedSelection,
    ) -> Result<bool> {
        if selection.locations.contains_key(&target.link_key()) {
            return Ok(true);
        }
        self.permissions.can_read(principal, target).await
    }

    /// Display name of a link target; empty when it no longer exists.
    async fn record_name(&self, target: &GlobalIdentifier) -> Result<String> {
        let name = if target.prefix == GlobalIdPrefix::SD {
            match self.store.get_document(target.id).await {
                Ok(d) => d.name,
                Err(Error::RecordNotFound(_)) => String::new(),
                Err(e) => return Err(e),
            }
        } else if target.prefix.is_folder() {
            match self.store.get_folder(target.id).await {
                Ok(f) => f.name,
                Err(Error::FolderNotFound(_)) => String::new(),
                Err(e) => return Err(e),
            }
        } else if target.prefix.is_media() {
            match self.store.get_media(target.id).await {
                Ok(m) => m.name,
                Err(Error::RecordNotFound(_)) => String::new(),
                Err(e) => return Err(e),
            }
        } else {
            String::new()
        };
        Ok(name)
    }

    async fn gallery_metadata(
        &self,
        target: &GlobalIdentifier,
        archive_path: Option<String>,
    ) -> Result<ArchivalGalleryMetadata> {
        match self.store.get_media(target.id).await {
            Ok(item) => Ok(ArchivalGalleryMetadata {
                global_id: target.unversioned(),
                name: item.name,
                file_name: item.file_name,
                extension: item.extension,
                content_type: item.content_type,
                size: item.size,
                description: item.description,
                archive_path,
            }),
            Err(Error::RecordNotFound(_)) => {
                debug!(global_id = %target, "Embedded gallery item no longer exists");
                Ok(ArchivalGalleryMetadata::empty(target, None))
            }
            Err(e) => Err(e),
        }
    }

    /// Copy an NFS file into the tree once; unreachable files are recorded, never fatal.
    async fn nfs_file(
        &self,
        file_system_id: u64,
        path: &str,
        cache: &mut HashMap<(u64, String), ArchivalNfsFile>,
        tree: &mut ArchiveTree,
    ) -> Result<ArchivalNfsFile> {
        let key = (file_system_id, path.to_string());
        if let Some(file) = cache.get(&key) {
            return Ok(file.clone());
        }

        let bytes = if self.config.include_nfs && !path.is_empty() {
            match self
                .nfs
                .read(file_system_id, path, self.config.max_nfs_file_bytes)
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file_system_id, path, error = %e, "NFS read failed");
                    None
                }
            }
        } else {
            None
        };

        let file = match bytes {
            Some(bytes) => {
                let location = ArchivalNfsFile::archive_location(file_system_id, path);
                let size = bytes.len() as u64;
                tree.insert(location.clone(), bytes);
                ArchivalNfsFile {
                    file_system_id,
                    path: path.to_string(),
                    size: Some(size),
                    reachable: true,
                    archive_path: Some(location),
                }
            }
            None => ArchivalNfsFile {
                file_system_id,
                path: path.to_string(),
                size: None,
                reachable: false,
                archive_path: None,
            },
        };
        cache.insert(key, file.clone());
        Ok(file)
    }

    fn manifest(&self, request: &ArchiveRequest) -> ArchiveManifest {
        let mut manifest = ArchiveManifest::new();
        manifest.set(KEY_SOURCE, SOURCE_TAG);
        manifest.set(KEY_VERSION, CURRENT_ARCHIVE_VERSION);
        manifest.set(KEY_APPLICATION_VERSION, self.config.application_version.clone());
        manifest.set(KEY_EXPORTED_BY, request.principal.username.clone());
        manifest.set(KEY_EXPORT_SCOPE, request.scope.as_str());
        manifest.set(KEY_ARCHIVE_TYPE, request.format.as_str());
        manifest.set(KEY_CREATED, Utc::now().to_rfc3339());
        manifest.set(KEY_REVISION_HISTORY, request.include_revisions.to_string());
        manifest.set(KEY_SCHEMA_VERSION, CURRENT_SCHEMA_VERSION.to_string());
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("alice smith/../x"), "alice_smith_.._x");
        assert_eq!(sanitize("ok-name_1.2"), "ok-name_1.2");
    }

    #[test]
    fn test_generated_name_contains_user() {
        let request = ArchiveRequest::new(Principal::new("alice"), ScopeKind::User);
        let name = request.archive_name();
        assert!(name.starts_with("folio-alice-"));
    }
}
