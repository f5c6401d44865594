//! Import graph reconstruction.
//!
//! Recreates an [`ArchiveModel`] inside the target store in dependency
//! order: folders (top-down), forms, media, current document revisions,
//! older revisions, and finally a link rewrite pass once every new
//! identifier is known. A failure on one item is recorded in the
//! [`ImportReport`] and the run continues.

pub mod links;
pub mod media;
pub mod policy;
pub mod remap;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use folio_core::format::MigrationWarning;
use folio_core::{
    ArchiveFolder, ContentStore, CreateDocumentRequest, CreateFolderRequest, CreateFormRequest,
    CreateMediaRequest, Error, FolderKind, GlobalIdPrefix, GlobalIdentifier,
    HistoricalRevisionRequest, ImportOverride, ResolvedOverride, Result,
};

use crate::parser::ArchiveModel;
use crate::writer::{NoProgress, ProgressSink};

pub use links::{CreatedRevision, FieldUpdate, RewritePlan};
pub use policy::{FolderReuse, FolderReusePolicy};
pub use remap::{RemapEntry, RemapTable};

/// Which step an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Folder,
    Form,
    Media,
    Document,
    Revision,
    LinkRewrite,
}

/// A single item that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub stage: ImportStage,
    pub global_id: String,
    pub reason: String,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub folders_created: usize,
    pub folders_reused: usize,
    pub folders_skipped: usize,
    pub forms_created: usize,
    pub media_created: usize,
    pub documents_created: usize,
    pub revisions_created: usize,
    pub links_rewritten: usize,
    pub unresolved_links: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub warnings: Vec<String>,
    pub migration_warnings: Vec<MigrationWarning>,
    /// Archived identifier → new identifier.
    pub remapped: BTreeMap<String, String>,
    /// New identifier → owner recorded in the archive.
    pub original_owners: BTreeMap<String, String>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// New identifier of an archived one.
    pub fn new_id(&self, old: &GlobalIdentifier) -> Option<GlobalIdentifier> {
        self.remapped
            .get(&old.unversioned().to_string())
            .and_then(|s| GlobalIdentifier::parse(s).ok())
    }

    fn fail(&mut self, stage: ImportStage, global_id: impl ToString, error: impl ToString) {
        let failure = ItemFailure {
            stage,
            global_id: global_id.to_string(),
            reason: folio_core::first_line(&error.to_string()),
        };
        warn!(stage = ?failure.stage, global_id = %failure.global_id, reason = %failure.reason, "Item not imported");
        self.failures.push(failure);
    }
}

/// Mutable state of one run.
struct Run<'m> {
    model: &'m ArchiveModel,
    user: String,
    /// Parent for items whose archived parent was not recreated.
    fallback: u64,
    report: ImportReport,
    remap: RemapTable,
    created: Vec<CreatedRevision>,
}

impl Run<'_> {
    fn parent_or_fallback(&self, archived_parent: Option<u64>) -> u64 {
        archived_parent
            .and_then(|p| self.remap.folder(p))
            .unwrap_or(self.fallback)
    }

    fn stamp(&mut self, new: GlobalIdentifier, resolved: &ResolvedOverride) {
        if resolved.clamped {
            self.report.warnings.push(format!(
                "{}: creation time was after modification time and was clamped",
                new
            ));
        }
        self.report
            .original_owners
            .insert(new.to_string(), resolved.original_owner.clone());
    }
}

/// Recreates archived content for one importing user.
pub struct Reconstructor<'a> {
    store: &'a dyn ContentStore,
    policy: FolderReusePolicy,
    allow_created_after_modified: bool,
    progress: &'a dyn ProgressSink,
}

impl<'a> Reconstructor<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self {
            store,
            policy: FolderReusePolicy::default(),
            allow_created_after_modified: true,
            progress: &NoProgress,
        }
    }

    pub fn with_policy(mut self, policy: FolderReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_allow_created_after_modified(mut self, allow: bool) -> Self {
        self.allow_created_after_modified = allow;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Recreate `model` under `target_folder` (or the user's home folder).
    ///
    /// Errors only when the run cannot start: unknown user or unusable target.
    #[instrument(skip(self, model), fields(subsystem = "import", component = "reconstructor", op = "reconstruct", principal = %importing_user))]
    pub async fn reconstruct(
        &self,
        model: &ArchiveModel,
        target_folder: Option<u64>,
        importing_user: &str,
    ) -> Result<ImportReport> {
        let start = Instant::now();

        if !self.store.user_exists(importing_user).await? {
            return Err(Error::NotFound(format!("user {}", importing_user)));
        }
        let home = self.store.root_folder(importing_user).await?;
        if let Some(target) = target_folder {
            let folder = self
                .store
                .get_folder(target)
                .await
                .map_err(|_| Error::FolderNotFound(target))?;
            if folder.deleted {
                return Err(Error::InvalidInput(format!(
                    "target folder {} is deleted",
                    target
                )));
            }
        }

        let mut run = Run {
            model,
            user: importing_user.to_string(),
            fallback: target_folder.unwrap_or(home),
            report: ImportReport {
                failures: model
                    .failures
                    .iter()
                    .map(|f| ItemFailure {
                        stage: f.stage,
                        global_id: f.unit.clone(),
                        reason: f.reason.clone(),
                    })
                    .collect(),
                warnings: model.field_warnings.clone(),
                migration_warnings: model.warnings.clone(),
                ..Default::default()
            },
            remap: RemapTable::new(),
            created: Vec::new(),
        };

        self.import_folders(&mut run).await;
        self.import_forms(&mut run).await;
        self.import_media(&mut run).await;
        self.import_documents(&mut run).await;
        self.rewrite_links(&mut run).await;

        let mut report = run.report;
        report.remapped = run.remap.to_map();

        info!(
            folders_created = report.folders_created,
            folders_reused = report.folders_reused,
            media_created = report.media_created,
            documents_created = report.documents_created,
            revisions_created = report.revisions_created,
            links_rewritten = report.links_rewritten,
            failure_count = report.failures.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Archive reconstructed"
        );
        Ok(report)
    }

    async fn import_folders(&self, run: &mut Run<'_>) {
        let model = run.model;
        let (ordered, unreachable) = folders_top_down(&model.folders);
        for folder in unreachable {
            run.report
                .fail(ImportStage::Folder, folder.global_id(), "folder is part of a parent cycle");
        }

        for folder in ordered {
            let old = folder.global_id();
            let parent = run.parent_or_fallback(folder.parent_id);

            match self.policy.action(folder.kind) {
                FolderReuse::Skip => {
                    debug!(global_id = %old, kind = ?folder.kind, "Skipping folder");
                    run.remap.map_folder(folder.id, parent);
                    run.report.folders_skipped += 1;
                    continue;
                }
                FolderReuse::Reuse => {
                    let existing = if folder.kind == FolderKind::Root {
                        Ok(Some(run.fallback))
                    } else {
                        self.store.system_folder(&run.user, folder.kind).await
                    };
                    match existing {
                        Ok(Some(id)) => {
                            debug!(global_id = %old, reused = id, "Reusing system folder");
                            run.remap.map_folder(folder.id, id);
                            run.remap.insert(old, GlobalIdentifier::new(old.prefix, id));
                            run.report.folders_reused += 1;
                            continue;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            run.report.fail(ImportStage::Folder, old, e);
                            continue;
                        }
                    }
                }
                FolderReuse::Create => {}
            }

            match self.create_folder(folder, parent, &run.user).await {
                Ok((id, resolved)) => {
                    let new = GlobalIdentifier::new(old.prefix, id);
                    run.remap.map_folder(folder.id, id);
                    run.remap.insert(old, new);
                    run.stamp(new, &resolved);
                    run.report.folders_created += 1;
                }
                Err(e) => run.report.fail(ImportStage::Folder, old, e),
            }
        }
    }

    async fn create_folder(
        &self,
        folder: &ArchiveFolder,
        parent_id: u64,
        user: &str,
    ) -> Result<(u64, ResolvedOverride)> {
        let resolved =
            ImportOverride::for_folder(folder, self.allow_created_after_modified).resolve()?;
        let id = self
            .store
            .create_folder(CreateFolderRequest {
                parent_id,
                name: folder.name.clone(),
                kind: folder.kind,
                owner: user.to_string(),
                created_at: Some(resolved.created_at),
                modified_at: Some(resolved.modified_at),
            })
            .await?;
        Ok((id, resolved))
    }

    async fn import_forms(&self, run: &mut Run<'_>) {
        let model = run.model;
        for parsed in &model.forms {
            let form = &parsed.form;
            let old = GlobalIdentifier::new(GlobalIdPrefix::FM, form.id);
            let created = self
                .store
                .create_form(CreateFormRequest {
                    name: form.name.clone(),
                    version: form.version,
                    owner: run.user.clone(),
                    fields: form.fields.clone(),
                    icon: parsed.icon.clone(),
                })
                .await;
            match created {
                Ok(id) => {
                    run.remap.map_form(form.id, id);
                    run.remap.insert(old, GlobalIdentifier::new(GlobalIdPrefix::FM, id));
                    run.report
                        .original_owners
                        .insert(format!("FM{}", id), form.owner.clone());
                    run.report.forms_created += 1;
                }
                Err(e) => run.report.fail(ImportStage::Form, old, e),
            }
        }
    }

    async fn import_media(&self, run: &mut Run<'_>) {
        let media_root = match self.store.system_folder(&run.user, FolderKind::MediaRoot).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not look up media root");
                None
            }
        };

        let model = run.model;
        for parsed in &model.media {
            let item = &parsed.media;
            let old = item.global_id;

            let Some(chosen) = media::choose_file(&item.extension, &parsed.files) else {
                run.report.fail(ImportStage::Media, old, "media unit holds no files");
                continue;
            };
            if chosen.conflict {
                debug!(
                    global_id = %old,
                    canonical = %item.extension,
                    chosen = %chosen.file.file_name,
                    matched = chosen.matched,
                    "Resolved media file conflict"
                );
            }

            let parent = item
                .parent_folder_id
                .and_then(|p| run.remap.folder(p))
                .or(media_root)
                .unwrap_or(run.fallback);

            let resolved = match ImportOverride::for_media(item, self.allow_created_after_modified)
                .resolve()
            {
                Ok(r) => r,
                Err(e) => {
                    run.report.fail(ImportStage::Media, old, e);
                    continue;
                }
            };

            let created = self
                .store
                .create_media(CreateMediaRequest {
                    parent_id: parent,
                    kind: item.kind,
                    name: item.name.clone(),
                    owner: run.user.clone(),
                    file_name: chosen.file.file_name.clone(),
                    extension: chosen.extension.clone(),
                    content_type: item.content_type.clone(),
                    description: item.description.clone(),
                    bytes: chosen.file.bytes.clone(),
                    created_at: resolved.created_at,
                    modified_at: resolved.modified_at,
                })
                .await;
            match created {
                Ok(id) => {
                    let new = GlobalIdentifier::new(old.prefix, id);
                    run.remap.insert(old, new);
                    run.stamp(new, &resolved);
                    run.report.media_created += 1;
                    self.progress.record_written(&old);
                }
                Err(e) => run.report.fail(ImportStage::Media, old, e),
            }
        }
    }

    /// Current revisions first so older ones can attach to them.
    async fn import_documents(&self, run: &mut Run<'_>) {
        let model = run.model;

        for (index, parsed) in model.documents.iter().enumerate().filter(|(_, d)| d.current) {
            let doc = &parsed.document;
            let old = doc.global_id;
            let resolved = match ImportOverride::for_document(doc, self.allow_created_after_modified)
                .resolve()
            {
                Ok(r) => r,
                Err(e) => {
                    run.report.fail(ImportStage::Document, old, e);
                    continue;
                }
            };

            let created = self
                .store
                .create_document(CreateDocumentRequest {
                    parent_id: run.parent_or_fallback(doc.parent_folder_id),
                    name: doc.name.clone(),
                    owner: run.user.clone(),
                    form_id: doc.form.as_ref().and_then(|f| run.remap.form(f.id)),
                    fields: doc.fields.iter().map(links::to_field).collect(),
                    tags: doc.tags.clone(),
                    created_at: resolved.created_at,
                    modified_at: resolved.modified_at,
                })
                .await;
            match created {
                Ok(id) => {
                    let new = GlobalIdentifier::new(old.prefix, id);
                    run.remap.insert(old, new);
                    run.stamp(new, &resolved);
                    run.created.push(CreatedRevision {
                        index,
                        document_id: id,
                        revision: None,
                    });
                    run.report.documents_created += 1;
                    self.progress.record_written(&old);
                }
                Err(e) => run.report.fail(ImportStage::Document, old, e),
            }
        }

        for (index, parsed) in model.documents.iter().enumerate().filter(|(_, d)| !d.current) {
            let doc = &parsed.document;
            let Some(new) = run.remap.resolve(&doc.global_id) else {
                run.report.fail(
                    ImportStage::Revision,
                    doc.global_id,
                    "current revision was not imported",
                );
                continue;
            };
            let resolved = match ImportOverride::for_document(doc, self.allow_created_after_modified)
                .resolve()
            {
                Ok(r) => r,
                Err(e) => {
                    run.report.fail(ImportStage::Revision, doc.global_id, e);
                    continue;
                }
            };
            let result = self
                .store
                .add_historical_revision(
                    new.id,
                    HistoricalRevisionRequest {
                        revision: doc.revision,
                        name: doc.name.clone(),
                        fields: doc.fields.iter().map(links::to_field).collect(),
                        created_at: resolved.created_at,
                        modified_at: resolved.modified_at,
                    },
                )
                .await;
            match result {
                Ok(()) => {
                    run.stamp(new.with_version(doc.revision), &resolved);
                    run.created.push(CreatedRevision {
                        index,
                        document_id: new.id,
                        revision: Some(doc.revision),
                    });
                    run.report.revisions_created += 1;
                }
                Err(e) => run.report.fail(ImportStage::Revision, doc.global_id, e),
            }
        }
    }

    async fn rewrite_links(&self, run: &mut Run<'_>) {
        let plan = links::plan_rewrites(&run.model.documents, &run.created, &run.remap);
        debug!(
            updates = plan.updates.len(),
            unresolved = plan.unresolved.len(),
            "Link rewrite planned"
        );

        for update in plan.updates {
            let label = match update.revision {
                Some(rev) => GlobalIdentifier::document(update.document_id).with_version(rev),
                None => GlobalIdentifier::document(update.document_id),
            };
            if let Err(e) = self
                .store
                .update_fields(update.document_id, update.revision, update.fields)
                .await
            {
                run.report.fail(ImportStage::LinkRewrite, label, e);
            }
        }
        run.report.links_rewritten = plan.rewritten;

        // Targets the archive carried but that failed to import already have an item failure.
        for target in plan.unresolved {
            let exported = GlobalIdentifier::parse(&target)
                .map(|gid| run.model.links.is_exported(&gid))
                .unwrap_or(false);
            if exported {
                run.report
                    .warnings
                    .push(format!("links to {} were left unchanged, it was not imported", target));
            } else {
                run.report.unresolved_links.push(target);
            }
        }
    }
}

/// Folders ordered so every parent precedes its children, plus folders that
/// can never be reached because their parents form a cycle.
fn folders_top_down(folders: &[ArchiveFolder]) -> (Vec<&ArchiveFolder>, Vec<&ArchiveFolder>) {
    let ids: HashSet<u64> = folders.iter().map(|f| f.id).collect();
    let mut children: HashMap<u64, Vec<&ArchiveFolder>> = HashMap::new();
    let mut queue = VecDeque::new();
    for folder in folders {
        match folder.parent_id {
            Some(parent) if ids.contains(&parent) && parent != folder.id => {
                children.entry(parent).or_default().push(folder)
            }
            _ => queue.push_back(folder),
        }
    }

    let mut ordered = Vec::with_capacity(folders.len());
    let mut visited = HashSet::new();
    while let Some(folder) = queue.pop_front() {
        if !visited.insert(folder.id) {
            continue;
        }
        ordered.push(folder);
        if let Some(kids) = children.get(&folder.id) {
            queue.extend(kids.iter().copied());
        }
    }

    let unreachable = folders
        .iter()
        .filter(|f| !visited.contains(&f.id))
        .collect();
    (ordered, unreachable)
}
