//! Export selection: resolve a scope into the records and folders to archive.

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use folio_core::{
    scan_refs, ArchiveFolder, ArchiveFormat, ContentStore, Error, FolderKind, GlobalIdPrefix,
    GlobalIdentifier, LinkKey, PermissionEvaluator, Principal, Result, ScopeKind,
};

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    /// Hand-picked records and folders.
    Selection(Vec<GlobalIdentifier>),
    /// Everything a user owns.
    User(String),
    /// Everything the members of a group own.
    Group(String),
}

impl ExportScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ExportScope::Selection(_) => ScopeKind::Selection,
            ExportScope::User(_) => ScopeKind::User,
            ExportScope::Group(_) => ScopeKind::Group,
        }
    }
}

/// Which system folders an export walks into.
///
/// The shared container holds other users' records; structured exports of
/// a whole user or group leave it out so an import does not duplicate
/// content its owners export themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFolderPolicy {
    excluded: HashSet<FolderKind>,
}

impl ExportFolderPolicy {
    pub fn for_export(format: ArchiveFormat, scope: ScopeKind) -> Self {
        let mut excluded = HashSet::new();
        if format == ArchiveFormat::Json && scope != ScopeKind::Selection {
            excluded.insert(FolderKind::Shared);
        }
        Self { excluded }
    }

    /// Policy that walks every folder.
    pub fn include_all() -> Self {
        Self {
            excluded: HashSet::new(),
        }
    }

    pub fn exclude(mut self, kind: FolderKind) -> Self {
        self.excluded.insert(kind);
        self
    }

    pub fn includes(&self, kind: FolderKind) -> bool {
        !self.excluded.contains(&kind)
    }
}

/// Records and folders chosen for one export.
#[derive(Debug, Clone, Default)]
pub struct ExportRecordList {
    /// Media items first, then documents; each appears once.
    pub record_ids: Vec<GlobalIdentifier>,
    /// Flat folder list with parent references.
    pub folders: Vec<ArchiveFolder>,
    /// Gallery items referenced from exported documents but not selected.
    pub field_attachment_ids: Vec<GlobalIdentifier>,
}

impl ExportRecordList {
    /// Folders whose parent is absent or not part of the export.
    pub fn top_level_folders(&self) -> Vec<&ArchiveFolder> {
        self.folders
            .iter()
            .filter(|f| match f.parent_id {
                None => true,
                Some(parent) => !self.contains_folder(parent),
            })
            .collect()
    }

    pub fn contains_folder(&self, id: u64) -> bool {
        self.folders.iter().any(|f| f.id == id)
    }

    pub fn contains_record(&self, gid: &GlobalIdentifier) -> bool {
        self.record_ids
            .iter()
            .chain(self.field_attachment_ids.iter())
            .any(|r| r.link_eq(gid))
    }

    /// Records written as units: selected records plus field attachments.
    pub fn record_count(&self) -> usize {
        self.record_ids.len() + self.field_attachment_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty() && self.folders.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &GlobalIdentifier> {
        self.record_ids
            .iter()
            .filter(|r| r.prefix == GlobalIdPrefix::SD)
    }

    /// Selected media followed by field attachments.
    pub fn media(&self) -> impl Iterator<Item = &GlobalIdentifier> {
        self.record_ids
            .iter()
            .filter(|r| r.prefix.is_media())
            .chain(self.field_attachment_ids.iter())
    }
}

/// Accumulates a selection while walking, keeping media ahead of documents.
#[derive(Default)]
struct Accumulator {
    media: Vec<GlobalIdentifier>,
    documents: Vec<GlobalIdentifier>,
    folders: Vec<ArchiveFolder>,
    seen: HashSet<LinkKey>,
}

impl Accumulator {
    fn add_record(&mut self, gid: GlobalIdentifier) {
        if !self.seen.insert(gid.link_key()) {
            return;
        }
        if gid.prefix.is_media() {
            self.media.push(gid.unversioned());
        } else {
            self.documents.push(gid.unversioned());
        }
    }

    fn add_folder(&mut self, folder: ArchiveFolder) -> bool {
        if !self.seen.insert(folder.global_id().link_key()) {
            return false;
        }
        self.folders.push(folder);
        true
    }
}

/// Resolves an [`ExportScope`] for a principal into an [`ExportRecordList`].
pub struct SelectionCollector<'a> {
    store: &'a dyn ContentStore,
    permissions: &'a dyn PermissionEvaluator,
    folder_policy: ExportFolderPolicy,
    max_ids: usize,
}

impl<'a> SelectionCollector<'a> {
    pub fn new(store: &'a dyn ContentStore, permissions: &'a dyn PermissionEvaluator) -> Self {
        Self {
            store,
            permissions,
            folder_policy: ExportFolderPolicy::include_all(),
            max_ids: folio_core::defaults::MAX_EXPORT_IDS,
        }
    }

    pub fn with_folder_policy(mut self, policy: ExportFolderPolicy) -> Self {
        self.folder_policy = policy;
        self
    }

    pub fn with_max_ids(mut self, max: usize) -> Self {
        self.max_ids = max;
        self
    }

    /// Reject a selection that is too large before any lookup happens.
    pub fn check_selection_size(&self, scope: &ExportScope) -> Result<()> {
        if let ExportScope::Selection(ids) = scope {
            if ids.len() > self.max_ids {
                return Err(Error::TooManyIds {
                    requested: ids.len(),
                    max: self.max_ids,
                });
            }
        }
        Ok(())
    }

    #[instrument(skip(self, scope, principal), fields(subsystem = "export", component = "selection", op = "collect", principal = %principal.username, scope = scope.kind().as_str()))]
    pub async fn collect(
        &self,
        scope: &ExportScope,
        principal: &Principal,
    ) -> Result<ExportRecordList> {
        self.check_selection_size(scope)?;

        let mut acc = Accumulator::default();
        match scope {
            ExportScope::Selection(ids) => self.collect_selection(ids, principal, &mut acc).await?,
            ExportScope::User(username) => {
                if !self.permissions.can_export_user(principal, username).await? {
                    return Err(Error::Forbidden(format!(
                        "{} may not export user {}",
                        principal.username, username
                    )));
                }
                self.collect_user(username, principal, &mut acc).await?;
            }
            ExportScope::Group(group) => {
                if !self.permissions.can_export_group(principal, group).await? {
                    return Err(Error::Forbidden(format!(
                        "{} may not export group {}",
                        principal.username, group
                    )));
                }
                for member in self.store.group_members(group).await? {
                    self.collect_user(&member, principal, &mut acc).await?;
                }
            }
        }

        let field_attachment_ids = self.collect_field_attachments(&acc, principal).await?;

        let mut record_ids = acc.media;
        record_ids.extend(acc.documents);
        let list = ExportRecordList {
            record_ids,
            folders: acc.folders,
            field_attachment_ids,
        };

        info!(
            record_count = list.record_count(),
            folder_count = list.folders.len(),
            "Export selection collected"
        );
        Ok(list)
    }

    async fn collect_selection(
        &self,
        ids: &[GlobalIdentifier],
        principal: &Principal,
        acc: &mut Accumulator,
    ) -> Result<()> {
        if ids.is_empty() {
            return Err(Error::NothingToExport("no ids were submitted".to_string()));
        }

        let mut existing = Vec::new();
        for gid in ids {
            if self.resolves(gid).await? {
                existing.push(*gid);
            } else {
                debug!(global_id = %gid, "Selected id does not resolve");
            }
        }
        if existing.is_empty() {
            return Err(Error::NothingToExport(
                "none of the submitted ids resolve to a record".to_string(),
            ));
        }

        let mut readable = 0usize;
        for gid in existing {
            if !self.permissions.can_read(principal, &gid).await? {
                debug!(global_id = %gid, "Selected id not readable");
                continue;
            }
            readable += 1;
            if gid.prefix.is_folder() {
                let folder = self.store.get_folder(gid.id).await?;
                if acc.add_folder(ArchiveFolder::from(&folder)) {
                    self.walk_folder(folder.id, principal, acc).await?;
                }
            } else {
                acc.add_record(gid);
            }
        }
        if readable == 0 {
            return Err(Error::Forbidden(
                "none of the submitted records are readable".to_string(),
            ));
        }
        Ok(())
    }

    async fn collect_user(
        &self,
        username: &str,
        principal: &Principal,
        acc: &mut Accumulator,
    ) -> Result<()> {
        if !self.store.user_exists(username).await? {
            return Err(Error::NotFound(format!("user {}", username)));
        }
        let root_id = self.store.root_folder(username).await?;
        let root = self.store.get_folder(root_id).await?;
        if acc.add_folder(ArchiveFolder::from(&root)) {
            self.walk_folder(root_id, principal, acc).await?;
        }
        Ok(())
    }

    /// Depth-first walk below `folder_id`, skipping soft-deleted children,
    /// unreadable records and folders excluded by the policy.
    async fn walk_folder(
        &self,
        folder_id: u64,
        principal: &Principal,
        acc: &mut Accumulator,
    ) -> Result<()> {
        let mut stack = vec![folder_id];
        while let Some(current) = stack.pop() {
            for child in self.store.list_children(current).await? {
                if child.deleted {
                    continue;
                }
                let gid = child.global_id;
                if !self.permissions.can_read(principal, &gid).await? {
                    continue;
                }
                if gid.prefix.is_folder() {
                    let folder = self.store.get_folder(gid.id).await?;
                    if !self.folder_policy.includes(folder.kind) {
                        debug!(global_id = %gid, kind = ?folder.kind, "Folder excluded by policy");
                        continue;
                    }
                    if acc.add_folder(ArchiveFolder::from(&folder)) {
                        stack.push(folder.id);
                    }
                } else {
                    acc.add_record(gid);
                }
            }
        }
        Ok(())
    }

    /// Gallery items embedded in exported documents that were not selected.
    async fn collect_field_attachments(
        &self,
        acc: &Accumulator,
        principal: &Principal,
    ) -> Result<Vec<GlobalIdentifier>> {
        let mut attachments = Vec::new();
        let mut seen: HashSet<LinkKey> = acc.seen.clone();

        for doc_id in &acc.documents {
            let doc = self.store.get_document(doc_id.id).await?;
            for field in &doc.fields {
                for r in scan_refs(&field.data) {
                    if !r.kind.is_gallery() || !r.target.prefix.is_media() {
                        continue;
                    }
                    if seen.contains(&r.target.link_key()) {
                        continue;
                    }
                    if !self.resolves(&r.target).await? {
                        continue;
                    }
                    if !self.permissions.can_read(principal, &r.target).await? {
                        continue;
                    }
                    seen.insert(r.target.link_key());
                    attachments.push(r.target.unversioned());
                }
            }
        }
        Ok(attachments)
    }

    /// Whether an identifier names an existing, undeleted record or folder.
    async fn resolves(&self, gid: &GlobalIdentifier) -> Result<bool> {
        let found = if gid.prefix.is_folder() {
            match self.store.get_folder(gid.id).await {
                Ok(f) => !f.deleted && f.kind.global_id_prefix() == gid.prefix,
                Err(Error::FolderNotFound(_)) => false,
                Err(e) => return Err(e),
            }
        } else if gid.prefix == GlobalIdPrefix::SD {
            match self.store.get_document(gid.id).await {
                Ok(d) => !d.deleted,
                Err(Error::RecordNotFound(_)) => false,
                Err(e) => return Err(e),
            }
        } else if gid.prefix.is_media() {
            match self.store.get_media(gid.id).await {
                Ok(m) => !m.deleted && m.kind.global_id_prefix() == gid.prefix,
                Err(Error::RecordNotFound(_)) => false,
                Err(e) => return Err(e),
            }
        } else {
            false
        };
        Ok(found)
    }
}
