//! Parse a validated archive into an [`ArchiveModel`].

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use folio_core::defaults::{
    DOCUMENT_FILE, FOLDER_TREE_FILE, FORMS_DIR, FORM_FILE, LINK_RESOLUTION_FILE, MEDIA_DIR,
    MEDIA_FILE, RECORDS_DIR,
};
use folio_core::format::MigrationWarning;
use folio_core::{
    ArchivalDocument, ArchivalForm, ArchivalMedia, ArchiveFolder, ArchiveFolderTree,
    ArchiveFormat, ArchiveManifest, Error, FormIcon, LinkKey, LinkResolution, MigrationRegistry,
    Result, StoredFile,
};

use crate::package::ArchiveTree;
use crate::reconstruct::ImportStage;
use crate::validation::ValidatedArchive;

/// A form together with its bundled icon.
#[derive(Debug, Clone)]
pub struct ParsedForm {
    pub form: ArchivalForm,
    pub icon: Option<FormIcon>,
}

/// One document revision unit.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: ArchivalDocument,
    /// Highest revision present for this document.
    pub current: bool,
}

/// One media unit and its candidate files.
#[derive(Debug, Clone)]
pub struct ParsedMedia {
    pub media: ArchivalMedia,
    pub files: Vec<StoredFile>,
}

/// A unit that could not be read; the rest of the archive is still imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub stage: ImportStage,
    /// Unit directory name (`SD2v1`, `IM3`) or the top-level file.
    pub unit: String,
    pub reason: String,
}

/// Everything an archive holds, ready for reconstruction.
#[derive(Debug, Clone, Default)]
pub struct ArchiveModel {
    pub manifest: ArchiveManifest,
    pub folders: Vec<ArchiveFolder>,
    pub links: LinkResolution,
    pub forms: Vec<ParsedForm>,
    /// Every revision unit; ordered by identifier then revision.
    pub documents: Vec<ParsedDocument>,
    pub media: Vec<ParsedMedia>,
    pub warnings: Vec<MigrationWarning>,
    /// Fields whose embedded markers and reference list disagree.
    pub field_warnings: Vec<String>,
    pub failures: Vec<UnitFailure>,
}

impl ArchiveModel {
    pub fn format(&self) -> ArchiveFormat {
        self.manifest.archive_format().unwrap_or_default()
    }

    pub fn current_documents(&self) -> impl Iterator<Item = &ParsedDocument> {
        self.documents.iter().filter(|d| d.current)
    }
}

/// Collects what one parse produced besides the entities themselves.
#[derive(Default)]
struct Notes {
    warnings: Vec<MigrationWarning>,
    field_warnings: Vec<String>,
    failures: Vec<UnitFailure>,
}

impl Notes {
    fn fail(&mut self, stage: ImportStage, unit: &str, error: &Error) {
        let reason = folio_core::first_line(&error.to_string());
        warn!(stage = ?stage, unit, reason = %reason, "Archive unit unreadable");
        self.failures.push(UnitFailure {
            stage,
            unit: unit.to_string(),
            reason,
        });
    }
}

/// Reads entity files, upgrading older schema versions on the way.
pub struct ArchiveParser {
    registry: MigrationRegistry,
}

impl Default for ArchiveParser {
    fn default() -> Self {
        Self {
            registry: MigrationRegistry::builtin(),
        }
    }
}

impl ArchiveParser {
    pub fn new(registry: MigrationRegistry) -> Self {
        Self { registry }
    }

    /// Read every unit of a validated archive.
    ///
    /// A unit that does not deserialize is recorded in
    /// [`ArchiveModel::failures`] and left out; parsing never aborts.
    #[instrument(skip(self, archive), fields(subsystem = "import", component = "parser", op = "parse", archive_path = %archive.path.display()))]
    pub fn parse(&self, archive: &ValidatedArchive) -> ArchiveModel {
        let tree = &archive.tree;
        let mut notes = Notes::default();

        let folders = tree
            .get(FOLDER_TREE_FILE)
            .and_then(|bytes| {
                self.read_entity::<ArchiveFolderTree>(FOLDER_TREE_FILE, bytes, &mut notes.warnings)
                    .map_err(|e| notes.fail(ImportStage::Folder, FOLDER_TREE_FILE, &e))
                    .ok()
            })
            .map(|t| t.folders)
            .unwrap_or_default();
        let links = tree
            .get(LINK_RESOLUTION_FILE)
            .and_then(|bytes| {
                self.read_entity(LINK_RESOLUTION_FILE, bytes, &mut notes.warnings)
                    .map_err(|e| notes.fail(ImportStage::LinkRewrite, LINK_RESOLUTION_FILE, &e))
                    .ok()
            })
            .unwrap_or_default();

        let forms = self.parse_forms(tree, &mut notes);
        let media = self.parse_media(tree, &mut notes);
        let documents = self.parse_documents(tree, &mut notes);

        info!(
            folder_count = folders.len(),
            forms = forms.len(),
            media = media.len(),
            revisions = documents.len(),
            warnings = notes.warnings.len(),
            unreadable = notes.failures.len(),
            "Archive parsed"
        );

        ArchiveModel {
            manifest: archive.manifest.clone(),
            folders,
            links,
            forms,
            documents,
            media,
            warnings: notes.warnings,
            field_warnings: notes.field_warnings,
            failures: notes.failures,
        }
    }

    fn read_entity<T: DeserializeOwned>(
        &self,
        path: &str,
        bytes: &[u8],
        warnings: &mut Vec<MigrationWarning>,
    ) -> Result<T> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::Format(format!("{}: {}", path, e)))?;
        let upgraded = self.registry.upgrade(value)?;
        let entity = serde_json::from_value(upgraded.data)
            .map_err(|e| Error::Format(format!("{}: {}", path, e)))?;
        if !upgraded.warnings.is_empty() {
            debug!(path, warnings = upgraded.warnings.len(), "Upgraded entity schema");
        }
        warnings.extend(upgraded.warnings);
        Ok(entity)
    }

    /// Read `<dir>/<marker>`, recording a failure under the unit's name.
    fn read_unit<T: DeserializeOwned>(
        &self,
        tree: &ArchiveTree,
        dir: &str,
        marker: &str,
        stage: ImportStage,
        notes: &mut Notes,
    ) -> Option<T> {
        let path = format!("{}/{}", dir, marker);
        let unit = dir.rsplit('/').next().unwrap_or(dir);
        let result = match tree.get(&path) {
            Some(bytes) => self.read_entity(&path, bytes, &mut notes.warnings),
            None => Err(Error::Format(format!("{} is missing", path))),
        };
        result.map_err(|e| notes.fail(stage, unit, &e)).ok()
    }

    fn parse_forms(&self, tree: &ArchiveTree, notes: &mut Notes) -> Vec<ParsedForm> {
        let mut forms = Vec::new();
        for dir in unit_dirs(tree, FORMS_DIR, FORM_FILE) {
            let Some(form) =
                self.read_unit::<ArchivalForm>(tree, &dir, FORM_FILE, ImportStage::Form, notes)
            else {
                continue;
            };
            let icon = form.icon_file.as_ref().and_then(|name| {
                tree.get(&format!("{}/{}", dir, name)).map(|b| FormIcon {
                    file_name: name.clone(),
                    bytes: b.to_vec(),
                })
            });
            forms.push(ParsedForm { form, icon });
        }
        forms
    }

    fn parse_media(&self, tree: &ArchiveTree, notes: &mut Notes) -> Vec<ParsedMedia> {
        let mut units = Vec::new();
        for dir in unit_dirs(tree, MEDIA_DIR, MEDIA_FILE) {
            let Some(media) =
                self.read_unit::<ArchivalMedia>(tree, &dir, MEDIA_FILE, ImportStage::Media, notes)
            else {
                continue;
            };

            let present = tree.files_in(&dir);
            let mut files: Vec<StoredFile> = Vec::new();
            for name in &media.files {
                if let Some((_, b)) = present.iter().find(|(n, _)| *n == name.as_str()) {
                    files.push(StoredFile {
                        file_name: name.clone(),
                        bytes: b.to_vec(),
                    });
                }
            }
            for (name, b) in &present {
                if *name != MEDIA_FILE && !files.iter().any(|f| f.file_name == *name) {
                    files.push(StoredFile {
                        file_name: name.to_string(),
                        bytes: b.to_vec(),
                    });
                }
            }
            units.push(ParsedMedia { media, files });
        }
        units
    }

    /// Parse every revision unit and flag the highest revision per document.
    fn parse_documents(&self, tree: &ArchiveTree, notes: &mut Notes) -> Vec<ParsedDocument> {
        let mut documents = Vec::new();
        for dir in unit_dirs(tree, RECORDS_DIR, DOCUMENT_FILE) {
            let Some(document) = self.read_unit::<ArchivalDocument>(
                tree,
                &dir,
                DOCUMENT_FILE,
                ImportStage::Document,
                notes,
            ) else {
                continue;
            };
            notes.field_warnings.extend(field_warnings(&document));
            documents.push(document);
        }
        mark_current(documents)
    }
}

/// Marker/metadata mismatches of every field of a revision.
fn field_warnings(document: &ArchivalDocument) -> Vec<String> {
    document
        .fields
        .iter()
        .flat_map(|field| {
            field.check_consistency().into_iter().map(move |problem| {
                format!("{} field '{}': {}", document.unit_name(), field.name, problem)
            })
        })
        .collect()
}

/// Group revisions by link key; exactly the highest revision per key is current.
pub fn mark_current(mut documents: Vec<ArchivalDocument>) -> Vec<ParsedDocument> {
    documents.sort_by(|a, b| {
        a.global_id
            .link_key()
            .cmp(&b.global_id.link_key())
            .then(a.revision.cmp(&b.revision))
    });

    let mut highest: HashMap<LinkKey, usize> = HashMap::new();
    for (i, doc) in documents.iter().enumerate() {
        highest.insert(doc.global_id.link_key(), i);
    }

    documents
        .into_iter()
        .enumerate()
        .map(|(i, document)| {
            let current = highest.get(&document.global_id.link_key()) == Some(&i);
            ParsedDocument { document, current }
        })
        .collect()
}

/// Directories `<root>/<unit>` holding a `<marker>` file, sorted.
fn unit_dirs(tree: &ArchiveTree, root: &str, marker: &str) -> Vec<String> {
    let prefix = format!("{}/", root);
    let suffix = format!("/{}", marker);
    tree.paths()
        .filter(|p| p.starts_with(&prefix) && p.ends_with(&suffix))
        .map(|p| p[..p.len() - suffix.len()].to_string())
        .filter(|dir| !dir[prefix.len()..].contains('/'))
        .collect()
}
