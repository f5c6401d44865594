//! Import entry point: validate, parse, reconstruct.

use std::path::Path;

use tracing::{info, instrument, warn};

use folio_core::{ContentStore, Error, Result};

use crate::config::ArchiveConfig;
use crate::parser::ArchiveParser;
use crate::reconstruct::{FolderReusePolicy, ImportReport, Reconstructor};
use crate::validation::ArchiveValidator;
use crate::writer::{NoProgress, ProgressSink};

pub struct ArchiveImporter<'a> {
    store: &'a dyn ContentStore,
    config: &'a ArchiveConfig,
    policy: FolderReusePolicy,
}

impl<'a> ArchiveImporter<'a> {
    pub fn new(store: &'a dyn ContentStore, config: &'a ArchiveConfig) -> Self {
        Self {
            store,
            config,
            policy: FolderReusePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FolderReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Import the archive at `path` for `importing_user`.
    ///
    /// Nothing is written unless validation succeeds; a failed validation
    /// returns [`Error::Validation`] carrying the report summary.
    #[instrument(skip(self, progress), fields(subsystem = "import", component = "importer", op = "import", archive_path = %path.display()))]
    pub async fn import(
        &self,
        path: &Path,
        target_folder: Option<u64>,
        importing_user: &str,
        progress: &dyn ProgressSink,
    ) -> Result<ImportReport> {
        let validator = ArchiveValidator::new(self.config.max_archive_version.clone());
        let (report, archive) = validator.validate(path);
        let archive = match archive {
            Some(archive) if report.is_successful() => archive,
            _ => {
                warn!(summary = %report.summary(), "Archive rejected");
                return Err(Error::Validation(report.summary()));
            }
        };

        let format = archive.manifest.archive_format()?;
        if !format.is_importable() {
            return Err(Error::Validation(format!(
                "{} archives are for reading only and cannot be imported",
                format
            )));
        }

        let model = ArchiveParser::default().parse(&archive);
        progress.records_expected(model.media.len() + model.current_documents().count());
        let mut imported = Reconstructor::new(self.store)
            .with_policy(self.policy.clone())
            .with_allow_created_after_modified(self.config.allow_created_after_modified)
            .with_progress(progress)
            .reconstruct(&model, target_folder, importing_user)
            .await?;
        imported.warnings.extend(report.warnings().iter().cloned());

        info!(
            documents_created = imported.documents_created,
            media_created = imported.media_created,
            failure_count = imported.failures.len(),
            "Archive imported"
        );
        Ok(imported)
    }

    /// [`import`](Self::import) without progress reporting.
    pub async fn import_quietly(
        &self,
        path: &Path,
        target_folder: Option<u64>,
        importing_user: &str,
    ) -> Result<ImportReport> {
        self.import(path, target_folder, importing_user, &NoProgress)
            .await
    }
}
