//! Shared fixtures for folio-archive integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use folio_archive::{
    ArchiveConfig, ArchiveImporter, ArchiveRequest, ArchiveResult, ArchiveWriter, ExportScope,
    ImportReport, NoProgress, SelectionCollector,
};
use folio_core::{Principal, Result};
use folio_store::{MemoryNfs, MemoryPermissions, MemoryStore};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A source store to export from and a target store to import into.
///
/// Target ids start at 501 so remapped ids never collide with source ids.
pub struct Fixture {
    pub source: Arc<MemoryStore>,
    pub target: Arc<MemoryStore>,
    pub permissions: MemoryPermissions,
    pub nfs: MemoryNfs,
    pub config: ArchiveConfig,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("create temp dir");
        let source = Arc::new(MemoryStore::new());
        let target = Arc::new(MemoryStore::with_id_offset(500));
        Self {
            permissions: MemoryPermissions::new(source.clone()),
            source,
            target,
            nfs: MemoryNfs::new(),
            config: ArchiveConfig::default().with_export_dir(dir.path()),
            dir,
        }
    }

    pub fn with_config(mut self, f: impl FnOnce(ArchiveConfig) -> ArchiveConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub async fn export(&self, scope: ExportScope, principal: &Principal) -> Result<ArchiveResult> {
        let request = ArchiveRequest::new(principal.clone(), scope.kind());
        self.export_with(scope, principal, request).await
    }

    pub async fn export_with(
        &self,
        scope: ExportScope,
        principal: &Principal,
        request: ArchiveRequest,
    ) -> Result<ArchiveResult> {
        let list = SelectionCollector::new(&*self.source, &self.permissions)
            .collect(&scope, principal)
            .await?;
        ArchiveWriter::new(&*self.source, &self.permissions, &self.nfs, &self.config)
            .write(&list, &request, &NoProgress)
            .await
    }

    pub async fn import(
        &self,
        path: &Path,
        target_folder: Option<u64>,
        user: &str,
    ) -> Result<ImportReport> {
        ArchiveImporter::new(&*self.target, &self.config)
            .import_quietly(path, target_folder, user)
            .await
    }
}
