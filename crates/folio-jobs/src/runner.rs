//! Spawns export and import jobs and keeps their status for polling.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use folio_archive::{
    ArchiveConfig, ArchiveImporter, ArchiveRequest, ArchiveWriter, ExportFolderPolicy,
    ExportScope, SelectionCollector,
};
use folio_core::{
    ContentStore, DiskSpaceSource, Error, NfsFileSource, PermissionEvaluator, Result,
    UnlimitedDiskSpace,
};

use crate::config::JobConfig;
use crate::progress::ProgressMonitor;
use crate::status::{
    ErrorPayload, ExportResultPayload, JobEvent, JobId, JobKind, JobOutcome, JobStatusView,
};
use crate::tracker::{ExportGuard, ImportGuard, JobTracker};

struct JobRecord {
    kind: JobKind,
    principal: String,
    progress: Arc<ProgressMonitor>,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<std::result::Result<JobOutcome, ErrorPayload>>,
}

impl JobRecord {
    fn view(&self, id: JobId) -> JobStatusView {
        let (result, import, error) = match &self.outcome {
            None => (None, None, None),
            Some(Ok(JobOutcome::Export(payload))) => (Some(payload.clone()), None, None),
            Some(Ok(JobOutcome::Import(report))) => (None, Some(report.clone()), None),
            Some(Err(payload)) => (None, None, Some(payload.clone())),
        };
        JobStatusView {
            id,
            kind: self.kind,
            principal: self.principal.clone(),
            complete: self.outcome.is_some(),
            percent: self.progress.percent(),
            submitted_at: self.submitted_at,
            finished_at: self.finished_at,
            result,
            import,
            error,
        }
    }
}

/// Runs exports and imports as background tasks against one content store.
pub struct JobRunner {
    store: Arc<dyn ContentStore>,
    permissions: Arc<dyn PermissionEvaluator>,
    nfs: Arc<dyn NfsFileSource>,
    disk: Arc<dyn DiskSpaceSource>,
    archive_config: Arc<ArchiveConfig>,
    config: JobConfig,
    tracker: JobTracker,
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ContentStore>,
        permissions: Arc<dyn PermissionEvaluator>,
        nfs: Arc<dyn NfsFileSource>,
        archive_config: ArchiveConfig,
    ) -> Self {
        let config = JobConfig::default();
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Self {
            store,
            permissions,
            nfs,
            disk: Arc::new(UnlimitedDiskSpace),
            archive_config: Arc::new(archive_config),
            config,
            tracker: JobTracker::new(),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        self.event_tx = event_tx;
        self.config = config;
        self
    }

    /// Free-space source consulted before an export is accepted.
    pub fn with_disk_space(mut self, disk: Arc<dyn DiskSpaceSource>) -> Self {
        self.disk = disk;
        self
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Get a receiver for job events.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Accept an export and start it in the background.
    ///
    /// Every request-rejection error (disk space, a running export for the
    /// same principal, permission, selection size) is returned here, before
    /// a job exists.
    #[instrument(skip(self, scope, request), fields(subsystem = "jobs", component = "runner", op = "submit_export", principal = %request.principal.username))]
    pub async fn submit_export(&self, scope: ExportScope, request: ArchiveRequest) -> Result<JobId> {
        self.ensure_enabled()?;
        self.ensure_disk_space()?;
        let principal = request.principal.clone();
        if self.tracker.is_exporting(&principal.username) {
            return Err(Error::TooManyRequests(format!(
                "an export job is already running for {}",
                principal.username
            )));
        }

        let records = SelectionCollector::new(&*self.store, &*self.permissions)
            .with_folder_policy(ExportFolderPolicy::for_export(request.format, scope.kind()))
            .with_max_ids(self.archive_config.max_export_ids)
            .collect(&scope, &principal)
            .await?;

        let job_id = Uuid::now_v7();
        let progress = Arc::new(self.monitor(job_id, records.record_count()));
        let guard =
            self.tracker
                .begin_export(job_id, principal.clone(), records, progress.clone())?;
        self.register(job_id, JobKind::Export, &principal.username, progress)
            .await;

        self.spawn(
            job_id,
            JobKind::Export,
            run_export(
                self.store.clone(),
                self.permissions.clone(),
                self.nfs.clone(),
                self.archive_config.clone(),
                guard,
                request,
            ),
        );
        Ok(job_id)
    }

    /// Accept an import of the package at `path` into `username`'s account.
    #[instrument(skip(self, path), fields(subsystem = "jobs", component = "runner", op = "submit_import", principal = %username, archive_path = %path.display()))]
    pub async fn submit_import(
        &self,
        path: PathBuf,
        target_folder: Option<u64>,
        username: &str,
    ) -> Result<JobId> {
        self.ensure_enabled()?;
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "no archive at {}",
                path.display()
            )));
        }
        if !self.store.user_exists(username).await? {
            return Err(Error::NotFound(format!("user {}", username)));
        }

        let job_id = Uuid::now_v7();
        let guard = self.tracker.begin_import(job_id, username)?;
        let progress = Arc::new(self.monitor(job_id, 0));
        self.register(job_id, JobKind::Import, username, progress.clone())
            .await;

        self.spawn(
            job_id,
            JobKind::Import,
            run_import(
                self.store.clone(),
                self.archive_config.clone(),
                guard,
                progress,
                path,
                target_folder,
                username.to_string(),
            ),
        );
        Ok(job_id)
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: JobId) -> Option<JobStatusView> {
        self.jobs.read().await.get(&job_id).map(|r| r.view(job_id))
    }

    /// Wait until a job has completed and return its final status.
    pub async fn wait(&self, job_id: JobId) -> Option<JobStatusView> {
        let mut events = self.events();
        loop {
            let view = self.status(job_id).await?;
            if view.complete {
                return Some(view);
            }
            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return self.status(job_id).await,
            }
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(Error::Job("job processing is disabled".to_string()))
        }
    }

    fn ensure_disk_space(&self) -> Result<()> {
        if !self.config.check_disk_space {
            return Ok(());
        }
        let required = self.archive_config.min_free_disk_bytes;
        let available = self.disk.available_bytes(&self.archive_config.export_dir)?;
        if available < required {
            warn!(available, required, "Export rejected, not enough disk space");
            return Err(Error::InsufficientDiskSpace {
                available,
                required,
            });
        }
        Ok(())
    }

    fn monitor(&self, job_id: JobId, expected_records: usize) -> ProgressMonitor {
        let events = self.event_tx.clone();
        ProgressMonitor::new(expected_records).with_observer(move |percent| {
            let _ = events.send(JobEvent::Progress { job_id, percent });
        })
    }

    async fn register(
        &self,
        job_id: JobId,
        kind: JobKind,
        principal: &str,
        progress: Arc<ProgressMonitor>,
    ) {
        self.jobs.write().await.insert(
            job_id,
            JobRecord {
                kind,
                principal: principal.to_string(),
                progress,
                submitted_at: Utc::now(),
                finished_at: None,
                outcome: None,
            },
        );
        debug!(job_id = %job_id, kind = %kind, "Job registered");
    }

    /// Run `work` on its own task and record how it ended.
    ///
    /// A panic inside `work` is caught and recorded as an internal error.
    /// Job-scoped state owned by `work` is dropped before the status update.
    fn spawn<F>(&self, job_id: JobId, kind: JobKind, work: F)
    where
        F: Future<Output = Result<JobOutcome>> + Send + 'static,
    {
        let jobs = self.jobs.clone();
        let events = self.event_tx.clone();
        let _ = events.send(JobEvent::Submitted { job_id, kind });
        info!(job_id = %job_id, kind = %kind, "Job started");

        tokio::spawn(async move {
            let start = Instant::now();
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => {
                    if e.is_client_error() {
                        warn!(job_id = %job_id, error = %e, "Job failed");
                    } else {
                        error!(job_id = %job_id, error = %e, "Job failed");
                    }
                    Err(ErrorPayload::from_error(&e))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(job_id = %job_id, error = %message, "Job panicked");
                    Err(ErrorPayload::internal(&message))
                }
            };

            let event = match &outcome {
                Ok(_) => JobEvent::Completed { job_id, kind },
                Err(error) => JobEvent::Failed {
                    job_id,
                    kind,
                    error: error.clone(),
                },
            };
            if let Some(record) = jobs.write().await.get_mut(&job_id) {
                if outcome.is_ok() {
                    record.progress.finish();
                }
                record.finished_at = Some(Utc::now());
                record.outcome = Some(outcome);
            }
            info!(
                job_id = %job_id,
                kind = %kind,
                duration_ms = start.elapsed().as_millis() as u64,
                "Job finished"
            );
            let _ = events.send(event);
        });
    }
}

async fn run_export(
    store: Arc<dyn ContentStore>,
    permissions: Arc<dyn PermissionEvaluator>,
    nfs: Arc<dyn NfsFileSource>,
    config: Arc<ArchiveConfig>,
    guard: ExportGuard,
    request: ArchiveRequest,
) -> Result<JobOutcome> {
    let context = guard.context();
    let archive = ArchiveWriter::new(&*store, &*permissions, &*nfs, &config)
        .write(&context.records, &request, &*context.progress)
        .await?;
    Ok(JobOutcome::Export(ExportResultPayload::from_archive(
        &archive,
        config.expiry_hours,
    )))
}

/// The guard is held until the import has returned.
async fn run_import(
    store: Arc<dyn ContentStore>,
    config: Arc<ArchiveConfig>,
    _guard: ImportGuard,
    progress: Arc<ProgressMonitor>,
    path: PathBuf,
    target_folder: Option<u64>,
    username: String,
) -> Result<JobOutcome> {
    let report = ArchiveImporter::new(&*store, &config)
        .import(&path, target_folder, &username, &*progress)
        .await?;
    Ok(JobOutcome::Import(report))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}
