// Test: background export and import jobs
//
// Request rejection before a job exists, one export per principal,
// progress reporting, failure payloads and cleanup of job-scoped state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use folio_jobs::checksum;
use folio_jobs::{
    ArchiveConfig, ArchiveRequest, Error, ExportScope, Field, FolderKind, GlobalIdPrefix,
    GlobalIdentifier, JobConfig, JobEvent, JobId, JobKind, JobRunner, NfsFileSource, Principal,
    ScopeKind,
};
use folio_store::{FixedDiskSpace, MemoryNfs, MemoryPermissions, MemoryStore};
use tempfile::TempDir;
use tokio::sync::Notify;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// NFS source whose reads wait until the gate is opened.
struct GatedNfs {
    inner: MemoryNfs,
    gate: Arc<Notify>,
}

#[async_trait]
impl NfsFileSource for GatedNfs {
    async fn read(
        &self,
        file_system_id: u64,
        path: &str,
        max_bytes: u64,
    ) -> folio_jobs::Result<Option<Vec<u8>>> {
        self.gate.notified().await;
        self.inner.read(file_system_id, path, max_bytes).await
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    runner: JobRunner,
    gate: Arc<Notify>,
    dir: TempDir,
}

async fn harness(export_dir: Option<&Path>) -> Harness {
    init_tracing();
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(Notify::new());
    let nfs = MemoryNfs::new();
    nfs.put(3, "/lab/run.csv", b"t,v\n".to_vec()).await;

    let home = store.add_user("alice").await;
    let folder = store.add_folder(home.root, "Runs", FolderKind::Normal, "alice").await;
    let data = folio_jobs::render_nfs_ref(
        &GlobalIdentifier::new(GlobalIdPrefix::NF, 3),
        "/lab/run.csv",
        "run",
    );
    store
        .add_document(folder, "Run log", "alice", None, vec![Field::text("Data", data)])
        .await;

    let config = ArchiveConfig::default()
        .with_export_dir(export_dir.map(Path::to_path_buf).unwrap_or_else(|| dir.path().to_path_buf()));
    let runner = JobRunner::new(
        store.clone(),
        Arc::new(MemoryPermissions::new(store.clone())),
        Arc::new(GatedNfs {
            inner: nfs,
            gate: gate.clone(),
        }),
        config,
    );
    Harness {
        store,
        runner,
        gate,
        dir,
    }
}

fn alice_export() -> (ExportScope, ArchiveRequest) {
    (
        ExportScope::User("alice".into()),
        ArchiveRequest::new(Principal::new("alice"), ScopeKind::User),
    )
}

async fn submit(h: &Harness) -> folio_jobs::Result<JobId> {
    let (scope, request) = alice_export();
    h.runner.submit_export(scope, request).await
}

#[tokio::test]
async fn test_export_job_completes_with_result() -> anyhow::Result<()> {
    let h = harness(None).await;
    h.gate.notify_one();

    let job_id = submit(&h).await?;
    let view = h.runner.wait(job_id).await.unwrap();

    assert!(view.is_successful(), "error: {:?}", view.error);
    assert_eq!(view.kind, JobKind::Export);
    assert_eq!(view.principal, "alice");
    assert_eq!(view.percent, 100);
    assert!(view.finished_at.is_some());

    let result = view.result.unwrap();
    let package = Path::new(&result.location);
    assert!(package.exists());
    assert!(result.location.ends_with(".tar.gz"));
    assert!(result.size > 0);
    assert_eq!(checksum::read_sidecar(package)?, Some(result.checksum.clone()));
    assert!(result.expires_at > view.submitted_at);

    assert_eq!(h.runner.tracker().active_exports(), 0);
    Ok(())
}

#[tokio::test]
async fn test_second_concurrent_export_is_rejected() -> anyhow::Result<()> {
    let h = harness(None).await;

    let first = submit(&h).await?;
    let err = submit(&h).await.unwrap_err();
    assert!(matches!(err, Error::TooManyRequests(_)));
    assert!(err.is_client_error());
    assert_eq!(h.runner.tracker().active_exports(), 1);

    let running = h.runner.status(first).await.unwrap();
    assert!(!running.complete);
    assert!(running.percent < 100);

    h.gate.notify_one();
    assert!(h.runner.wait(first).await.unwrap().is_successful());
    assert!(!h.runner.tracker().is_exporting("alice"));

    h.gate.notify_one();
    let third = submit(&h).await?;
    assert!(h.runner.wait(third).await.unwrap().is_successful());
    Ok(())
}

#[tokio::test]
async fn test_other_principal_may_export_meanwhile() -> anyhow::Result<()> {
    let h = harness(None).await;
    h.store.add_user("bob").await;

    let alice = submit(&h).await?;
    let bob = h
        .runner
        .submit_export(
            ExportScope::User("bob".into()),
            ArchiveRequest::new(Principal::new("bob"), ScopeKind::User),
        )
        .await;
    assert!(!matches!(bob, Err(Error::TooManyRequests(_))));

    h.gate.notify_one();
    assert!(h.runner.wait(alice).await.unwrap().is_successful());
    Ok(())
}

#[tokio::test]
async fn test_insufficient_disk_space_rejects_before_job() -> anyhow::Result<()> {
    let mut h = harness(None).await;
    let disk = Arc::new(FixedDiskSpace::new(1024));
    h.runner = h.runner.with_disk_space(disk.clone());

    let err = submit(&h).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientDiskSpace { available: 1024, .. }));
    assert_eq!(err.code(), "insufficient_disk_space");
    assert_eq!(h.runner.tracker().active_exports(), 0);

    disk.set(u64::MAX);
    h.gate.notify_one();
    let job_id = submit(&h).await?;
    assert!(h.runner.wait(job_id).await.unwrap().is_successful());

    h.runner = h
        .runner
        .with_config(JobConfig::default().with_disk_space_check(false));
    disk.set(0);
    h.gate.notify_one();
    let job_id = submit(&h).await?;
    assert!(h.runner.wait(job_id).await.unwrap().is_successful());
    Ok(())
}

#[tokio::test]
async fn test_selection_errors_are_synchronous() -> anyhow::Result<()> {
    let h = harness(None).await;

    let too_many: Vec<GlobalIdentifier> = (1..=2001).map(GlobalIdentifier::document).collect();
    let err = h
        .runner
        .submit_export(
            ExportScope::Selection(too_many),
            ArchiveRequest::new(Principal::new("alice"), ScopeKind::Selection),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TooManyIds { requested: 2001, max: 2000 }));

    h.store.add_user("mallory").await;
    let err = h
        .runner
        .submit_export(
            ExportScope::User("alice".into()),
            ArchiveRequest::new(Principal::new("mallory"), ScopeKind::User),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    assert_eq!(h.runner.tracker().active_exports(), 0);
    Ok(())
}

#[tokio::test]
async fn test_internal_failure_is_reported_on_one_line() -> anyhow::Result<()> {
    let blocker = tempfile::NamedTempFile::new()?;
    let h = harness(Some(blocker.path())).await;
    h.gate.notify_one();

    let job_id = submit(&h).await?;
    let view = h.runner.wait(job_id).await.unwrap();
    assert!(view.complete);
    assert!(!view.is_successful());
    assert!(view.result.is_none());
    assert!(view.percent < 100);

    let error = view.error.unwrap();
    assert_eq!(error.code, "internal_error");
    assert!(!error.message.contains('\n'));
    assert!(!h.runner.tracker().is_exporting("alice"));
    Ok(())
}

#[tokio::test]
async fn test_progress_events_rise_to_completion() -> anyhow::Result<()> {
    let h = harness(None).await;
    h.gate.notify_one();
    let mut events = h.runner.events();

    let job_id = submit(&h).await?;
    h.runner.wait(job_id).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.job_id() == job_id {
            seen.push(event);
        }
    }
    assert!(matches!(seen.first(), Some(JobEvent::Submitted { kind: JobKind::Export, .. })));
    assert!(matches!(seen.last(), Some(JobEvent::Completed { kind: JobKind::Export, .. })));

    let percents: Vec<u8> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.iter().rev().skip(1).all(|p| *p < 100));
    Ok(())
}

#[tokio::test]
async fn test_import_job_round_trip() -> anyhow::Result<()> {
    let source = harness(None).await;
    source.gate.notify_one();
    let export = submit(&source).await?;
    let location = source.runner.wait(export).await.unwrap().result.unwrap().location;

    let target = harness(None).await;
    target.store.add_user("bob").await;
    let job_id = target
        .runner
        .submit_import(location.into(), None, "bob")
        .await?;
    let view = target.runner.wait(job_id).await.unwrap();

    assert!(view.is_successful(), "error: {:?}", view.error);
    assert_eq!(view.kind, JobKind::Import);
    assert_eq!(view.percent, 100);
    let report = view.import.unwrap();
    assert_eq!(report.documents_created, 1);
    assert!(report.is_clean());
    assert!(!target.runner.tracker().is_importing("bob"));
    Ok(())
}

#[tokio::test]
async fn test_import_rejections_and_validation_failure() -> anyhow::Result<()> {
    let h = harness(None).await;
    let bogus = h.dir.path().join("bogus.tar.gz");
    std::fs::write(&bogus, b"not an archive")?;

    let err = h
        .runner
        .submit_import(h.dir.path().join("missing.tar.gz"), None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = h
        .runner
        .submit_import(bogus.clone(), None, "nobody")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");

    let job_id = h.runner.submit_import(bogus, None, "alice").await?;
    let view = h.runner.wait(job_id).await.unwrap();
    let error = view.error.unwrap();
    assert_eq!(error.code, "validation_failed");
    assert!(error.failures.iter().any(|f| f.starts_with("valid_package")));
    assert_eq!(h.runner.tracker().active_imports(), 0);
    Ok(())
}

#[tokio::test]
async fn test_disabled_runner_accepts_nothing() -> anyhow::Result<()> {
    let mut h = harness(None).await;
    h.runner = h.runner.with_config(JobConfig::default().with_enabled(false));
    let err = submit(&h).await.unwrap_err();
    assert_eq!(err.code(), "job_error");
    Ok(())
}
