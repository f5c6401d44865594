//! Job-scoped state for exports and imports in flight.
//!
//! Each export owns an [`ExportJobContext`] holding its record list and
//! progress. The context is registered by [`JobTracker::begin_export`] and
//! removed when the returned [`ExportGuard`] is dropped, so every exit path
//! of a job, including a panic, releases the principal's export slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use folio_archive::ExportRecordList;
use folio_core::{Error, Principal, Result};

use crate::progress::ProgressMonitor;
use crate::status::JobId;

/// State of one export job.
#[derive(Debug)]
pub struct ExportJobContext {
    pub job_id: JobId,
    pub principal: Principal,
    pub records: ExportRecordList,
    pub progress: Arc<ProgressMonitor>,
}

#[derive(Debug, Default)]
struct TrackerState {
    exports: HashMap<JobId, Arc<ExportJobContext>>,
    /// Target user → import job.
    imports: HashMap<String, JobId>,
}

/// Registry of running jobs, shared between request handling and job tasks.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `username` has an export in flight.
    pub fn is_exporting(&self, username: &str) -> bool {
        self.lock()
            .exports
            .values()
            .any(|c| c.principal.username == username)
    }

    /// Register an export for `principal`.
    ///
    /// Fails with [`Error::TooManyRequests`] if the principal already has one.
    pub fn begin_export(
        &self,
        job_id: JobId,
        principal: Principal,
        records: ExportRecordList,
        progress: Arc<ProgressMonitor>,
    ) -> Result<ExportGuard> {
        let mut state = self.lock();
        if state
            .exports
            .values()
            .any(|c| c.principal.username == principal.username)
        {
            return Err(Error::TooManyRequests(format!(
                "an export job is already running for {}",
                principal.username
            )));
        }
        let context = Arc::new(ExportJobContext {
            job_id,
            principal,
            records,
            progress,
        });
        state.exports.insert(job_id, context.clone());
        debug!(job_id = %job_id, "Export context registered");
        Ok(ExportGuard {
            tracker: self.clone(),
            context,
        })
    }

    /// Context of a running export.
    pub fn export(&self, job_id: &JobId) -> Option<Arc<ExportJobContext>> {
        self.lock().exports.get(job_id).cloned()
    }

    pub fn active_exports(&self) -> usize {
        self.lock().exports.len()
    }

    /// Whether an import into `username`'s account is in flight.
    pub fn is_importing(&self, username: &str) -> bool {
        self.lock().imports.contains_key(username)
    }

    /// Register an import into `username`'s account.
    ///
    /// Imports into the same account are not safe to interleave, so a second
    /// one fails with [`Error::TooManyRequests`].
    pub fn begin_import(&self, job_id: JobId, username: &str) -> Result<ImportGuard> {
        let mut state = self.lock();
        if state.imports.contains_key(username) {
            return Err(Error::TooManyRequests(format!(
                "an import job is already running for {}",
                username
            )));
        }
        state.imports.insert(username.to_string(), job_id);
        debug!(job_id = %job_id, "Import registered");
        Ok(ImportGuard {
            tracker: self.clone(),
            username: username.to_string(),
            job_id,
        })
    }

    pub fn active_imports(&self) -> usize {
        self.lock().imports.len()
    }
}

/// Keeps an export registered; dropping it removes the context.
#[derive(Debug)]
pub struct ExportGuard {
    tracker: JobTracker,
    context: Arc<ExportJobContext>,
}

impl ExportGuard {
    pub fn context(&self) -> &ExportJobContext {
        &self.context
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.tracker.lock().exports.remove(&self.context.job_id);
        debug!(job_id = %self.context.job_id, "Export context removed");
    }
}

/// Keeps an import registered; dropping it releases the target account.
#[derive(Debug)]
pub struct ImportGuard {
    tracker: JobTracker,
    username: String,
    job_id: JobId,
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.lock();
        if state.imports.get(&self.username) == Some(&self.job_id) {
            state.imports.remove(&self.username);
        }
        debug!(job_id = %self.job_id, "Import released");
    }
}
