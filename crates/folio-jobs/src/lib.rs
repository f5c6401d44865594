//! # folio-jobs
//!
//! Background export and import jobs for folio.
//!
//! This crate provides:
//! - A runner that accepts exports and imports and executes them as tokio tasks
//! - One export in flight per principal and one import per target account
//! - Work-unit progress tracking and notifications via broadcast channels
//! - Job-scoped state that is released on every exit path
//!
//! ## Example
//!
//! ```ignore
//! use folio_jobs::{ArchiveConfig, ArchiveRequest, ExportScope, JobEvent, JobRunner};
//!
//! let runner = JobRunner::new(store, permissions, nfs, ArchiveConfig::from_env())
//!     .with_config(JobConfig::from_env());
//!
//! let request = ArchiveRequest::new(principal.clone(), ScopeKind::User);
//! let job_id = runner
//!     .submit_export(ExportScope::User("alice".into()), request)
//!     .await?;
//!
//! let mut events = runner.events();
//! while let Ok(event) = events.recv().await {
//!     if let JobEvent::Progress { percent, .. } = event {
//!         println!("{}%", percent);
//!     }
//! }
//!
//! let status = runner.status(job_id).await;
//! ```

pub mod config;
pub mod progress;
pub mod runner;
pub mod status;
pub mod tracker;

// Re-export archive and core types
pub use folio_archive::*;

pub use config::JobConfig;
pub use progress::{ProgressMonitor, ProgressObserver};
pub use runner::JobRunner;
pub use status::{
    ErrorPayload, ExportResultPayload, JobEvent, JobId, JobKind, JobOutcome, JobStatusView,
};
pub use tracker::{ExportGuard, ExportJobContext, ImportGuard, JobTracker};
