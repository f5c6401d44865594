//! Job status surface and events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use folio_archive::{ArchiveResult, ImportReport};
use folio_core::{first_line, Error};

/// Identifier handed to the caller when a job is accepted.
pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Export,
    Import,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Export => "export",
            JobKind::Import => "import",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a finished export can be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportResultPayload {
    pub location: String,
    /// Package checksum, as written to the sidecar.
    pub checksum: String,
    pub size: u64,
    pub expires_at: DateTime<Utc>,
}

impl ExportResultPayload {
    pub fn from_archive(archive: &ArchiveResult, expiry_hours: i64) -> Self {
        Self {
            location: archive.path.display().to_string(),
            checksum: archive.archive_checksum.clone(),
            size: archive.size,
            expires_at: Utc::now() + chrono::Duration::hours(expiry_hours),
        }
    }
}

/// Why a job failed. The message never spans more than one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    /// Summaries of the individual steps that failed, when known.
    pub failures: Vec<String>,
}

impl ErrorPayload {
    pub fn from_error(error: &Error) -> Self {
        let failures = match error {
            Error::Validation(summary) => summary
                .split("; ")
                .map(first_line)
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        Self {
            code: error.code().to_string(),
            message: first_line(&error.to_string()),
            failures,
        }
    }

    /// Payload for a job whose task panicked.
    pub fn internal(message: &str) -> Self {
        Self {
            code: "internal_error".to_string(),
            message: first_line(message),
            failures: Vec::new(),
        }
    }
}

/// What a successfully completed job produced.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Export(ExportResultPayload),
    Import(ImportReport),
}

/// Snapshot of a job returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub kind: JobKind,
    pub principal: String,
    pub complete: bool,
    pub percent: u8,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ExportResultPayload>,
    pub import: Option<ImportReport>,
    pub error: Option<ErrorPayload>,
}

impl JobStatusView {
    pub fn is_successful(&self) -> bool {
        self.complete && self.error.is_none()
    }
}

/// Event emitted by the job runner.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A job was accepted and its task spawned.
    Submitted { job_id: JobId, kind: JobKind },
    /// The job's percentage rose.
    Progress { job_id: JobId, percent: u8 },
    /// A job completed successfully.
    Completed { job_id: JobId, kind: JobKind },
    /// A job failed.
    Failed {
        job_id: JobId,
        kind: JobKind,
        error: ErrorPayload,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Submitted { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload_first_line_only() {
        let err = Error::Internal("disk went away\n  at writer.rs:42\n  at runner.rs:7".into());
        let payload = ErrorPayload::from_error(&err);
        assert_eq!(payload.code, "internal_error");
        assert_eq!(payload.message, "Internal error: disk went away");
        assert!(payload.failures.is_empty());
    }

    #[test]
    fn test_validation_failures_are_listed() {
        let err = Error::Validation(
            "checksum_matches: content checksum differs; not_too_new: 9.0.0 > 1.1.0".into(),
        );
        let payload = ErrorPayload::from_error(&err);
        assert_eq!(payload.code, "validation_failed");
        assert_eq!(
            payload.failures,
            vec![
                "checksum_matches: content checksum differs".to_string(),
                "not_too_new: 9.0.0 > 1.1.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_job_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobKind::Export).unwrap(), "\"export\"");
    }
}
