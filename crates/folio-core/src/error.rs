//! Error types for folio.

use thiserror::Error;

/// Result type alias using folio's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for folio operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Folder not found
    #[error("Folder not found: {0}")]
    FolderNotFound(u64),

    /// Record (document or media item) not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// More explicit ids were submitted than a single export accepts
    #[error("Too many ids: {requested} requested, at most {max} allowed")]
    TooManyIds { requested: usize, max: usize },

    /// None of the requested ids resolved to an exportable record
    #[error("Nothing to export: {0}")]
    NothingToExport(String),

    /// Authenticated but not permitted
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A conflicting job is already running for the principal
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// Not enough free disk space to start the job
    #[error("Insufficient disk space: {available} bytes available, {required} required")]
    InsufficientDiskSpace { available: u64, required: u64 },

    /// Archive failed validation before any data was written
    #[error("Archive validation failed: {0}")]
    Validation(String),

    /// Archive contents could not be interpreted
    #[error("Archive format error: {0}")]
    Format(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job error
    #[error("Job error: {0}")]
    Job(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for job status payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) | Error::FolderNotFound(_) | Error::RecordNotFound(_) => {
                "not_found"
            }
            Error::InvalidInput(_) => "invalid_input",
            Error::TooManyIds { .. } => "too_many_ids",
            Error::NothingToExport(_) => "nothing_to_export",
            Error::Forbidden(_) => "forbidden",
            Error::TooManyRequests(_) => "too_many_requests",
            Error::InsufficientDiskSpace { .. } => "insufficient_disk_space",
            Error::Validation(_) => "validation_failed",
            Error::Format(_) => "invalid_archive",
            Error::Storage(_) => "storage_error",
            Error::Serialization(_) => "serialization_error",
            Error::Config(_) => "config_error",
            Error::Job(_) => "job_error",
            Error::Internal(_) | Error::Io(_) => "internal_error",
        }
    }

    /// Request-rejection errors are surfaced synchronously, before a job exists.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::TooManyIds { .. }
                | Error::NothingToExport(_)
                | Error::Forbidden(_)
                | Error::TooManyRequests(_)
                | Error::InsufficientDiskSpace { .. }
                | Error::Validation(_)
                | Error::Format(_)
        )
    }

    /// Whether this is an authorization-tier rejection.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::NothingToExport(_) | Error::Forbidden(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Reduce an error message to its first line for API consumers.
pub fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}
