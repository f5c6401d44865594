//! Structured logging field name constants for folio.
//!
//! These constants are the reference list of field names. `#[instrument]`
//! attributes and event macros take field names as identifiers, so call
//! sites spell the same names as literals.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job-fatal failure, requires operator attention |
//! | WARN  | Per-item failure or tolerated inconsistency, run continues |
//! | INFO  | Job lifecycle (submitted, started, finished), archive written/imported |
//! | DEBUG | Decision points (folder reuse, file conflict choice, rule outcome) |
//! | TRACE | Per-record iteration, per-file checksum input |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "export", "import", "jobs", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "selection", "writer", "validator", "parser", "reconstructor"
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

/// Principal (username) a job runs for.
pub const PRINCIPAL: &str = "principal";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Global identifier of the record being processed.
pub const GLOBAL_ID: &str = "global_id";

/// Archive package path.
pub const ARCHIVE_PATH: &str = "archive_path";

/// Validation rule name.
pub const RULE: &str = "rule";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records in an export selection.
pub const RECORD_COUNT: &str = "record_count";

/// Number of folders in an export selection.
pub const FOLDER_COUNT: &str = "folder_count";

/// Number of per-item failures recorded during import.
pub const FAILURE_COUNT: &str = "failure_count";

/// Progress percentage.
pub const PERCENT: &str = "percent";
