//! Job runner configuration.

use folio_core::defaults;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Capacity of the job event broadcast channel.
    pub event_capacity: usize,
    /// Whether new jobs are accepted.
    pub enabled: bool,
    /// Check free space in the export directory before accepting an export.
    pub check_disk_space: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            event_capacity: defaults::JOB_EVENT_CAPACITY,
            enabled: true,
            check_disk_space: true,
        }
    }
}

impl JobConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FOLIO_JOBS_ENABLED` | `true` | Accept new export and import jobs |
    /// | `FOLIO_JOB_EVENT_CAPACITY` | `256` | Job event channel capacity |
    /// | `FOLIO_CHECK_DISK_SPACE` | `true` | Reject exports when the export directory is short on space |
    pub fn from_env() -> Self {
        let enabled = std::env::var("FOLIO_JOBS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let event_capacity = std::env::var("FOLIO_JOB_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_EVENT_CAPACITY)
            .max(1);

        let check_disk_space = std::env::var("FOLIO_CHECK_DISK_SPACE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            event_capacity,
            enabled,
            check_disk_space,
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Enable or disable job submission.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_disk_space_check(mut self, check: bool) -> Self {
        self.check_disk_space = check;
        self
    }
}
