//! Centralized default constants for folio.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types fall back to these when an environment variable is
//! absent or unparsable.

// =============================================================================
// EXPORT LIMITS
// =============================================================================

/// Maximum number of explicit ids accepted by a single selection export.
pub const MAX_EXPORT_IDS: usize = 2000;

/// Minimum free bytes required in the archive directory to start an export.
pub const MIN_FREE_DISK_BYTES: u64 = 64 * 1024 * 1024;

/// NFS files above this size are recorded as unreachable instead of copied.
pub const MAX_NFS_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Hours a finished export remains downloadable.
pub const ARCHIVE_EXPIRY_HOURS: i64 = 48;

// =============================================================================
// ARCHIVE LAYOUT
// =============================================================================

/// Manifest file name at the archive root.
pub const MANIFEST_FILE: &str = "manifest.txt";

/// Folder tree file name at the archive root.
pub const FOLDER_TREE_FILE: &str = "folders.json";

/// Link resolution file name at the archive root.
pub const LINK_RESOLUTION_FILE: &str = "links.json";

/// Hidden content checksum file at the archive root.
pub const CONTENT_CHECKSUM_FILE: &str = ".checksum";

/// Extension of the whole-package checksum sidecar.
pub const PACKAGE_CHECKSUM_EXTENSION: &str = "blake3";

/// Directory holding one subdirectory per exported document revision.
pub const RECORDS_DIR: &str = "records";

/// Directory holding one subdirectory per exported media item.
pub const MEDIA_DIR: &str = "media";

/// Directory holding exported forms.
pub const FORMS_DIR: &str = "forms";

/// Directory holding copied network filesystem files.
pub const NFS_DIR: &str = "nfs";

/// Serialized document file name inside a record directory.
pub const DOCUMENT_FILE: &str = "doc.json";

/// Rendered document file name inside a record directory (HTML archives).
pub const DOCUMENT_HTML_FILE: &str = "doc.html";

/// Serialized media metadata file name inside a media directory.
pub const MEDIA_FILE: &str = "media.json";

/// Serialized form file name inside a form directory.
pub const FORM_FILE: &str = "form.json";

/// Source tag written to every manifest.
pub const SOURCE_TAG: &str = "folio";

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Progress estimate headroom over the record count, in percent.
///
/// Per-record work is followed by packaging, which is not counted per record.
pub const PROGRESS_HEADROOM_PERCENT: u64 = 125;

/// Highest percentage reported before packaging has finished.
pub const PROGRESS_CEILING_BEFORE_DONE: u8 = 99;

/// Default event channel capacity for job status broadcasts.
pub const JOB_EVENT_CAPACITY: usize = 256;
