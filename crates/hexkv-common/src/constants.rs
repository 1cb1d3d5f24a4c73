//! System-wide constants for hexkv.

// =============================================================================
// Key and Value Limits
// =============================================================================

/// Default maximum size of an encoded store key in bytes (16 KB).
///
/// Index keys embed the indexed column values, so wide text columns are the
/// usual way to hit this limit.
pub const DEFAULT_MAX_KEY_SIZE: usize = 16 * 1024;

/// Default maximum size of a stored value in bytes (8 MB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 8 * 1024 * 1024;

/// Size of a row identity in bytes.
pub const ROW_ID_SIZE: usize = 16;

/// Maximum length of a varint-encoded unsigned integer (header + 8 bytes).
pub const MAX_ULONG_ENCODED_LEN: usize = 9;

// =============================================================================
// Handler Defaults
// =============================================================================

/// Default number of buffered key mutations before a handle commits its
/// local write batch.
pub const DEFAULT_WRITE_BUFFER_LIMIT: usize = 1024;

/// Name of the adapter used when none is configured.
pub const DEFAULT_ADAPTER: &str = "memory";

/// First auto-increment value of a freshly truncated table.
pub const AUTO_INCREMENT_START: u64 = 1;

/// First table id handed out by a new catalog. Zero is never a valid id.
pub const FIRST_TABLE_ID: u64 = 1;

/// First index id handed out within a table.
pub const FIRST_INDEX_ID: u64 = 1;
