//! Handler error types.
//!
//! Errors fall into four families that callers are expected to treat
//! differently: validation failures (reject before touching the store),
//! missing tables/rows/indexes, protocol-state violations (caller bugs), and
//! backing-store failures (surfaced unchanged, never retried here).

use std::fmt;
use thiserror::Error;

use crate::types::RowId;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// I/O error while reading configuration or similar local files.
    Io = 0x0002,

    // Validation errors (0x0100 - 0x01FF)
    /// Table id is zero or otherwise malformed.
    InvalidTableId = 0x0100,
    /// Encoded key or key field is malformed.
    InvalidKey = 0x0101,
    /// Invalid argument provided.
    InvalidArgument = 0x0102,
    /// Payload could not be (de)serialized.
    Serialization = 0x0103,
    /// Invalid configuration.
    InvalidConfig = 0x0104,
    /// Table name already in use.
    TableExists = 0x0105,
    /// Index name already in use.
    IndexExists = 0x0106,
    /// Key or unique index value already present.
    DuplicateKey = 0x0107,

    // Not-found errors (0x0200 - 0x02FF)
    /// Table not found.
    TableNotFound = 0x0200,
    /// Row identity not found.
    RowNotFound = 0x0201,
    /// Index not found.
    IndexNotFound = 0x0202,
    /// Column not declared in the table schema.
    ColumnNotFound = 0x0203,

    // Protocol errors (0x0300 - 0x03FF)
    /// Call not valid in the handle's current state.
    ProtocolState = 0x0300,
    /// Table indexes changed since the handle loaded them.
    SchemaChanged = 0x0301,

    // Store errors (0x0400 - 0x04FF)
    /// Backing store call failed.
    StoreUnavailable = 0x0400,
    /// Stored bytes are not what the engine wrote.
    Corruption = 0x0401,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Validation",
            0x02 => "NotFound",
            0x03 => "Protocol",
            0x04 => "Store",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for hexkv.
///
/// # Example
///
/// ```rust
/// use hexkv_common::error::{ErrorCode, HexError, HexResult};
///
/// fn open(name: &str) -> HexResult<()> {
///     Err(HexError::TableNotFound { table: name.to_string() })
/// }
///
/// let err = open("t1").unwrap_err();
/// assert_eq!(err.code(), ErrorCode::TableNotFound);
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, Error)]
pub enum HexError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    /// Table id is not a valid (non-zero) id.
    #[error("invalid table id {table_id}")]
    InvalidTableId {
        /// The rejected id.
        table_id: u64,
    },

    /// Encoded key or key field is malformed.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// Table already exists.
    #[error("table '{table}' already exists")]
    TableExists {
        /// The table name.
        table: String,
    },

    /// Index already exists on the table.
    #[error("index '{index}' already exists")]
    IndexExists {
        /// The index name.
        index: String,
    },

    /// Duplicate row identity or unique index value.
    #[error("duplicate key: {message}")]
    DuplicateKey {
        /// What collided.
        message: String,
    },

    // ==========================================================================
    // Not-Found Errors
    // ==========================================================================
    /// Table not found.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// The missing table.
        table: String,
    },

    /// Row identity not found.
    #[error("row {row_id} not found")]
    RowNotFound {
        /// The missing identity.
        row_id: RowId,
    },

    /// Index not found.
    #[error("index '{index}' not found")]
    IndexNotFound {
        /// The missing index.
        index: String,
    },

    /// Column not found.
    #[error("column '{column}' not found in table schema")]
    ColumnNotFound {
        /// The undeclared column.
        column: String,
    },

    // ==========================================================================
    // Protocol Errors
    // ==========================================================================
    /// Call is not valid in the handle's current state.
    #[error("protocol violation: {message}")]
    ProtocolState {
        /// Error message.
        message: String,
    },

    /// The table's indexes changed after the caller loaded them.
    #[error("schema of table #{table_id} changed")]
    SchemaChanged {
        /// The table whose schema moved on.
        table_id: u64,
    },

    // ==========================================================================
    // Store Errors
    // ==========================================================================
    /// The backing store rejected or failed a call.
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Reason reported by the store.
        reason: String,
    },

    /// Stored bytes could not be interpreted.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl HexError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Io { .. } => ErrorCode::Io,
            Self::InvalidTableId { .. } => ErrorCode::InvalidTableId,
            Self::InvalidKey { .. } => ErrorCode::InvalidKey,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::TableExists { .. } => ErrorCode::TableExists,
            Self::IndexExists { .. } => ErrorCode::IndexExists,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::RowNotFound { .. } => ErrorCode::RowNotFound,
            Self::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            Self::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            Self::ProtocolState { .. } => ErrorCode::ProtocolState,
            Self::SchemaChanged { .. } => ErrorCode::SchemaChanged,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Corruption { .. } => ErrorCode::Corruption,
        }
    }

    /// Returns true if the caller may retry the operation.
    ///
    /// hexkv never retries on its own; this only classifies the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns true for validation failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        (self.code().as_u16() >> 8) == 0x01
    }

    /// Returns true for missing tables, rows, indexes, or columns.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        (self.code().as_u16() >> 8) == 0x02
    }

    /// Returns true for protocol-state violations.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::ProtocolState { .. })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a protocol-state error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolState {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
