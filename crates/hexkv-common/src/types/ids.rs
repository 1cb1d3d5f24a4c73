//! Identifier types for hexkv.
//!
//! These types provide type-safe wrappers around the identifiers that end up
//! inside encoded store keys, preventing a table id from being passed where
//! an index id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::ROW_ID_SIZE;
use crate::error::{HexError, HexResult};

/// Table identifier.
///
/// Table ids are allocated by the catalog and are always non-zero; zero is
/// rejected at construction so an uninitialised id can never reach a key.
///
/// # Example
///
/// ```rust
/// use hexkv_common::types::TableId;
///
/// let table = TableId::new(42).unwrap();
/// assert_eq!(table.as_u64(), 42);
/// assert!(TableId::new(0).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableId(u64);

impl TableId {
    /// Creates a table id, rejecting zero.
    pub fn new(id: u64) -> HexResult<Self> {
        if id == 0 {
            return Err(HexError::InvalidTableId { table_id: id });
        }
        Ok(Self(id))
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next table id, or an error once the id space is used up.
    pub fn next(self) -> HexResult<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| HexError::invalid_argument("table id space exhausted"))
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for TableId {
    type Error = HexError;

    fn try_from(id: u64) -> HexResult<Self> {
        Self::new(id)
    }
}

impl From<TableId> for u64 {
    #[inline]
    fn from(id: TableId) -> Self {
        id.0
    }
}

/// Secondary index identifier, unique within one table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct IndexId(u64);

impl IndexId {
    /// Creates an index id, rejecting zero.
    pub fn new(id: u64) -> HexResult<Self> {
        if id == 0 {
            return Err(HexError::InvalidKey {
                message: "index id must be non-zero".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next index id, or an error once the id space is used up.
    pub fn next(self) -> HexResult<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| HexError::invalid_argument("index id space exhausted"))
    }
}

impl fmt::Debug for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexId({})", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row identity: a 16-byte globally unique identifier.
///
/// Identities carry no ordering semantics beyond byte-lexicographic
/// tie-breaking. The nil identity (all zero bytes) means "not yet assigned".
///
/// # Example
///
/// ```rust
/// use hexkv_common::types::RowId;
///
/// let id = RowId::generate();
/// let bytes = id.to_bytes();
/// assert_eq!(RowId::from_slice(&bytes).unwrap(), id);
/// assert!(RowId::NIL.is_nil());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RowId(Uuid);

impl RowId {
    /// The unassigned identity.
    pub const NIL: Self = Self(Uuid::nil());

    /// Generates a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identity from its 16 raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ROW_ID_SIZE]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creates an identity from a slice, which must be exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> HexResult<Self> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|_| HexError::InvalidKey {
                message: format!(
                    "row identity must be {ROW_ID_SIZE} bytes, got {}",
                    bytes.len()
                ),
            })
    }

    /// Returns the 16 raw bytes.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; ROW_ID_SIZE] {
        *self.0.as_bytes()
    }

    /// Returns the raw bytes by reference.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ROW_ID_SIZE] {
        self.0.as_bytes()
    }

    /// Checks whether this is the unassigned identity.
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0.simple())
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<Uuid> for RowId {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
