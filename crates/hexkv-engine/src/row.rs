//! Row representation.
//!
//! A row maps column names to opaque column bytes. A column that is absent
//! from the map is null. Rows cross the handler boundary as bincode bytes.

use std::collections::BTreeMap;
use std::fmt;

use hexkv_common::error::HexResult;
use hexkv_common::types::RowId;
use serde::{Deserialize, Serialize};

use crate::encoding;

/// A single relational row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Column values by name.
    records: BTreeMap<String, Vec<u8>>,
    /// Row identity.
    row_id: RowId,
}

impl Row {
    /// Creates an empty row with the given identity.
    ///
    /// Pass [`RowId::NIL`] to let the handler assign one on insert.
    pub fn new(row_id: RowId) -> Self {
        Self {
            records: BTreeMap::new(),
            row_id,
        }
    }

    /// Creates a row from its records.
    pub fn from_records(row_id: RowId, records: BTreeMap<String, Vec<u8>>) -> Self {
        Self { records, row_id }
    }

    /// Adds a column value.
    pub fn with_record(mut self, column: impl Into<String>, value: Vec<u8>) -> Self {
        self.records.insert(column.into(), value);
        self
    }

    /// Returns the row identity.
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Replaces a nil identity. Assigned identities never change.
    pub(crate) fn assign_row_id(&mut self, row_id: RowId) {
        if self.row_id.is_nil() {
            self.row_id = row_id;
        }
    }

    /// Returns the bytes of a column, or `None` if it is null.
    pub fn get(&self, column: &str) -> Option<&[u8]> {
        self.records.get(column).map(Vec::as_slice)
    }

    /// Sets a column value.
    pub fn set(&mut self, column: impl Into<String>, value: Vec<u8>) {
        self.records.insert(column.into(), value);
    }

    /// Makes a column null, returning its previous bytes.
    pub fn remove(&mut self, column: &str) -> Option<Vec<u8>> {
        self.records.remove(column)
    }

    /// Returns true if the column is null.
    pub fn is_null(&self, column: &str) -> bool {
        !self.records.contains_key(column)
    }

    /// Returns all non-null columns.
    pub fn records(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.records
    }

    /// Number of non-null columns.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if every column is null.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes the row.
    pub fn serialize(&self) -> HexResult<Vec<u8>> {
        encoding::to_bytes(self)
    }

    /// Deserializes a row.
    pub fn deserialize(bytes: &[u8]) -> HexResult<Self> {
        encoding::from_bytes(bytes)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.row_id)?;
        for (i, (name, value)) in self.records.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={} bytes", value.len())?;
        }
        write!(f, ")")
    }
}
