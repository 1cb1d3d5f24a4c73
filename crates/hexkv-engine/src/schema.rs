//! Table, column and index schemas, and index search keys.
//!
//! Schemas are persisted by the catalog as bincode payloads and are the
//! only source of column types: they decide how each indexed column's row
//! bytes become an order-preserving [`IndexValue`].

use std::collections::BTreeMap;

use hexkv_common::error::{HexError, HexResult};
use serde::{Deserialize, Serialize};

use crate::encoding::{self, IndexValue};
use crate::row::Row;

/// Declared type of a column.
///
/// Numeric types are stored in rows as 8 big-endian bytes; every other type
/// is stored as raw bytes and indexed bytewise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    ULong,
    /// 64-bit float.
    Double,
    /// Decimal, stored in a byte-comparable form.
    Decimal,
    /// Character data.
    String,
    /// Binary data.
    Binary,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
}

impl ColumnType {
    /// Returns true for the fixed-width numeric types.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Long | Self::ULong | Self::Double)
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether the column may be absent from a row.
    pub nullable: bool,
    /// Whether the column takes its value from the table's auto-increment
    /// counter.
    pub auto_increment: bool,
    /// Maximum byte length for variable-width types.
    pub max_length: Option<u32>,
    /// Decimal precision.
    pub precision: Option<u32>,
    /// Decimal scale.
    pub scale: Option<u32>,
}

impl ColumnSchema {
    /// Creates a nullable column of the given type.
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            nullable: true,
            auto_increment: false,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    /// Marks the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the maximum byte length.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets decimal precision and scale.
    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Indexed columns, in key order.
    pub columns: Vec<String>,
    /// Whether two rows may share the same non-null values.
    pub unique: bool,
}

impl IndexSchema {
    /// Creates a non-unique index.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Creates a unique index.
    pub fn unique<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::new(columns)
        }
    }
}

/// Table definition: columns and secondary indexes by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns by name.
    pub columns: BTreeMap<String, ColumnSchema>,
    /// Secondary indexes by name.
    pub indices: BTreeMap<String, IndexSchema>,
}

impl TableSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn with_column(mut self, name: impl Into<String>, column: ColumnSchema) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Adds an index.
    pub fn with_index(mut self, name: impl Into<String>, index: IndexSchema) -> Self {
        self.indices.insert(name.into(), index);
        self
    }

    /// Looks up a column.
    pub fn column(&self, name: &str) -> HexResult<&ColumnSchema> {
        self.columns.get(name).ok_or_else(|| HexError::ColumnNotFound {
            column: name.to_string(),
        })
    }

    /// Looks up an index.
    pub fn index(&self, name: &str) -> HexResult<&IndexSchema> {
        self.indices.get(name).ok_or_else(|| HexError::IndexNotFound {
            index: name.to_string(),
        })
    }

    /// Returns the name of the auto-increment column, if any.
    pub fn auto_increment_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, c)| c.auto_increment)
            .map(|(name, _)| name.as_str())
    }

    /// Checks that the schema is internally consistent.
    pub fn validate(&self) -> HexResult<()> {
        if self.columns.is_empty() {
            return Err(HexError::invalid_argument("table has no columns"));
        }

        let auto_columns = self.columns.values().filter(|c| c.auto_increment).count();
        if auto_columns > 1 {
            return Err(HexError::invalid_argument(
                "at most one column may be auto-increment",
            ));
        }

        for (name, index) in &self.indices {
            self.validate_index(name, index)?;
        }
        Ok(())
    }

    /// Checks that an index only names declared columns.
    pub fn validate_index(&self, name: &str, index: &IndexSchema) -> HexResult<()> {
        if index.columns.is_empty() {
            return Err(HexError::invalid_argument(format!(
                "index '{name}' has no columns"
            )));
        }
        for column in &index.columns {
            self.column(column)?;
        }
        Ok(())
    }

    /// Checks a row against the column definitions.
    ///
    /// Every present column must be declared, numeric columns must hold 8
    /// bytes, and NOT NULL columns must be present unless they are
    /// auto-increment.
    pub fn validate_row(&self, row: &Row) -> HexResult<()> {
        for (name, bytes) in row.records() {
            let column = self.column(name)?;
            if column.column_type.is_numeric() && bytes.len() != 8 {
                return Err(HexError::invalid_argument(format!(
                    "column '{name}' must hold 8 bytes, got {}",
                    bytes.len()
                )));
            }
            if let Some(max) = column.max_length {
                if bytes.len() > max as usize {
                    return Err(HexError::invalid_argument(format!(
                        "column '{name}' exceeds its maximum length of {max} bytes"
                    )));
                }
            }
        }

        for (name, column) in &self.columns {
            if !column.nullable && !column.auto_increment && row.is_null(name) {
                return Err(HexError::invalid_argument(format!(
                    "column '{name}' may not be null"
                )));
            }
        }
        Ok(())
    }

    /// Returns the index values of `row` for `index`, in index column order.
    pub fn index_values(&self, index: &IndexSchema, row: &Row) -> HexResult<Vec<IndexValue>> {
        index
            .columns
            .iter()
            .map(|name| IndexValue::from_column(self.column(name)?.column_type, row.get(name)))
            .collect()
    }

    /// Returns the leading index values named by a search key.
    ///
    /// Values are taken in index column order and stop at the first column
    /// the key does not mention. An explicit `None` record searches for null.
    pub fn search_values(&self, index: &IndexSchema, key: &IndexKey) -> HexResult<Vec<IndexValue>> {
        let mut values = Vec::with_capacity(index.columns.len());
        for name in &index.columns {
            let Some(record) = key.records.get(name) else {
                break;
            };
            let column_type = self.column(name)?.column_type;
            values.push(IndexValue::from_column(column_type, record.as_deref())?);
        }
        Ok(values)
    }

    /// Serializes the schema.
    pub fn serialize(&self) -> HexResult<Vec<u8>> {
        encoding::to_bytes(self)
    }

    /// Deserializes a schema.
    pub fn deserialize(bytes: &[u8]) -> HexResult<Self> {
        encoding::from_bytes(bytes)
    }
}

/// How an index scan positions itself relative to its search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    /// Entries equal to the key.
    ExactKey,
    /// Entries at or after the key, ascending.
    KeyOrNext,
    /// Entries strictly after the key, ascending.
    AfterKey,
    /// Entries at or before the key, descending.
    KeyOrPrevious,
    /// Entries strictly before the key, descending.
    BeforeKey,
    /// The whole index, ascending.
    IndexFirst,
    /// The whole index, descending.
    IndexLast,
}

/// A serialized index scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    /// Index to scan.
    pub index_name: String,
    /// Positioning mode.
    pub query_type: QueryType,
    /// Search values by column. `None` searches for null.
    pub records: BTreeMap<String, Option<Vec<u8>>>,
}

impl IndexKey {
    /// Creates a search key with no values.
    pub fn new(index_name: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            index_name: index_name.into(),
            query_type,
            records: BTreeMap::new(),
        }
    }

    /// Adds a search value.
    pub fn with_record(mut self, column: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        self.records.insert(column.into(), value);
        self
    }

    /// Serializes the key.
    pub fn serialize(&self) -> HexResult<Vec<u8>> {
        encoding::to_bytes(self)
    }

    /// Deserializes a key.
    pub fn deserialize(bytes: &[u8]) -> HexResult<Self> {
        encoding::from_bytes(bytes)
    }
}
