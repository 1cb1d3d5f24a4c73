//! Store keys for every kind of record hexkv persists.
//!
//! # Key Layout
//!
//! Each key starts with a one-byte discriminator, so the keyspace is
//! partitioned by record kind and each kind occupies one contiguous range:
//!
//! ```text
//! 0x00  TableIdCounter                                   (singleton)
//! 0x01  TableName      [escaped name]
//! 0x02  AutoIncrement  [table id]
//! 0x03  RowCount       [table id]
//! 0x04  TableMetadata  [table id]
//! 0x05  IndexIds       [table id]
//! 0x06  DataRow        [table id][row id: 16 bytes]?
//! 0x07  IndexEntry     [table id]([index id][value]*(0xFF [row id])?)?
//! ```
//!
//! Integers use the varint codec; index values use the tagged column
//! encoding. Trailing fields may be left off to build a scan prefix: the
//! encoding of a partial key is a byte prefix of every full key that shares
//! its leading fields.
//!
//! The `0xFF` marker in index entries separates the values from the row
//! identity. It is larger than every value tag, so an entry sorts after
//! any key holding more values but the same leading ones.

use std::cmp::Ordering;
use std::fmt;

use hexkv_common::error::{HexError, HexResult};
use hexkv_common::types::{IndexId, Key, RowId, TableId};

use crate::encoding::column::{read_escaped, write_escaped, IndexValue};
use crate::encoding::var::{write_ulong, KeyReader};

/// Discriminator bytes.
pub mod prefix {
    /// Next table id to allocate.
    pub const TABLE_ID_COUNTER: u8 = 0x00;
    /// Table name to table id.
    pub const TABLE_NAME: u8 = 0x01;
    /// Auto-increment counter of a table.
    pub const AUTO_INCREMENT: u8 = 0x02;
    /// Row count of a table.
    pub const ROW_COUNT: u8 = 0x03;
    /// Serialized table schema.
    pub const TABLE_METADATA: u8 = 0x04;
    /// Index ids, next index id and schema version of a table.
    pub const INDEX_IDS: u8 = 0x05;
    /// Row contents.
    pub const DATA_ROW: u8 = 0x06;
    /// Secondary index entry.
    pub const INDEX_ENTRY: u8 = 0x07;
}

/// Separates index values from the row identity inside an index entry.
const ROW_ID_MARKER: u8 = 0xFF;

/// A decoded store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// Holds the next table id.
    TableIdCounter,
    /// Maps a table name to its id.
    TableName {
        /// Table name.
        name: String,
    },
    /// Holds a table's auto-increment counter.
    AutoIncrement {
        /// Owning table.
        table_id: TableId,
    },
    /// Holds a table's row count.
    RowCount {
        /// Owning table.
        table_id: TableId,
    },
    /// Holds a table's schema.
    TableMetadata {
        /// Owning table.
        table_id: TableId,
    },
    /// Holds a table's index ids and schema version.
    IndexIds {
        /// Owning table.
        table_id: TableId,
    },
    /// Holds one row. Without a row id, this is the prefix of all rows of
    /// the table.
    DataRow {
        /// Owning table.
        table_id: TableId,
        /// Row identity.
        row_id: Option<RowId>,
    },
    /// One secondary index entry, or a prefix of entries.
    IndexEntry {
        /// Owning table.
        table_id: TableId,
        /// Index, absent for the prefix of all of the table's entries.
        index_id: Option<IndexId>,
        /// Leading index values.
        values: Vec<IndexValue>,
        /// Owning row, absent in search prefixes.
        row_id: Option<RowId>,
    },
}

impl RowKey {
    /// Key of a table name mapping.
    pub fn table_name(name: impl Into<String>) -> Self {
        Self::TableName { name: name.into() }
    }

    /// Key of one row.
    pub fn data_row(table_id: TableId, row_id: RowId) -> Self {
        Self::DataRow {
            table_id,
            row_id: Some(row_id),
        }
    }

    /// Prefix of every row of a table.
    pub fn data_rows(table_id: TableId) -> Self {
        Self::DataRow {
            table_id,
            row_id: None,
        }
    }

    /// Key of one index entry.
    pub fn index_entry(
        table_id: TableId,
        index_id: IndexId,
        values: Vec<IndexValue>,
        row_id: RowId,
    ) -> Self {
        Self::IndexEntry {
            table_id,
            index_id: Some(index_id),
            values,
            row_id: Some(row_id),
        }
    }

    /// Prefix of the entries of one index whose leading values are `values`.
    pub fn index_prefix(table_id: TableId, index_id: IndexId, values: Vec<IndexValue>) -> Self {
        Self::IndexEntry {
            table_id,
            index_id: Some(index_id),
            values,
            row_id: None,
        }
    }

    /// Prefix of every index entry of a table.
    pub fn index_entries(table_id: TableId) -> Self {
        Self::IndexEntry {
            table_id,
            index_id: None,
            values: Vec::new(),
            row_id: None,
        }
    }

    /// Returns the discriminator byte.
    pub fn prefix(&self) -> u8 {
        match self {
            Self::TableIdCounter => prefix::TABLE_ID_COUNTER,
            Self::TableName { .. } => prefix::TABLE_NAME,
            Self::AutoIncrement { .. } => prefix::AUTO_INCREMENT,
            Self::RowCount { .. } => prefix::ROW_COUNT,
            Self::TableMetadata { .. } => prefix::TABLE_METADATA,
            Self::IndexIds { .. } => prefix::INDEX_IDS,
            Self::DataRow { .. } => prefix::DATA_ROW,
            Self::IndexEntry { .. } => prefix::INDEX_ENTRY,
        }
    }

    /// Returns the owning table, if the key has one.
    pub fn table_id(&self) -> Option<TableId> {
        match self {
            Self::TableIdCounter | Self::TableName { .. } => None,
            Self::AutoIncrement { table_id }
            | Self::RowCount { table_id }
            | Self::TableMetadata { table_id }
            | Self::IndexIds { table_id }
            | Self::DataRow { table_id, .. }
            | Self::IndexEntry { table_id, .. } => Some(*table_id),
        }
    }

    /// Returns the row identity, if the key has one.
    pub fn row_id(&self) -> Option<RowId> {
        match self {
            Self::DataRow { row_id, .. } | Self::IndexEntry { row_id, .. } => *row_id,
            _ => None,
        }
    }

    /// Returns true if trailing fields were left off.
    pub fn is_partial(&self) -> bool {
        match self {
            Self::DataRow { row_id, .. } | Self::IndexEntry { row_id, .. } => row_id.is_none(),
            _ => false,
        }
    }

    /// Checks that absent fields are only trailing ones.
    pub fn validate(&self) -> HexResult<()> {
        if let Self::IndexEntry {
            index_id: None,
            values,
            row_id,
            ..
        } = self
        {
            if !values.is_empty() || row_id.is_some() {
                return Err(HexError::invalid_key(
                    "index entry has values but no index id",
                ));
            }
        }
        Ok(())
    }

    /// Encodes the key.
    pub fn encode(&self) -> Key {
        let mut buf = vec![self.prefix()];
        match self {
            Self::TableIdCounter => {}
            Self::TableName { name } => write_escaped(name.as_bytes(), &mut buf),
            Self::AutoIncrement { table_id }
            | Self::RowCount { table_id }
            | Self::TableMetadata { table_id }
            | Self::IndexIds { table_id } => write_ulong(table_id.as_u64(), &mut buf),
            Self::DataRow { table_id, row_id } => {
                write_ulong(table_id.as_u64(), &mut buf);
                if let Some(row_id) = row_id {
                    buf.extend_from_slice(row_id.as_bytes());
                }
            }
            Self::IndexEntry {
                table_id,
                index_id,
                values,
                row_id,
            } => {
                write_ulong(table_id.as_u64(), &mut buf);
                if let Some(index_id) = index_id {
                    write_ulong(index_id.as_u64(), &mut buf);
                    for value in values {
                        value.encode_into(&mut buf);
                    }
                    if let Some(row_id) = row_id {
                        buf.push(ROW_ID_MARKER);
                        buf.extend_from_slice(row_id.as_bytes());
                    }
                }
            }
        }
        Key::from_vec(buf)
    }

    /// Decodes a key, full or partial.
    pub fn decode(bytes: &[u8]) -> HexResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let key = match reader.read_u8()? {
            prefix::TABLE_ID_COUNTER => Self::TableIdCounter,
            prefix::TABLE_NAME => {
                let name = String::from_utf8(read_escaped(&mut reader)?)
                    .map_err(|_| HexError::invalid_key("table name is not UTF-8"))?;
                Self::TableName { name }
            }
            prefix::AUTO_INCREMENT => Self::AutoIncrement {
                table_id: read_table_id(&mut reader)?,
            },
            prefix::ROW_COUNT => Self::RowCount {
                table_id: read_table_id(&mut reader)?,
            },
            prefix::TABLE_METADATA => Self::TableMetadata {
                table_id: read_table_id(&mut reader)?,
            },
            prefix::INDEX_IDS => Self::IndexIds {
                table_id: read_table_id(&mut reader)?,
            },
            prefix::DATA_ROW => {
                let table_id = read_table_id(&mut reader)?;
                let row_id = if reader.is_empty() {
                    None
                } else {
                    Some(reader.read_row_id()?)
                };
                Self::DataRow { table_id, row_id }
            }
            prefix::INDEX_ENTRY => {
                let table_id = read_table_id(&mut reader)?;
                let mut index_id = None;
                let mut values = Vec::new();
                let mut row_id = None;
                if !reader.is_empty() {
                    index_id = Some(IndexId::new(reader.read_ulong()?)?);
                    while let Some(next) = reader.peek() {
                        if next == ROW_ID_MARKER {
                            reader.read_u8()?;
                            row_id = Some(reader.read_row_id()?);
                            break;
                        }
                        values.push(IndexValue::decode_from(&mut reader)?);
                    }
                }
                Self::IndexEntry {
                    table_id,
                    index_id,
                    values,
                    row_id,
                }
            }
            other => {
                return Err(HexError::invalid_key(format!(
                    "unknown key discriminator 0x{other:02x}"
                )))
            }
        };
        reader.finish()?;
        Ok(key)
    }
}

fn read_table_id(reader: &mut KeyReader<'_>) -> HexResult<TableId> {
    TableId::new(reader.read_ulong()?)
}

/// Index entry fields after the index id, in comparison order.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum EntryComponent<'a> {
    Value(&'a IndexValue),
    Row(RowId),
}

fn entry_components<'a>(
    values: &'a [IndexValue],
    row_id: &'a Option<RowId>,
) -> impl Iterator<Item = EntryComponent<'a>> {
    values
        .iter()
        .map(EntryComponent::Value)
        .chain(row_id.iter().copied().map(EntryComponent::Row))
}

impl Ord for RowKey {
    /// Orders keys exactly as their encodings sort bytewise: by
    /// discriminator, then field by field, with a missing trailing field
    /// sorting before any present one.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::TableIdCounter, Self::TableIdCounter) => Ordering::Equal,
            (Self::TableName { name: a }, Self::TableName { name: b }) => {
                a.as_bytes().cmp(b.as_bytes())
            }
            (Self::AutoIncrement { table_id: a }, Self::AutoIncrement { table_id: b })
            | (Self::RowCount { table_id: a }, Self::RowCount { table_id: b })
            | (Self::TableMetadata { table_id: a }, Self::TableMetadata { table_id: b })
            | (Self::IndexIds { table_id: a }, Self::IndexIds { table_id: b }) => a.cmp(b),
            (
                Self::DataRow {
                    table_id: ta,
                    row_id: ra,
                },
                Self::DataRow {
                    table_id: tb,
                    row_id: rb,
                },
            ) => ta.cmp(tb).then_with(|| ra.cmp(rb)),
            (
                Self::IndexEntry {
                    table_id: ta,
                    index_id: ia,
                    values: va,
                    row_id: ra,
                },
                Self::IndexEntry {
                    table_id: tb,
                    index_id: ib,
                    values: vb,
                    row_id: rb,
                },
            ) => ta
                .cmp(tb)
                .then_with(|| ia.cmp(ib))
                .then_with(|| entry_components(va, ra).cmp(entry_components(vb, rb))),
            _ => self.prefix().cmp(&other.prefix()),
        }
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableIdCounter => write!(f, "table-id-counter"),
            Self::TableName { name } => write!(f, "table-name/{name}"),
            Self::AutoIncrement { table_id } => write!(f, "auto-increment/{table_id}"),
            Self::RowCount { table_id } => write!(f, "row-count/{table_id}"),
            Self::TableMetadata { table_id } => write!(f, "metadata/{table_id}"),
            Self::IndexIds { table_id } => write!(f, "index-ids/{table_id}"),
            Self::DataRow { table_id, row_id } => match row_id {
                Some(row_id) => write!(f, "row/{table_id}/{row_id}"),
                None => write!(f, "row/{table_id}/*"),
            },
            Self::IndexEntry {
                table_id,
                index_id,
                values,
                row_id,
            } => {
                write!(f, "index/{table_id}")?;
                if let Some(index_id) = index_id {
                    write!(f, "/{index_id}/{values:?}")?;
                }
                match row_id {
                    Some(row_id) => write!(f, "/{row_id}"),
                    None => write!(f, "/*"),
                }
            }
        }
    }
}
