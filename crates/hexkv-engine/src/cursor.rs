//! Scan cursors.
//!
//! A cursor owns the store scanner for one table or index scan. The scanner
//! is released when the cursor is dropped, whichever way the scan ends.

use hexkv_common::error::{HexError, HexResult};
use hexkv_common::types::{IndexId, Key, RowId, TableId};
use hexkv_store::{Direction, KeyRange, KvStore, StoreEntry, StoreScanner};
use tracing::{debug, warn};

use crate::catalog::TableInfo;
use crate::encoding::IndexValue;
use crate::row::Row;
use crate::rowkey::RowKey;
use crate::schema::{IndexKey, IndexSchema, QueryType};

/// What a cursor iterates over.
#[derive(Debug, Clone)]
pub enum ScanTarget {
    /// Every data row of a table, in row identity order.
    Table,
    /// Entries of one secondary index.
    Index {
        /// Index name.
        name: String,
        /// Index id.
        index_id: IndexId,
        /// Index definition, used to detect entries that no longer match
        /// their row.
        schema: IndexSchema,
    },
}

/// Computes the key range and direction of an index scan.
///
/// `search` holds the encoded leading values of the search key. With `P`
/// the index prefix and `K` the search prefix:
///
/// | query type      | start     | stop (exclusive) | direction |
/// |-----------------|-----------|------------------|-----------|
/// | `ExactKey`      | K         | succ(K)          | forward   |
/// | `KeyOrNext`     | K         | succ(P)          | forward   |
/// | `AfterKey`      | succ(K)   | succ(P)          | forward   |
/// | `KeyOrPrevious` | P         | succ(K)          | backward  |
/// | `BeforeKey`     | P         | K                | backward  |
/// | `IndexFirst`    | P         | succ(P)          | forward   |
/// | `IndexLast`     | P         | succ(P)          | backward  |
pub fn index_bounds(
    table_id: TableId,
    index_id: IndexId,
    search: Vec<IndexValue>,
    query_type: QueryType,
) -> (KeyRange, Direction) {
    let p = RowKey::index_prefix(table_id, index_id, Vec::new()).encode();
    let k = RowKey::index_prefix(table_id, index_id, search).encode();
    let succ_p = p.prefix_successor();
    let succ_k = k.prefix_successor();

    match query_type {
        QueryType::ExactKey => (KeyRange::half_open(k, succ_k), Direction::Forward),
        QueryType::KeyOrNext => (KeyRange::half_open(k, succ_p), Direction::Forward),
        QueryType::AfterKey => match succ_k {
            Some(start) => (KeyRange::half_open(start, succ_p), Direction::Forward),
            // Nothing sorts after an all-0xFF prefix.
            None => (KeyRange::new(k.clone(), k), Direction::Forward),
        },
        QueryType::KeyOrPrevious => (KeyRange::half_open(p, succ_k), Direction::Backward),
        QueryType::BeforeKey => (KeyRange::new(p, k), Direction::Backward),
        QueryType::IndexFirst => (KeyRange::half_open(p, succ_p), Direction::Forward),
        QueryType::IndexLast => (KeyRange::half_open(p, succ_p), Direction::Backward),
    }
}

/// A live scan over one table.
pub struct ScanCursor {
    table_id: TableId,
    target: ScanTarget,
    range: KeyRange,
    direction: Direction,
    entries: StoreScanner,
    exhausted: bool,
    rows_returned: u64,
    stale_skipped: u64,
}

impl ScanCursor {
    /// Opens a scan over all rows of a table.
    pub fn table(store: &dyn KvStore, info: &TableInfo) -> HexResult<Self> {
        let range = KeyRange::prefix(RowKey::data_rows(info.table_id).encode());
        Self::open(store, info.table_id, ScanTarget::Table, range, Direction::Forward)
    }

    /// Opens a scan over an index, positioned by a search key.
    pub fn index(store: &dyn KvStore, info: &TableInfo, key: &IndexKey) -> HexResult<Self> {
        let (index_id, schema) = info.index(&key.index_name)?;
        let search = info.schema.search_values(schema, key)?;
        let (range, direction) = index_bounds(info.table_id, index_id, search, key.query_type);
        let target = ScanTarget::Index {
            name: key.index_name.clone(),
            index_id,
            schema: schema.clone(),
        };
        Self::open(store, info.table_id, target, range, direction)
    }

    fn open(
        store: &dyn KvStore,
        table_id: TableId,
        target: ScanTarget,
        range: KeyRange,
        direction: Direction,
    ) -> HexResult<Self> {
        let entries = store.scan(range.clone(), direction)?;
        debug!(table_id = table_id.as_u64(), ?target, ?direction, "scan started");
        Ok(Self {
            table_id,
            target,
            range,
            direction,
            entries,
            exhausted: false,
            rows_returned: 0,
            stale_skipped: 0,
        })
    }

    /// Returns the scan target.
    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    /// Returns the scanned key range.
    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Returns the scan direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true once the end of the range has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of rows returned so far.
    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    /// Returns the next row, or `None` at the end of the range.
    ///
    /// Index entries are resolved to rows through `fetch`. Entries whose row
    /// is gone, or whose row no longer carries the entry's values, are
    /// skipped. Once `None` has been returned, every later call returns
    /// `None` too.
    pub fn next_row<F>(&mut self, info: &TableInfo, mut fetch: F) -> HexResult<Option<Row>>
    where
        F: FnMut(RowId) -> HexResult<Option<Row>>,
    {
        while let Some(entry) = self.next_entry() {
            let row = match &self.target {
                ScanTarget::Table => Some(decode_data_row(self.table_id, &entry)?),
                ScanTarget::Index {
                    name,
                    index_id,
                    schema,
                } => {
                    let (values, row_id) = decode_index_entry(self.table_id, *index_id, &entry.key)?;
                    match fetch(row_id)? {
                        Some(row) if info.schema.index_values(schema, &row)? == values => Some(row),
                        _ => {
                            warn!(
                                table_id = self.table_id.as_u64(),
                                index = %name,
                                row_id = %row_id,
                                "skipping stale index entry"
                            );
                            self.stale_skipped += 1;
                            None
                        }
                    }
                }
            };

            if let Some(row) = row {
                self.rows_returned += 1;
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn next_entry(&mut self) -> Option<StoreEntry> {
        if self.exhausted {
            return None;
        }
        let entry = self.entries.next();
        if entry.is_none() {
            self.exhausted = true;
        }
        entry
    }
}

impl Drop for ScanCursor {
    fn drop(&mut self) {
        debug!(
            table_id = self.table_id.as_u64(),
            rows = self.rows_returned,
            stale = self.stale_skipped,
            exhausted = self.exhausted,
            "scan ended"
        );
    }
}

impl std::fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCursor")
            .field("table_id", &self.table_id)
            .field("target", &self.target)
            .field("range", &self.range)
            .field("direction", &self.direction)
            .field("exhausted", &self.exhausted)
            .field("rows_returned", &self.rows_returned)
            .finish_non_exhaustive()
    }
}

fn decode_data_row(table_id: TableId, entry: &StoreEntry) -> HexResult<Row> {
    let row = Row::deserialize(&entry.value)?;
    match RowKey::decode(&entry.key)? {
        RowKey::DataRow {
            table_id: t,
            row_id: Some(row_id),
        } if t == table_id && row_id == row.row_id() => Ok(row),
        other => Err(HexError::corruption(format!(
            "row {} stored under key {other}",
            row.row_id()
        ))),
    }
}

fn decode_index_entry(
    table_id: TableId,
    index_id: IndexId,
    key: &Key,
) -> HexResult<(Vec<IndexValue>, RowId)> {
    match RowKey::decode(key)? {
        RowKey::IndexEntry {
            table_id: t,
            index_id: Some(i),
            values,
            row_id: Some(row_id),
        } if t == table_id && i == index_id => Ok((values, row_id)),
        other => Err(HexError::corruption(format!(
            "unexpected key {other} in index range"
        ))),
    }
}
