//! Persisted table catalog.
//!
//! All table metadata lives in the store under the metadata key variants of
//! [`RowKey`], so every handle created over the same store sees the same
//! tables. Two locks serialize the read-modify-write sequences:
//!
//! - `ddl` covers table and index creation, rename and drop
//! - `counters` covers the auto-increment and row-count counters, and
//!   every write that must not interleave with a schema change
//!
//! When both are needed, `ddl` is taken first.
//!
//! Every schema change bumps the table's schema version. Handles commit
//! against the version they staged under and are told to refresh when it
//! moved. Index ids come from a per-table counter and are never reused.
//!
//! Every multi-key change is written as one atomic [`WriteBatch`].

use std::collections::BTreeMap;
use std::sync::Arc;

use hexkv_common::constants::{AUTO_INCREMENT_START, FIRST_INDEX_ID, FIRST_TABLE_ID};
use hexkv_common::error::{HexError, HexResult};
use hexkv_common::types::{IndexId, Key, TableId, Value};
use hexkv_store::{Direction, KeyRange, KvStore, WriteBatch};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::encoding;
use crate::rowkey::RowKey;
use crate::schema::{IndexSchema, TableSchema};

/// Everything a handle needs to know about an open table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Table id embedded in every key of the table.
    pub table_id: TableId,
    /// Column and index definitions.
    pub schema: TableSchema,
    /// Index ids by index name.
    pub index_ids: BTreeMap<String, IndexId>,
    /// Schema version; bumped by every index change.
    pub version: u64,
    /// Id the next added index gets.
    pub next_index_id: IndexId,
}

/// Stored value of [`RowKey::IndexIds`].
#[derive(Serialize, Deserialize)]
struct IndexCatalog {
    version: u64,
    next_index_id: IndexId,
    ids: BTreeMap<String, IndexId>,
}

impl TableInfo {
    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> HexResult<(IndexId, &IndexSchema)> {
        let schema = self.schema.index(name)?;
        let id = self
            .index_ids
            .get(name)
            .copied()
            .ok_or_else(|| HexError::corruption(format!("index '{name}' has no index id")))?;
        Ok((id, schema))
    }

    /// Iterates over `(name, id, schema)` of every index.
    pub fn indexes(&self) -> impl Iterator<Item = (&str, IndexId, &IndexSchema)> {
        self.schema.indices.iter().filter_map(|(name, schema)| {
            self.index_ids
                .get(name)
                .map(|id| (name.as_str(), *id, schema))
        })
    }
}

/// The table catalog.
#[derive(Debug)]
pub struct Catalog {
    store: Arc<dyn KvStore>,
    ddl: Mutex<()>,
    counters: Mutex<()>,
}

impl Catalog {
    /// Creates a catalog over a store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ddl: Mutex::new(()),
            counters: Mutex::new(()),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Creates a table and returns its info.
    pub fn create_table(
        &self,
        name: &str,
        schema: TableSchema,
        auto_increment: u64,
    ) -> HexResult<TableInfo> {
        if name.is_empty() {
            return Err(HexError::invalid_argument("table name must not be empty"));
        }
        schema.validate()?;

        let _guard = self.ddl.lock();
        if self.lookup_table_id(name)?.is_some() {
            return Err(HexError::TableExists {
                table: name.to_string(),
            });
        }

        let table_id = match self.read_u64(&RowKey::TableIdCounter)? {
            Some(next) => TableId::new(next)?,
            None => TableId::new(FIRST_TABLE_ID)?,
        };

        let mut index_ids = BTreeMap::new();
        let mut next_index = IndexId::new(FIRST_INDEX_ID)?;
        for index_name in schema.indices.keys() {
            index_ids.insert(index_name.clone(), next_index);
            next_index = next_index.next()?;
        }

        let info = TableInfo {
            name: name.to_string(),
            table_id,
            schema,
            index_ids,
            version: 1,
            next_index_id: next_index,
        };

        let mut batch = WriteBatch::new();
        batch.put(
            RowKey::TableIdCounter.encode(),
            Value::from_u64(table_id.next()?.as_u64()),
        );
        batch.put(
            RowKey::table_name(name).encode(),
            Value::from_u64(table_id.as_u64()),
        );
        batch.put(
            RowKey::AutoIncrement { table_id }.encode(),
            Value::from_u64(auto_increment),
        );
        batch.put(RowKey::RowCount { table_id }.encode(), Value::from_u64(0));
        stage_schema(&info, &mut batch)?;
        self.store.write_batch(batch)?;

        info!(table = name, table_id = table_id.as_u64(), "table created");
        Ok(info)
    }

    /// Loads a table by name.
    pub fn table(&self, name: &str) -> HexResult<TableInfo> {
        let table_id = self
            .lookup_table_id(name)?
            .ok_or_else(|| HexError::TableNotFound {
                table: name.to_string(),
            })?;
        self.load(name, table_id)
    }

    /// Returns true if a table with this name exists.
    pub fn table_exists(&self, name: &str) -> HexResult<bool> {
        Ok(self.lookup_table_id(name)?.is_some())
    }

    /// Lists table names in name order.
    pub fn list_tables(&self) -> HexResult<Vec<String>> {
        let range = KeyRange::prefix(Key::from_bytes(&[crate::rowkey::prefix::TABLE_NAME]));
        self.store
            .scan(range, Direction::Forward)?
            .map(|entry| match RowKey::decode(&entry.key)? {
                RowKey::TableName { name } => Ok(name),
                other => Err(HexError::corruption(format!(
                    "unexpected key {other} in table name range"
                ))),
            })
            .collect()
    }

    /// Renames a table. Its id, and so all of its rows, stay put.
    pub fn rename_table(&self, from: &str, to: &str) -> HexResult<()> {
        if to.is_empty() {
            return Err(HexError::invalid_argument("table name must not be empty"));
        }

        let _guard = self.ddl.lock();
        let table_id = self
            .lookup_table_id(from)?
            .ok_or_else(|| HexError::TableNotFound {
                table: from.to_string(),
            })?;
        if self.lookup_table_id(to)?.is_some() {
            return Err(HexError::TableExists {
                table: to.to_string(),
            });
        }

        let mut batch = WriteBatch::new();
        batch.delete(RowKey::table_name(from).encode());
        batch.put(
            RowKey::table_name(to).encode(),
            Value::from_u64(table_id.as_u64()),
        );
        self.store.write_batch(batch)?;

        info!(from, to, table_id = table_id.as_u64(), "table renamed");
        Ok(())
    }

    /// Drops a table with all of its rows, index entries and metadata.
    ///
    /// Returns the number of rows removed.
    pub fn drop_table(&self, name: &str) -> HexResult<u64> {
        let _guard = self.ddl.lock();
        let _counters = self.counters.lock();
        let info = self.table(name)?;
        let table_id = info.table_id;

        let mut batch = WriteBatch::new();
        let rows = self.stage_delete_prefix(&RowKey::data_rows(table_id), &mut batch)?;
        self.stage_delete_prefix(&RowKey::index_entries(table_id), &mut batch)?;
        for key in [
            RowKey::table_name(name),
            RowKey::AutoIncrement { table_id },
            RowKey::RowCount { table_id },
            RowKey::TableMetadata { table_id },
            RowKey::IndexIds { table_id },
        ] {
            batch.delete(key.encode());
        }
        self.store.write_batch(batch)?;

        info!(table = name, table_id = table_id.as_u64(), rows, "table dropped");
        Ok(rows)
    }

    /// Removes every row and index entry of a table and resets its row
    /// count. Metadata, id and auto-increment value are kept.
    ///
    /// Returns the number of rows removed.
    pub fn truncate_table(&self, info: &TableInfo) -> HexResult<u64> {
        let table_id = info.table_id;
        let _guard = self.counters.lock();

        let mut batch = WriteBatch::new();
        let rows = self.stage_delete_prefix(&RowKey::data_rows(table_id), &mut batch)?;
        self.stage_delete_prefix(&RowKey::index_entries(table_id), &mut batch)?;
        batch.put(RowKey::RowCount { table_id }.encode(), Value::from_u64(0));
        self.store.write_batch(batch)?;

        info!(table = %info.name, table_id = table_id.as_u64(), rows, "table truncated");
        Ok(rows)
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Adds an index to a table.
    ///
    /// `backfill` is called with the updated table info and the new index
    /// id, and stages entries for existing rows into the same batch as the
    /// schema change, so the index appears complete or not at all.
    pub fn add_index<F>(
        &self,
        table: &str,
        index_name: &str,
        index: IndexSchema,
        backfill: F,
    ) -> HexResult<TableInfo>
    where
        F: FnOnce(&TableInfo, IndexId, &mut WriteBatch) -> HexResult<()>,
    {
        let _guard = self.ddl.lock();
        let mut info = self.table(table)?;
        if info.schema.indices.contains_key(index_name) {
            return Err(HexError::IndexExists {
                index: index_name.to_string(),
            });
        }
        info.schema.validate_index(index_name, &index)?;

        let index_id = info.next_index_id;
        info.next_index_id = index_id.next()?;
        info.version += 1;
        info.schema.indices.insert(index_name.to_string(), index);
        info.index_ids.insert(index_name.to_string(), index_id);

        // Rows committed while the backfill runs would miss the new index.
        let _counters = self.counters.lock();
        let mut batch = WriteBatch::new();
        stage_schema(&info, &mut batch)?;
        backfill(&info, index_id, &mut batch)?;
        let entries = batch.len() - 2;
        self.store.write_batch(batch)?;

        info!(
            table,
            index = index_name,
            index_id = index_id.as_u64(),
            version = info.version,
            entries,
            "index added"
        );
        Ok(info)
    }

    /// Drops an index and all of its entries.
    pub fn drop_index(&self, table: &str, index_name: &str) -> HexResult<TableInfo> {
        let _guard = self.ddl.lock();
        let mut info = self.table(table)?;
        let (index_id, _) = info.index(index_name)?;

        info.schema.indices.remove(index_name);
        info.index_ids.remove(index_name);
        info.version += 1;

        let _counters = self.counters.lock();
        let mut batch = WriteBatch::new();
        let entries = self.stage_delete_prefix(
            &RowKey::index_prefix(info.table_id, index_id, Vec::new()),
            &mut batch,
        )?;
        stage_schema(&info, &mut batch)?;
        self.store.write_batch(batch)?;

        info!(table, index = index_name, version = info.version, entries, "index dropped");
        Ok(info)
    }

    /// Returns the current schema version of a table.
    pub fn schema_version(&self, table_id: TableId) -> HexResult<u64> {
        Ok(self.read_index_catalog(table_id)?.version)
    }

    /// Reloads a table's metadata by id, keeping the name the caller knows
    /// it by.
    pub fn reload(&self, info: &TableInfo) -> HexResult<TableInfo> {
        self.load(&info.name, info.table_id)
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Returns the next auto-increment value.
    pub fn auto_increment(&self, table_id: TableId) -> HexResult<u64> {
        self.read_counter(RowKey::AutoIncrement { table_id })
    }

    /// Advances the auto-increment value by `delta` and returns the value
    /// it had before.
    pub fn increment_auto_increment(&self, table_id: TableId, delta: u64) -> HexResult<u64> {
        let _guard = self.counters.lock();
        let key = RowKey::AutoIncrement { table_id };
        let current = self.read_counter(key.clone())?;
        let next = current.checked_add(delta).ok_or_else(|| {
            HexError::invalid_argument(format!(
                "auto-increment overflow: {current} + {delta}"
            ))
        })?;
        self.store.put(key.encode(), Value::from_u64(next))?;
        debug!(table_id = table_id.as_u64(), current, next, "auto-increment advanced");
        Ok(current)
    }

    /// Raises the auto-increment value to `value`. Lower values are ignored.
    ///
    /// Returns the value in effect afterwards.
    pub fn set_auto_increment(&self, table_id: TableId, value: u64) -> HexResult<u64> {
        let _guard = self.counters.lock();
        let key = RowKey::AutoIncrement { table_id };
        let current = self.read_counter(key.clone())?;
        if value <= current {
            return Ok(current);
        }
        self.store.put(key.encode(), Value::from_u64(value))?;
        Ok(value)
    }

    /// Resets the auto-increment value to its starting point.
    pub fn truncate_auto_increment(&self, table_id: TableId) -> HexResult<()> {
        let _guard = self.counters.lock();
        // Fail on unknown tables rather than creating a stray counter.
        self.read_counter(RowKey::AutoIncrement { table_id })?;
        self.store.put(
            RowKey::AutoIncrement { table_id }.encode(),
            Value::from_u64(AUTO_INCREMENT_START),
        )?;
        Ok(())
    }

    /// Returns the row count.
    pub fn row_count(&self, table_id: TableId) -> HexResult<u64> {
        self.read_counter(RowKey::RowCount { table_id })
    }

    /// Adjusts the row count by `delta`, saturating at zero and `u64::MAX`.
    pub fn increment_row_count(&self, table_id: TableId, delta: i64) -> HexResult<u64> {
        let _guard = self.counters.lock();
        self.apply(table_id, &WriteBatch::new(), delta)
    }

    /// Applies a handle's staged writes together with its row-count change,
    /// atomically. Returns the resulting row count.
    ///
    /// `version` is the schema version the writes were staged under; if the
    /// table's schema changed since, nothing is written and
    /// [`HexError::SchemaChanged`] is returned. `staged` is left untouched
    /// so the caller can keep it if the commit fails.
    pub fn commit(
        &self,
        table_id: TableId,
        version: u64,
        staged: &WriteBatch,
        row_delta: i64,
    ) -> HexResult<u64> {
        let _guard = self.counters.lock();
        let current = self.read_index_catalog(table_id)?.version;
        if current != version {
            debug!(table_id = table_id.as_u64(), version, current, "commit against stale schema");
            return Err(HexError::SchemaChanged {
                table_id: table_id.as_u64(),
            });
        }
        self.apply(table_id, staged, row_delta)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Writes `staged` plus the row-count change. Callers hold `counters`.
    fn apply(&self, table_id: TableId, staged: &WriteBatch, row_delta: i64) -> HexResult<u64> {
        let key = RowKey::RowCount { table_id };
        let mut count = self.read_counter(key.clone())?;

        let mut batch = staged.clone();
        if row_delta != 0 {
            count = count.saturating_add_signed(row_delta);
            batch.put(key.encode(), Value::from_u64(count));
        }
        let ops = batch.len();
        self.store.write_batch(batch)?;
        debug!(table_id = table_id.as_u64(), ops, row_delta, count, "write batch committed");
        Ok(count)
    }

    fn lookup_table_id(&self, name: &str) -> HexResult<Option<TableId>> {
        self.read_u64(&RowKey::table_name(name))?
            .map(TableId::new)
            .transpose()
    }

    fn load(&self, name: &str, table_id: TableId) -> HexResult<TableInfo> {
        let schema = self
            .store
            .get(&RowKey::TableMetadata { table_id }.encode())?
            .ok_or_else(|| HexError::corruption(format!("table '{name}' has no metadata")))?;
        let index_ids = self
            .store
            .get(&RowKey::IndexIds { table_id }.encode())?
            .ok_or_else(|| HexError::corruption(format!("table '{name}' has no index ids")))?;
        let catalog: IndexCatalog = encoding::from_bytes(&index_ids)?;

        Ok(TableInfo {
            name: name.to_string(),
            table_id,
            schema: TableSchema::deserialize(&schema)?,
            index_ids: catalog.ids,
            version: catalog.version,
            next_index_id: catalog.next_index_id,
        })
    }

    fn read_index_catalog(&self, table_id: TableId) -> HexResult<IndexCatalog> {
        let value = self
            .store
            .get(&RowKey::IndexIds { table_id }.encode())?
            .ok_or_else(|| HexError::TableNotFound {
                table: format!("#{}", table_id.as_u64()),
            })?;
        encoding::from_bytes(&value)
    }

    fn read_u64(&self, key: &RowKey) -> HexResult<Option<u64>> {
        match self.store.get(&key.encode())? {
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| HexError::corruption(format!("{key} does not hold a counter"))),
            None => Ok(None),
        }
    }

    fn read_counter(&self, key: RowKey) -> HexResult<u64> {
        let table_id = key.table_id().map_or(0, TableId::as_u64);
        self.read_u64(&key)?.ok_or_else(|| HexError::TableNotFound {
            table: format!("#{table_id}"),
        })
    }

    fn stage_delete_prefix(&self, prefix: &RowKey, batch: &mut WriteBatch) -> HexResult<u64> {
        let mut removed = 0;
        for entry in self
            .store
            .scan(KeyRange::prefix(prefix.encode()), Direction::Forward)?
        {
            batch.delete(entry.key);
            removed += 1;
        }
        Ok(removed)
    }
}

fn stage_schema(info: &TableInfo, batch: &mut WriteBatch) -> HexResult<()> {
    let table_id = info.table_id;
    batch.put(
        RowKey::TableMetadata { table_id }.encode(),
        Value::from_vec(info.schema.serialize()?),
    );
    batch.put(
        RowKey::IndexIds { table_id }.encode(),
        Value::from_vec(encoding::to_bytes(&IndexCatalog {
            version: info.version,
            next_index_id: info.next_index_id,
            ids: info.index_ids.clone(),
        })?),
    );
    Ok(())
}
