//! The storage handler protocol.
//!
//! A [`HandlerProxy`] is one front-end handle. It is bound to at most one
//! table at a time and owns at most one scan cursor:
//!
//! ```text
//! Closed --open_table--> Idle --start_*_scan--> Scanning
//!   ^                     |  ^                     |
//!   +----close_table------+  +------end_scan-------+
//! ```
//!
//! Row mutations are staged in a local write buffer, one atomic batch per
//! logical mutation. The buffer is committed when it reaches the configured
//! limit, on [`HandlerProxy::flush`], when the table is closed, and before
//! any read that has to see it (scans, counts, uniqueness checks). Point
//! reads consult the buffer directly.
//!
//! Another handle may change the open table's indexes at any time. Before
//! each mutation and scan the handle compares its schema version with the
//! catalog's and reloads when it moved, restaging buffered writes so they
//! match the new index set.
//!
//! Rows, row identities and index search keys cross this boundary as
//! bytes; see [`Row::serialize`] and [`IndexKey::serialize`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use hexkv_common::config::{HandlerConfig, ScanMutationPolicy};
use hexkv_common::error::{HexError, HexResult};
use hexkv_common::types::{IndexId, Key, RowId, Value};
use hexkv_store::{BatchOp, Direction, KeyRange, KvStore, MemoryStore, WriteBatch};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, TableInfo};
use crate::cursor::ScanCursor;
use crate::encoding::IndexValue;
use crate::row::Row;
use crate::rowkey::RowKey;
use crate::schema::{IndexKey, IndexSchema, TableSchema};

/// Protocol state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// No table is open.
    Closed,
    /// A table is open and no scan is live.
    Idle,
    /// A table is open and a scan is live.
    Scanning,
}

/// Creates handles that share one store, catalog and configuration.
#[derive(Debug, Clone)]
pub struct HandlerProxyFactory {
    store: Arc<dyn KvStore>,
    catalog: Arc<Catalog>,
    config: Arc<HandlerConfig>,
}

impl HandlerProxyFactory {
    /// Creates a factory over a store.
    ///
    /// The store's adapter name must be configured.
    pub fn new(config: HandlerConfig, store: Arc<dyn KvStore>) -> HexResult<Self> {
        config.validate()?;
        config.adapter_options(store.name())?;
        info!(
            adapter = store.name(),
            write_buffer_limit = config.write_buffer_limit,
            policy = ?config.scan_mutation_policy,
            "handler factory ready"
        );
        Ok(Self {
            catalog: Arc::new(Catalog::new(store.clone())),
            store,
            config: Arc::new(config),
        })
    }

    /// Creates a factory over a fresh in-memory store named after the
    /// configured default adapter.
    pub fn in_memory(config: HandlerConfig) -> HexResult<Self> {
        let store = Arc::new(MemoryStore::with_name(config.default_adapter.clone()));
        Self::new(config, store)
    }

    /// Creates a new closed handle.
    pub fn create_proxy(&self) -> HandlerProxy {
        HandlerProxy {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            table: None,
            cursor: None,
            pending: WriteBatch::new(),
            pending_rows: 0,
        }
    }

    /// Returns the shared catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }
}

/// One storage handler handle.
///
/// A handle is driven by one caller at a time; it is `Send` but has no
/// internal locking.
pub struct HandlerProxy {
    store: Arc<dyn KvStore>,
    catalog: Arc<Catalog>,
    config: Arc<HandlerConfig>,
    table: Option<TableInfo>,
    cursor: Option<ScanCursor>,
    pending: WriteBatch,
    pending_rows: i64,
}

impl HandlerProxy {
    /// Returns the protocol state.
    pub fn state(&self) -> HandlerState {
        match (&self.table, &self.cursor) {
            (None, _) => HandlerState::Closed,
            (Some(_), None) => HandlerState::Idle,
            (Some(_), Some(_)) => HandlerState::Scanning,
        }
    }

    /// Returns the open table, if any.
    pub fn table(&self) -> Option<&TableInfo> {
        self.table.as_ref()
    }

    /// Number of key mutations waiting in the write buffer.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    // =========================================================================
    // Table lifecycle
    // =========================================================================

    /// Creates a table.
    pub fn create_table(
        &self,
        name: &str,
        schema: TableSchema,
        auto_increment: u64,
    ) -> HexResult<()> {
        self.check_key(&RowKey::table_name(name).encode())?;
        self.catalog.create_table(name, schema, auto_increment)?;
        Ok(())
    }

    /// Binds the handle to a table.
    pub fn open_table(&mut self, name: &str) -> HexResult<()> {
        if let Some(open) = &self.table {
            return Err(self.violation(format!(
                "cannot open '{name}': table '{}' is already open",
                open.name
            )));
        }
        let info = self.catalog.table(name)?;
        debug!(table = name, table_id = info.table_id.as_u64(), "table opened");
        self.table = Some(info);
        Ok(())
    }

    /// Unbinds the handle, committing buffered writes.
    ///
    /// If another handle dropped the table meanwhile, buffered writes are
    /// discarded and the handle is closed anyway.
    pub fn close_table(&mut self) -> HexResult<()> {
        self.require_idle("close_table")?;
        match self.commit() {
            Ok(()) => {}
            Err(HexError::TableNotFound { table }) => {
                warn!(
                    table = %table,
                    writes = self.pending.len(),
                    rows = self.pending_rows,
                    "table dropped elsewhere, discarding buffered writes"
                );
                self.pending = WriteBatch::new();
                self.pending_rows = 0;
            }
            Err(e) => return Err(e),
        }
        if let Some(info) = self.table.take() {
            debug!(table = %info.name, "table closed");
        }
        Ok(())
    }

    /// Drops a table with all of its rows and metadata.
    ///
    /// If this handle has the table open, it must be idle; the handle is
    /// closed first.
    pub fn drop_table(&mut self, name: &str) -> HexResult<()> {
        if self.is_open(name) {
            self.close_table()?;
        }
        self.catalog.drop_table(name)?;
        Ok(())
    }

    /// Renames a table.
    pub fn rename_table(&mut self, from: &str, to: &str) -> HexResult<()> {
        self.check_key(&RowKey::table_name(to).encode())?;
        let bound = self.is_open(from);
        if bound {
            self.require_idle("rename_table")?;
            self.commit()?;
        }
        self.catalog.rename_table(from, to)?;
        if bound {
            if let Some(info) = self.table.as_mut() {
                info.name = to.to_string();
            }
        }
        Ok(())
    }

    /// Removes every row and index entry of the open table.
    ///
    /// Metadata, table id and auto-increment value are kept; the row count
    /// becomes zero.
    pub fn truncate_table(&mut self) -> HexResult<()> {
        self.require_idle("truncate_table")?;
        self.commit()?;
        let info = self.open_info()?;
        self.catalog.truncate_table(info)?;
        Ok(())
    }

    /// Adds an index to the open table and indexes every existing row.
    pub fn add_index(&mut self, name: &str, index: IndexSchema) -> HexResult<()> {
        self.require_idle("add_index")?;
        self.commit()?;
        let table = self.open_info()?.name.clone();
        let store = self.store.clone();
        let max_key_size = self.config.max_key_size;

        let info = self.catalog.add_index(&table, name, index, |info, index_id, batch| {
            let (_, index) = info.index(name)?;
            let mut seen = BTreeSet::new();
            let rows = store.scan(
                KeyRange::prefix(RowKey::data_rows(info.table_id).encode()),
                Direction::Forward,
            )?;
            for entry in rows {
                let row = Row::deserialize(&entry.value)?;
                let values = info.schema.index_values(index, &row)?;
                if index.unique
                    && !values.iter().any(IndexValue::is_null)
                    && !seen.insert(values.clone())
                {
                    return Err(HexError::DuplicateKey {
                        message: format!("existing rows collide on unique index '{name}'"),
                    });
                }
                let key = RowKey::index_entry(info.table_id, index_id, values, row.row_id()).encode();
                check_key_size(&key, max_key_size)?;
                batch.put(key, Value::empty());
            }
            Ok(())
        })?;
        self.table = Some(info);
        Ok(())
    }

    /// Drops an index of the open table.
    pub fn drop_index(&mut self, name: &str) -> HexResult<()> {
        self.require_idle("drop_index")?;
        self.commit()?;
        let table = self.open_info()?.name.clone();
        let info = self.catalog.drop_index(&table, name)?;
        self.table = Some(info);
        Ok(())
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Returns the open table's next auto-increment value.
    pub fn get_auto_increment(&self) -> HexResult<u64> {
        self.catalog.auto_increment(self.open_info()?.table_id)
    }

    /// Advances the auto-increment value, returning the value before.
    pub fn increment_auto_increment(&self, delta: u64) -> HexResult<u64> {
        self.catalog
            .increment_auto_increment(self.open_info()?.table_id, delta)
    }

    /// Raises the auto-increment value; never lowers it.
    pub fn set_auto_increment(&self, value: u64) -> HexResult<u64> {
        self.catalog.set_auto_increment(self.open_info()?.table_id, value)
    }

    /// Resets the auto-increment value to its start.
    pub fn truncate_auto_increment(&self) -> HexResult<()> {
        self.catalog
            .truncate_auto_increment(self.open_info()?.table_id)
    }

    /// Returns the open table's row count.
    pub fn get_row_count(&mut self) -> HexResult<u64> {
        self.commit()?;
        self.catalog.row_count(self.open_info()?.table_id)
    }

    /// Adjusts the open table's row count.
    pub fn increment_row_count(&mut self, delta: i64) -> HexResult<u64> {
        self.commit()?;
        self.catalog
            .increment_row_count(self.open_info()?.table_id, delta)
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Inserts a serialized row and returns its identity.
    ///
    /// A nil identity is replaced with a fresh random one.
    pub fn insert_row(&mut self, row: &[u8]) -> HexResult<RowId> {
        self.check_mutation_allowed("insert_row")?;
        let mut row = Row::deserialize(row)?;
        row.assign_row_id(RowId::generate());
        self.sync_schema()?;
        let info = self.open_info()?.clone();
        info.schema.validate_row(&row)?;

        let row_id = row.row_id();
        if self.read_row(&info, row_id)?.is_some() {
            return Err(HexError::DuplicateKey {
                message: format!("row {row_id} already exists"),
            });
        }
        self.check_unique(&info, &row)?;

        let mut batch = WriteBatch::new();
        batch.put(self.data_key(&info, row_id)?, self.row_value(&row)?);
        for (_, index_id, index) in info.indexes() {
            let values = info.schema.index_values(index, &row)?;
            let key = RowKey::index_entry(info.table_id, index_id, values, row_id).encode();
            self.check_key(&key)?;
            batch.put(key, Value::empty());
        }
        self.stage(&info, batch, 1)?;
        Ok(row_id)
    }

    /// Replaces the content of an existing row, keyed by its identity.
    ///
    /// Only index entries whose values changed are rewritten.
    pub fn update_row(&mut self, row: &[u8]) -> HexResult<()> {
        self.check_mutation_allowed("update_row")?;
        let row = Row::deserialize(row)?;
        let row_id = row.row_id();
        if row_id.is_nil() {
            return Err(HexError::invalid_argument("cannot update a row without identity"));
        }
        self.sync_schema()?;
        let info = self.open_info()?.clone();
        info.schema.validate_row(&row)?;

        let old = self
            .read_row(&info, row_id)?
            .ok_or(HexError::RowNotFound { row_id })?;
        self.check_unique(&info, &row)?;

        let mut batch = WriteBatch::new();
        for (_, index_id, index) in info.indexes() {
            let old_values = info.schema.index_values(index, &old)?;
            let new_values = info.schema.index_values(index, &row)?;
            if old_values == new_values {
                continue;
            }
            batch.delete(RowKey::index_entry(info.table_id, index_id, old_values, row_id).encode());
            let key = RowKey::index_entry(info.table_id, index_id, new_values, row_id).encode();
            self.check_key(&key)?;
            batch.put(key, Value::empty());
        }
        batch.put(self.data_key(&info, row_id)?, self.row_value(&row)?);
        self.stage(&info, batch, 0)
    }

    /// Deletes a row and all of its index entries.
    pub fn delete_row(&mut self, row_id: &[u8]) -> HexResult<()> {
        self.check_mutation_allowed("delete_row")?;
        let row_id = RowId::from_slice(row_id)?;
        self.sync_schema()?;
        let info = self.open_info()?.clone();

        let old = self
            .read_row(&info, row_id)?
            .ok_or(HexError::RowNotFound { row_id })?;

        let mut batch = WriteBatch::new();
        for (_, index_id, index) in info.indexes() {
            let values = info.schema.index_values(index, &old)?;
            batch.delete(RowKey::index_entry(info.table_id, index_id, values, row_id).encode());
        }
        batch.delete(RowKey::data_row(info.table_id, row_id).encode());
        self.stage(&info, batch, -1)
    }

    /// Returns the serialized row with this identity.
    pub fn get_row(&self, row_id: &[u8]) -> HexResult<Vec<u8>> {
        let row_id = RowId::from_slice(row_id)?;
        let info = self.open_info()?;
        let key = RowKey::data_row(info.table_id, row_id).encode();
        match self.read_value(&key)? {
            Some(value) => Ok(value.into_vec()),
            None => Err(HexError::RowNotFound { row_id }),
        }
    }

    /// Returns true if another row already holds `row`'s values in a unique
    /// index. Rows with a null in the indexed columns never collide.
    pub fn index_contains_duplicate(&mut self, index_name: &str, row: &[u8]) -> HexResult<bool> {
        let row = Row::deserialize(row)?;
        self.sync_schema()?;
        self.commit()?;
        let info = self.open_info()?;
        let (index_id, index) = info.index(index_name)?;
        Ok(self
            .find_duplicate(info, index_id, index, &row)?
            .is_some())
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Starts a scan over every row of the open table.
    pub fn start_table_scan(&mut self) -> HexResult<()> {
        self.require_idle("start_table_scan")?;
        self.sync_schema()?;
        self.commit()?;
        let cursor = ScanCursor::table(self.store.as_ref(), self.open_info()?)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Starts an index scan positioned by a serialized [`IndexKey`].
    pub fn start_index_scan(&mut self, key: &[u8]) -> HexResult<()> {
        self.require_idle("start_index_scan")?;
        let key = IndexKey::deserialize(key)?;
        self.sync_schema()?;
        self.commit()?;
        let cursor = ScanCursor::index(self.store.as_ref(), self.open_info()?, &key)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Returns the next serialized row of the live scan, or `None` once the
    /// scan is exhausted. Calling again after `None` keeps returning `None`.
    pub fn get_next_row(&mut self) -> HexResult<Option<Vec<u8>>> {
        let Some(mut cursor) = self.cursor.take() else {
            return Err(self.violation("get_next_row called without a live scan".to_string()));
        };
        let result = match self.open_info() {
            Ok(info) => cursor.next_row(info, |row_id| self.read_row(info, row_id)),
            Err(e) => Err(e),
        };
        self.cursor = Some(cursor);

        match result? {
            Some(row) => Ok(Some(row.serialize()?)),
            None => Ok(None),
        }
    }

    /// Ends the live scan, if any. Always succeeds.
    pub fn end_scan(&mut self) {
        self.cursor = None;
    }

    /// Commits buffered writes and flushes the store.
    pub fn flush(&mut self) -> HexResult<()> {
        let started = Instant::now();
        let writes = self.pending.len();
        self.commit()?;
        self.store.flush()?;

        let elapsed = started.elapsed();
        if elapsed > self.config.flush_timeout {
            warn!(?elapsed, limit = ?self.config.flush_timeout, writes, "slow flush");
        } else {
            debug!(?elapsed, writes, "flushed");
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn open_info(&self) -> HexResult<&TableInfo> {
        self.table
            .as_ref()
            .ok_or_else(|| HexError::protocol("no table is open"))
    }

    fn is_open(&self, name: &str) -> bool {
        self.table.as_ref().is_some_and(|info| info.name == name)
    }

    fn require_idle(&self, op: &str) -> HexResult<()> {
        match self.state() {
            HandlerState::Idle => Ok(()),
            HandlerState::Closed => Err(self.violation(format!("{op} requires an open table"))),
            HandlerState::Scanning => {
                Err(self.violation(format!("{op} is not allowed while a scan is live")))
            }
        }
    }

    fn check_mutation_allowed(&self, op: &str) -> HexResult<()> {
        match self.state() {
            HandlerState::Closed => Err(self.violation(format!("{op} requires an open table"))),
            HandlerState::Scanning
                if self.config.scan_mutation_policy == ScanMutationPolicy::Reject =>
            {
                Err(self.violation(format!("{op} is not allowed while a scan is live")))
            }
            _ => Ok(()),
        }
    }

    fn violation(&self, message: String) -> HexError {
        warn!(state = ?self.state(), "{message}");
        HexError::ProtocolState { message }
    }

    fn check_key(&self, key: &Key) -> HexResult<()> {
        check_key_size(key, self.config.max_key_size)
    }

    fn data_key(&self, info: &TableInfo, row_id: RowId) -> HexResult<Key> {
        let key = RowKey::data_row(info.table_id, row_id).encode();
        self.check_key(&key)?;
        Ok(key)
    }

    fn row_value(&self, row: &Row) -> HexResult<Value> {
        let bytes = row.serialize()?;
        if bytes.len() > self.config.max_value_size {
            return Err(HexError::invalid_argument(format!(
                "row of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.config.max_value_size
            )));
        }
        Ok(Value::from_vec(bytes))
    }

    /// Reads a key, seeing this handle's buffered writes.
    fn read_value(&self, key: &Key) -> HexResult<Option<Value>> {
        if let Some(pending) = self.pending.pending(key) {
            return Ok(pending.cloned());
        }
        Ok(self.store.get(key)?)
    }

    fn read_row(&self, info: &TableInfo, row_id: RowId) -> HexResult<Option<Row>> {
        self.read_value(&RowKey::data_row(info.table_id, row_id).encode())?
            .map(|value| Row::deserialize(&value))
            .transpose()
    }

    fn check_unique(&mut self, info: &TableInfo, row: &Row) -> HexResult<()> {
        if !info.schema.indices.values().any(|index| index.unique) {
            return Ok(());
        }
        // Uniqueness is checked against the store, so it must hold our writes.
        self.commit()?;
        for (name, index_id, index) in info.indexes().filter(|(_, _, index)| index.unique) {
            if let Some(other) = self.find_duplicate(info, index_id, index, row)? {
                return Err(HexError::DuplicateKey {
                    message: format!("row {other} already holds these values in index '{name}'"),
                });
            }
        }
        Ok(())
    }

    fn find_duplicate(
        &self,
        info: &TableInfo,
        index_id: IndexId,
        index: &IndexSchema,
        row: &Row,
    ) -> HexResult<Option<RowId>> {
        let values = info.schema.index_values(index, row)?;
        if values.iter().any(IndexValue::is_null) {
            return Ok(None);
        }
        let prefix = RowKey::index_prefix(info.table_id, index_id, values).encode();
        for entry in self.store.scan(KeyRange::prefix(prefix), Direction::Forward)? {
            match RowKey::decode(&entry.key)?.row_id() {
                Some(other) if other != row.row_id() => return Ok(Some(other)),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Buffers one mutation's batch, built against `built_with`.
    fn stage(&mut self, built_with: &TableInfo, batch: WriteBatch, row_delta: i64) -> HexResult<()> {
        self.pending.append(batch);
        self.pending_rows += row_delta;
        // A uniqueness check may have refreshed the schema mid-mutation.
        let current = self.open_info()?;
        if current.version != built_with.version {
            self.pending = self.restage(built_with, current)?;
        }
        if self.pending.len() >= self.config.write_buffer_limit {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> HexResult<()> {
        if self.pending.is_empty() && self.pending_rows == 0 {
            return Ok(());
        }
        loop {
            let info = self.open_info()?;
            match self
                .catalog
                .commit(info.table_id, info.version, &self.pending, self.pending_rows)
            {
                Ok(_) => break,
                Err(HexError::SchemaChanged { .. }) => self.sync_schema()?,
                Err(e) => return Err(e),
            }
        }
        self.pending = WriteBatch::new();
        self.pending_rows = 0;
        Ok(())
    }

    /// Reloads the open table if another handle changed its schema.
    fn sync_schema(&mut self) -> HexResult<()> {
        let Some(current) = self.table.as_ref() else {
            return Ok(());
        };
        let version = self.catalog.schema_version(current.table_id)?;
        if version == current.version {
            return Ok(());
        }
        let fresh = self.catalog.reload(current)?;
        let restaged = if self.pending.is_empty() {
            None
        } else {
            Some(self.restage(current, &fresh)?)
        };
        debug!(
            table = %fresh.name,
            from = current.version,
            to = fresh.version,
            writes = self.pending.len(),
            "schema changed, table reloaded"
        );
        if let Some(pending) = restaged {
            self.pending = pending;
        }
        self.table = Some(fresh);
        Ok(())
    }

    /// Rewrites the write buffer, staged against `old`, for the index set
    /// of `new`: entries of dropped indexes go, and every touched row gets
    /// its entries in the added indexes.
    fn restage(&self, old: &TableInfo, new: &TableInfo) -> HexResult<WriteBatch> {
        let live: BTreeSet<IndexId> = new.index_ids.values().copied().collect();
        let known: BTreeSet<IndexId> = old.index_ids.values().copied().collect();
        let added: Vec<_> = new
            .indexes()
            .filter(|(_, index_id, _)| !known.contains(index_id))
            .collect();

        let mut batch = WriteBatch::new();
        let mut touched = BTreeSet::new();
        for op in self.pending.ops() {
            match RowKey::decode(op.key())? {
                RowKey::IndexEntry {
                    index_id: Some(index_id),
                    ..
                } if !live.contains(&index_id) => continue,
                RowKey::DataRow {
                    row_id: Some(row_id),
                    ..
                } => {
                    touched.insert(row_id);
                }
                _ => {}
            }
            match op {
                BatchOp::Put { key, value } => batch.put(key.clone(), value.clone()),
                BatchOp::Delete { key } => batch.delete(key.clone()),
            }
        }

        if added.is_empty() {
            return Ok(batch);
        }
        for row_id in touched {
            let key = RowKey::data_row(new.table_id, row_id).encode();
            let committed = self.store.get(&key)?.map(|v| Row::deserialize(&v)).transpose()?;
            let staged = match self.pending.pending(&key) {
                Some(Some(value)) => Some(Row::deserialize(value)?),
                _ => None,
            };
            for (_, index_id, index) in &added {
                if let Some(row) = &committed {
                    let values = new.schema.index_values(index, row)?;
                    batch.delete(RowKey::index_entry(new.table_id, *index_id, values, row_id).encode());
                }
                if let Some(row) = &staged {
                    let values = new.schema.index_values(index, row)?;
                    let key = RowKey::index_entry(new.table_id, *index_id, values, row_id).encode();
                    self.check_key(&key)?;
                    batch.put(key, Value::empty());
                }
            }
        }
        Ok(batch)
    }
}

impl Drop for HandlerProxy {
    fn drop(&mut self) {
        self.cursor = None;
        if let Err(e) = self.commit() {
            warn!(error = %e, writes = self.pending.len(), "buffered writes lost on drop");
        }
    }
}

impl std::fmt::Debug for HandlerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerProxy")
            .field("state", &self.state())
            .field("table", &self.table.as_ref().map(|t| &t.name))
            .field("pending_writes", &self.pending.len())
            .finish_non_exhaustive()
    }
}

fn check_key_size(key: &Key, max: usize) -> HexResult<()> {
    if key.len() > max {
        return Err(HexError::invalid_key(format!(
            "key of {} bytes exceeds the {max} byte limit",
            key.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, ColumnType, QueryType};

    fn long(v: i64) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    fn schema() -> TableSchema {
        TableSchema::new()
            .with_column("id", ColumnSchema::new(ColumnType::Long).not_null())
            .with_column("name", ColumnSchema::new(ColumnType::String))
            .with_column("score", ColumnSchema::new(ColumnType::Long))
            .with_index("by_score", IndexSchema::new(["score"]))
            .with_index("by_id", IndexSchema::unique(["id"]))
    }

    fn setup(config: HandlerConfig) -> (HandlerProxyFactory, HandlerProxy) {
        let factory = HandlerProxyFactory::in_memory(config).unwrap();
        let mut proxy = factory.create_proxy();
        proxy.create_table("t1", schema(), 1).unwrap();
        proxy.open_table("t1").unwrap();
        (factory, proxy)
    }

    fn row(id: i64, score: Option<i64>) -> Vec<u8> {
        let mut row = Row::new(RowId::NIL).with_record("id", long(id));
        if let Some(score) = score {
            row.set("score", long(score));
        }
        row.serialize().unwrap()
    }

    fn drain(proxy: &mut HandlerProxy) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(bytes) = proxy.get_next_row().unwrap() {
            rows.push(Row::deserialize(&bytes).unwrap());
        }
        rows
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .map(|r| i64::from_be_bytes(r.get("id").unwrap().try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let factory = HandlerProxyFactory::in_memory(HandlerConfig::default()).unwrap();
        let mut proxy = factory.create_proxy();
        assert_eq!(proxy.state(), HandlerState::Closed);

        proxy.create_table("t1", schema(), 1).unwrap();
        proxy.open_table("t1").unwrap();
        assert_eq!(proxy.state(), HandlerState::Idle);

        proxy.start_table_scan().unwrap();
        assert_eq!(proxy.state(), HandlerState::Scanning);
        assert!(proxy.start_table_scan().unwrap_err().is_protocol());
        assert!(proxy.close_table().unwrap_err().is_protocol());

        proxy.end_scan();
        proxy.end_scan();
        assert_eq!(proxy.state(), HandlerState::Idle);

        proxy.close_table().unwrap();
        assert!(proxy.close_table().unwrap_err().is_protocol());
        assert!(proxy.get_next_row().unwrap_err().is_protocol());
    }

    #[test]
    fn test_open_missing_table() {
        let factory = HandlerProxyFactory::in_memory(HandlerConfig::default()).unwrap();
        let mut proxy = factory.create_proxy();
        assert!(matches!(
            proxy.open_table("nope"),
            Err(HexError::TableNotFound { .. })
        ));
        assert_eq!(proxy.state(), HandlerState::Closed);
    }

    #[test]
    fn test_insert_get_delete() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());

        let id = proxy.insert_row(&row(1, Some(10))).unwrap();
        assert!(!id.is_nil());

        // Visible before commit.
        assert!(proxy.pending_writes() > 0);
        let fetched = Row::deserialize(&proxy.get_row(&id.to_bytes()).unwrap()).unwrap();
        assert_eq!(fetched.row_id(), id);
        assert_eq!(fetched.get("score"), Some(long(10).as_slice()));

        proxy.delete_row(&id.to_bytes()).unwrap();
        assert!(matches!(
            proxy.get_row(&id.to_bytes()),
            Err(HexError::RowNotFound { .. })
        ));
        assert!(matches!(
            proxy.delete_row(&id.to_bytes()),
            Err(HexError::RowNotFound { .. })
        ));
        assert_eq!(proxy.get_row_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_keeps_given_identity() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        let id = RowId::generate();
        let bytes = Row::new(id)
            .with_record("id", long(5))
            .serialize()
            .unwrap();

        assert_eq!(proxy.insert_row(&bytes).unwrap(), id);
        assert!(matches!(
            proxy.insert_row(&bytes),
            Err(HexError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_update_rewrites_index_entries() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        let id = proxy.insert_row(&row(1, Some(10))).unwrap();
        proxy.insert_row(&row(2, Some(20))).unwrap();

        let updated = Row::new(id)
            .with_record("id", long(1))
            .with_record("score", long(30))
            .serialize()
            .unwrap();
        proxy.update_row(&updated).unwrap();

        let key = IndexKey::new("by_score", QueryType::IndexFirst);
        proxy.start_index_scan(&key.serialize().unwrap()).unwrap();
        assert_eq!(ids(&drain(&mut proxy)), vec![2, 1]);
        proxy.end_scan();

        let key = IndexKey::new("by_score", QueryType::ExactKey).with_record("score", Some(long(10)));
        proxy.start_index_scan(&key.serialize().unwrap()).unwrap();
        assert!(proxy.get_next_row().unwrap().is_none());
    }

    #[test]
    fn test_update_errors() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        assert!(matches!(
            proxy.update_row(&row(1, None)),
            Err(HexError::InvalidArgument { .. })
        ));
        let missing = Row::new(RowId::generate())
            .with_record("id", long(1))
            .serialize()
            .unwrap();
        assert!(matches!(
            proxy.update_row(&missing),
            Err(HexError::RowNotFound { .. })
        ));
    }

    #[test]
    fn test_unique_index() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        proxy.insert_row(&row(1, None)).unwrap();

        assert!(proxy.index_contains_duplicate("by_id", &row(1, None)).unwrap());
        assert!(!proxy.index_contains_duplicate("by_id", &row(2, None)).unwrap());
        assert!(matches!(
            proxy.insert_row(&row(1, None)),
            Err(HexError::DuplicateKey { .. })
        ));
        assert_eq!(proxy.get_row_count().unwrap(), 1);
    }

    #[test]
    fn test_index_scan_directions() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        for (id, score) in [(1, 30), (2, 10), (3, 20), (4, -5)] {
            proxy.insert_row(&row(id, Some(score))).unwrap();
        }
        proxy.insert_row(&row(5, None)).unwrap();

        let scan = |proxy: &mut HandlerProxy, key: IndexKey| {
            proxy.start_index_scan(&key.serialize().unwrap()).unwrap();
            let rows = ids(&drain(proxy));
            proxy.end_scan();
            rows
        };

        // Nulls sort first.
        assert_eq!(
            scan(&mut proxy, IndexKey::new("by_score", QueryType::IndexFirst)),
            vec![5, 4, 2, 3, 1]
        );
        assert_eq!(
            scan(&mut proxy, IndexKey::new("by_score", QueryType::IndexLast)),
            vec![1, 3, 2, 4, 5]
        );
        let at = |q| IndexKey::new("by_score", q).with_record("score", Some(long(20)));
        assert_eq!(scan(&mut proxy, at(QueryType::KeyOrNext)), vec![3, 1]);
        assert_eq!(scan(&mut proxy, at(QueryType::AfterKey)), vec![1]);
        assert_eq!(scan(&mut proxy, at(QueryType::KeyOrPrevious)), vec![3, 2, 4, 5]);
        assert_eq!(scan(&mut proxy, at(QueryType::BeforeKey)), vec![2, 4, 5]);
        assert_eq!(scan(&mut proxy, at(QueryType::ExactKey)), vec![3]);
    }

    #[test]
    fn test_exhausted_scan_stays_exhausted() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        proxy.insert_row(&row(1, None)).unwrap();
        proxy.start_table_scan().unwrap();
        assert!(proxy.get_next_row().unwrap().is_some());
        for _ in 0..3 {
            assert!(proxy.get_next_row().unwrap().is_none());
        }
    }

    #[test]
    fn test_scan_mutation_policy() {
        let config = HandlerConfig::builder()
            .scan_mutation_policy(ScanMutationPolicy::Reject)
            .build()
            .unwrap();
        let (_factory, mut proxy) = setup(config);
        let id = proxy.insert_row(&row(1, None)).unwrap();

        proxy.start_table_scan().unwrap();
        assert!(proxy.insert_row(&row(2, None)).unwrap_err().is_protocol());
        assert!(proxy.delete_row(&id.to_bytes()).unwrap_err().is_protocol());
        proxy.end_scan();
        proxy.delete_row(&id.to_bytes()).unwrap();

        let (_factory, mut proxy) = setup(HandlerConfig::default());
        let id = proxy.insert_row(&row(1, None)).unwrap();
        proxy.start_table_scan().unwrap();
        proxy.delete_row(&id.to_bytes()).unwrap();
    }

    #[test]
    fn test_write_buffer_limit_commits() {
        let config = HandlerConfig::builder().write_buffer_limit(4).build().unwrap();
        let (factory, mut proxy) = setup(config);
        let table_id = proxy.table().unwrap().table_id;
        // Unique checks commit on their own; keep them out of the way.
        proxy.drop_index("by_id").unwrap();

        // One data row plus one index entry per insert.
        proxy.insert_row(&row(1, Some(1))).unwrap();
        assert_eq!(proxy.pending_writes(), 2);
        proxy.insert_row(&row(2, Some(2))).unwrap();
        assert_eq!(proxy.pending_writes(), 0);
        assert_eq!(factory.catalog().row_count(table_id).unwrap(), 2);
    }

    #[test]
    fn test_close_commits() {
        let (factory, mut proxy) = setup(HandlerConfig::default());
        let id = proxy.insert_row(&row(1, None)).unwrap();
        proxy.close_table().unwrap();

        let mut other = factory.create_proxy();
        other.open_table("t1").unwrap();
        assert!(other.get_row(&id.to_bytes()).is_ok());
        assert_eq!(other.get_row_count().unwrap(), 1);
    }

    #[test]
    fn test_close_after_table_dropped_elsewhere() {
        let store = Arc::new(MemoryStore::new());
        let factory = HandlerProxyFactory::new(HandlerConfig::default(), store.clone()).unwrap();
        let mut proxy = factory.create_proxy();
        proxy.create_table("t1", schema(), 1).unwrap();
        proxy.open_table("t1").unwrap();
        proxy.drop_index("by_id").unwrap();
        proxy.insert_row(&row(1, Some(1))).unwrap();
        assert!(proxy.pending_writes() > 0);

        factory.create_proxy().drop_table("t1").unwrap();

        proxy.close_table().unwrap();
        assert_eq!(proxy.state(), HandlerState::Closed);
        assert_eq!(proxy.pending_writes(), 0);
        assert_eq!(store.keys(), vec![RowKey::TableIdCounter.encode()]);
    }

    #[test]
    fn test_buffer_restaged_after_schema_change() {
        let (factory, mut proxy) = setup(HandlerConfig::default());
        proxy.drop_index("by_id").unwrap();
        let id = proxy
            .insert_row(
                &Row::new(RowId::NIL)
                    .with_record("id", long(1))
                    .with_record("name", b"ann".to_vec())
                    .with_record("score", long(5))
                    .serialize()
                    .unwrap(),
            )
            .unwrap();
        let table_id = proxy.table().unwrap().table_id;

        let mut other = factory.create_proxy();
        other.open_table("t1").unwrap();
        other.drop_index("by_score").unwrap();
        other.add_index("by_name", IndexSchema::new(["name"])).unwrap();

        proxy.flush().unwrap();
        assert!(proxy.table().unwrap().index("by_score").is_err());
        assert!(proxy.table().unwrap().index("by_name").is_ok());

        let entries = factory
            .store()
            .scan(
                KeyRange::prefix(RowKey::index_entries(table_id).encode()),
                Direction::Forward,
            )
            .unwrap()
            .count();
        assert_eq!(entries, 1);

        let key = IndexKey::new("by_name", QueryType::IndexFirst);
        other.start_index_scan(&key.serialize().unwrap()).unwrap();
        let rows = drain(&mut other);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_id(), id);
    }

    #[test]
    fn test_truncate_and_counters() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        for i in 0..5 {
            proxy.insert_row(&row(i, Some(i))).unwrap();
        }
        assert_eq!(proxy.increment_auto_increment(5).unwrap(), 1);
        assert_eq!(proxy.get_auto_increment().unwrap(), 6);

        proxy.truncate_table().unwrap();
        assert_eq!(proxy.get_row_count().unwrap(), 0);
        assert_eq!(proxy.get_auto_increment().unwrap(), 6);
        proxy.start_table_scan().unwrap();
        assert!(proxy.get_next_row().unwrap().is_none());
        proxy.end_scan();

        assert_eq!(proxy.set_auto_increment(3).unwrap(), 6);
        assert_eq!(proxy.set_auto_increment(100).unwrap(), 100);
        proxy.truncate_auto_increment().unwrap();
        assert_eq!(proxy.get_auto_increment().unwrap(), 1);
    }

    #[test]
    fn test_add_and_drop_index() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        for (id, name) in [(1, "carol"), (2, "alice"), (3, "bob")] {
            let bytes = Row::new(RowId::NIL)
                .with_record("id", long(id))
                .with_record("name", name.as_bytes().to_vec())
                .serialize()
                .unwrap();
            proxy.insert_row(&bytes).unwrap();
        }

        proxy.add_index("by_name", IndexSchema::new(["name"])).unwrap();
        let key = IndexKey::new("by_name", QueryType::IndexFirst);
        proxy.start_index_scan(&key.serialize().unwrap()).unwrap();
        assert_eq!(ids(&drain(&mut proxy)), vec![2, 3, 1]);
        proxy.end_scan();

        proxy.drop_index("by_name").unwrap();
        assert!(matches!(
            proxy.start_index_scan(&key.serialize().unwrap()),
            Err(HexError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn test_add_unique_index_over_duplicates() {
        let (_factory, mut proxy) = setup(HandlerConfig::default());
        proxy.insert_row(&row(1, Some(7))).unwrap();
        proxy.insert_row(&row(2, Some(7))).unwrap();

        assert!(matches!(
            proxy.add_index("uniq_score", IndexSchema::unique(["score"])),
            Err(HexError::DuplicateKey { .. })
        ));
        assert!(proxy.table().unwrap().index("uniq_score").is_err());
    }

    #[test]
    fn test_rename_and_drop_open_table() {
        let (factory, mut proxy) = setup(HandlerConfig::default());
        proxy.insert_row(&row(1, None)).unwrap();

        proxy.rename_table("t1", "t2").unwrap();
        assert_eq!(proxy.table().unwrap().name, "t2");
        assert!(!factory.catalog().table_exists("t1").unwrap());

        proxy.drop_table("t2").unwrap();
        assert_eq!(proxy.state(), HandlerState::Closed);
        assert!(!factory.catalog().table_exists("t2").unwrap());
    }

    #[test]
    fn test_oversized_key_rejected() {
        let config = HandlerConfig::builder().max_key_size(64).build().unwrap();
        let (_factory, mut proxy) = setup(config);
        proxy.add_index("by_name", IndexSchema::new(["name"])).unwrap();

        let bytes = Row::new(RowId::NIL)
            .with_record("id", long(1))
            .with_record("name", vec![b'x'; 128])
            .serialize()
            .unwrap();
        assert!(matches!(
            proxy.insert_row(&bytes),
            Err(HexError::InvalidKey { .. })
        ));
        assert_eq!(proxy.pending_writes(), 0);
    }

    #[test]
    fn test_store_unavailable_surfaces() {
        let config = HandlerConfig::default();
        let store = Arc::new(MemoryStore::new());
        let factory = HandlerProxyFactory::new(config, store.clone()).unwrap();
        let mut proxy = factory.create_proxy();
        proxy.create_table("t1", schema(), 1).unwrap();
        proxy.open_table("t1").unwrap();
        proxy.insert_row(&row(1, None)).unwrap();

        store.set_available(false);
        let err = proxy.flush().unwrap_err();
        assert!(matches!(err, HexError::StoreUnavailable { .. }));
        assert!(err.is_retryable());
        assert!(proxy.pending_writes() > 0);

        store.set_available(true);
        proxy.flush().unwrap();
        assert_eq!(proxy.pending_writes(), 0);
    }

    #[test]
    fn test_factory_rejects_unconfigured_adapter() {
        let store = Arc::new(MemoryStore::with_name("rocks"));
        assert!(matches!(
            HandlerProxyFactory::new(HandlerConfig::default(), store),
            Err(HexError::InvalidConfig { .. })
        ));
    }
}
