//! # hexkv-test
//!
//! Integration tests for hexkv.
//!
//! The tests under `tests/` drive the handler protocol end to end against
//! the in-memory store. This library holds their shared fixtures.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

use hexkv_common::types::RowId;
use hexkv_common::{HandlerConfig, HexResult};
use hexkv_engine::{
    ColumnSchema, ColumnType, HandlerProxy, HandlerProxyFactory, IndexSchema, Row, TableSchema,
};
use hexkv_store::MemoryStore;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber, once per process.
///
/// Set `RUST_LOG=hexkv_engine=debug` to see handler logs in test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A factory over an in-memory store the test can reach directly.
pub struct TestEnv {
    /// The store behind every handle.
    pub store: Arc<MemoryStore>,
    /// The handle factory.
    pub factory: HandlerProxyFactory,
}

impl TestEnv {
    /// Creates an environment with the given configuration.
    pub fn new(config: HandlerConfig) -> HexResult<Self> {
        init_tracing();
        let store = Arc::new(MemoryStore::with_name(config.default_adapter.clone()));
        let factory = HandlerProxyFactory::new(config, store.clone())?;
        Ok(Self { store, factory })
    }

    /// Creates `name` with [`people_schema`] and returns a handle with it
    /// open.
    pub fn open_people(&self, name: &str) -> HexResult<HandlerProxy> {
        let mut proxy = self.factory.create_proxy();
        proxy.create_table(name, people_schema(), 1)?;
        proxy.open_table(name)?;
        Ok(proxy)
    }
}

/// `id` (unique), `name`, `age` (indexed) and a nullable `note`.
pub fn people_schema() -> TableSchema {
    TableSchema::new()
        .with_column("id", ColumnSchema::new(ColumnType::Long).not_null())
        .with_column("name", ColumnSchema::new(ColumnType::String).with_max_length(64))
        .with_column("age", ColumnSchema::new(ColumnType::Long))
        .with_column("note", ColumnSchema::new(ColumnType::Binary))
        .with_index("by_id", IndexSchema::unique(["id"]))
        .with_index("by_age", IndexSchema::new(["age"]))
        .with_index("by_name_age", IndexSchema::new(["name", "age"]))
}

/// Builds a person row without identity.
pub fn person(id: i64, name: &str, age: Option<i64>) -> Row {
    let mut row = Row::new(RowId::NIL)
        .with_record("id", id.to_be_bytes().to_vec())
        .with_record("name", name.as_bytes().to_vec());
    if let Some(age) = age {
        row.set("age", age.to_be_bytes().to_vec());
    }
    row
}

/// Reads the `id` column of a row.
pub fn id_of(row: &Row) -> Option<i64> {
    let bytes: [u8; 8] = row.get("id")?.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

/// Drains the live scan of `proxy`.
pub fn drain(proxy: &mut HandlerProxy) -> HexResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(bytes) = proxy.get_next_row()? {
        rows.push(Row::deserialize(&bytes)?);
    }
    Ok(rows)
}
