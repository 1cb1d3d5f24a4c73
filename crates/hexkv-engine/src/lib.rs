//! # hexkv-engine
//!
//! Maps relational tables onto one sorted byte-string keyspace and drives
//! them through the storage handler protocol.
//!
//! ## Layers
//!
//! - **encoding**: order-preserving varints and index column values
//! - **rowkey**: the typed key model; every key the engine writes is a
//!   [`RowKey`] and sorts exactly like its encoding
//! - **schema** / **row**: table definitions, rows and index search keys,
//!   with their serialized forms
//! - **catalog**: table metadata, ids and counters
//! - **cursor**: table and index scans over store ranges
//! - **handler**: the per-handle protocol state machine and write buffer
//!
//! ## Example
//!
//! ```rust
//! use hexkv_common::HandlerConfig;
//! use hexkv_common::types::RowId;
//! use hexkv_engine::{
//!     ColumnSchema, ColumnType, HandlerProxyFactory, Row, TableSchema,
//! };
//!
//! let factory = HandlerProxyFactory::in_memory(HandlerConfig::default()).unwrap();
//! let mut proxy = factory.create_proxy();
//!
//! let schema = TableSchema::new().with_column("v", ColumnSchema::new(ColumnType::String));
//! proxy.create_table("t1", schema, 1).unwrap();
//! proxy.open_table("t1").unwrap();
//!
//! let row = Row::new(RowId::NIL).with_record("v", b"hello".to_vec());
//! let id = proxy.insert_row(&row.serialize().unwrap()).unwrap();
//!
//! proxy.start_table_scan().unwrap();
//! let first = Row::deserialize(&proxy.get_next_row().unwrap().unwrap()).unwrap();
//! assert_eq!(first.row_id(), id);
//! assert!(proxy.get_next_row().unwrap().is_none());
//! proxy.end_scan();
//! proxy.close_table().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod cursor;
pub mod encoding;
pub mod handler;
pub mod row;
pub mod rowkey;
pub mod schema;

pub use catalog::{Catalog, TableInfo};
pub use cursor::{ScanCursor, ScanTarget};
pub use encoding::IndexValue;
pub use handler::{HandlerProxy, HandlerProxyFactory, HandlerState};
pub use row::Row;
pub use rowkey::RowKey;
pub use schema::{ColumnSchema, ColumnType, IndexKey, IndexSchema, QueryType, TableSchema};
