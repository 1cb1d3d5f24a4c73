//! # hexkv-store
//!
//! The backing-store interface hexkv runs on, and an in-memory reference
//! implementation.
//!
//! A store is one globally sorted byte-string keyspace offering point
//! reads and writes, ordered range scans in either direction, atomic write
//! batches and an explicit flush. Keys are ordered byte-lexicographically.
//!
//! ## Example
//!
//! ```rust
//! use hexkv_common::types::{Key, Value};
//! use hexkv_store::{Direction, KeyRange, KvStore, MemoryStore, WriteBatch};
//!
//! let store = MemoryStore::new();
//! let mut batch = WriteBatch::new();
//! batch.put(Key::from_bytes(b"a"), Value::from_bytes(b"1"));
//! batch.put(Key::from_bytes(b"b"), Value::from_bytes(b"2"));
//! store.write_batch(batch).unwrap();
//!
//! let keys: Vec<_> = store
//!     .scan(KeyRange::all(), Direction::Backward)
//!     .unwrap()
//!     .map(|entry| entry.key)
//!     .collect();
//! assert_eq!(keys, vec![Key::from_bytes(b"b"), Key::from_bytes(b"a")]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
mod error;
mod memory;
mod range;

use std::fmt;

use hexkv_common::types::{Key, Value};

pub use batch::{BatchOp, WriteBatch};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreStats};
pub use range::{Direction, KeyRange, StoreEntry};

/// Iterator over the entries of one scan, in scan direction.
///
/// A scanner holds a snapshot of the range taken when the scan started, so
/// writes made while it is alive do not change what it yields. Dropping it
/// releases the snapshot.
pub type StoreScanner = Box<dyn Iterator<Item = StoreEntry> + Send>;

/// A sorted byte-string keyspace.
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Adapter name of this store.
    fn name(&self) -> &str;

    /// Reads the value stored under `key`.
    fn get(&self, key: &Key) -> StoreResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: Key, value: Value) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &Key) -> StoreResult<()>;

    /// Starts an ordered scan over `range`.
    fn scan(&self, range: KeyRange, direction: Direction) -> StoreResult<StoreScanner>;

    /// Applies every operation of `batch` atomically, in order.
    fn write_batch(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Makes all previously applied writes durable and visible.
    fn flush(&self) -> StoreResult<()>;
}
