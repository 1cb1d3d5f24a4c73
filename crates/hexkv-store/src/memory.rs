//! In-memory reference store.
//!
//! `MemoryStore` keeps the whole keyspace in a `BTreeMap`, which gives the
//! byte-lexicographic order every adapter must provide. Scans copy the
//! requested range out under the read lock, so a scanner never observes
//! writes made after it was created.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use hexkv_common::constants::DEFAULT_ADAPTER;
use hexkv_common::types::{Key, Value};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StoreError, StoreResult};
use crate::range::{Direction, KeyRange, StoreEntry};
use crate::{KvStore, StoreScanner};

/// Operation counters of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Point reads served.
    pub gets: u64,
    /// Single puts applied.
    pub puts: u64,
    /// Single deletes applied.
    pub deletes: u64,
    /// Scans started.
    pub scans: u64,
    /// Write batches applied.
    pub batches: u64,
    /// Flushes completed.
    pub flushes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    batches: AtomicU64,
    flushes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn snapshot(&self) -> StoreStats {
        StoreStats {
            gets: self.gets.load(AtomicOrdering::Relaxed),
            puts: self.puts.load(AtomicOrdering::Relaxed),
            deletes: self.deletes.load(AtomicOrdering::Relaxed),
            scans: self.scans.load(AtomicOrdering::Relaxed),
            batches: self.batches.load(AtomicOrdering::Relaxed),
            flushes: self.flushes.load(AtomicOrdering::Relaxed),
        }
    }
}

/// A thread-safe in-memory store.
///
/// Availability can be switched off to exercise failure paths: while
/// unavailable, every call fails with [`StoreError::Unavailable`] and no
/// state changes.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    data: RwLock<BTreeMap<Key, Value>>,
    available: AtomicBool,
    counters: Counters,
}

impl MemoryStore {
    /// Creates an empty store under the default adapter name.
    pub fn new() -> Self {
        Self::with_name(DEFAULT_ADAPTER)
    }

    /// Creates an empty store under the given adapter name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Switches availability on or off.
    pub fn set_available(&self, available: bool) {
        debug!(store = %self.name, available, "memory store availability changed");
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Returns the operation counters.
    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    /// Returns every key currently stored, in order.
    pub fn keys(&self) -> Vec<Key> {
        self.data.read().keys().cloned().collect()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable(&self.name, "store is offline"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &Key) -> StoreResult<Option<Value>> {
        self.check_available()?;
        Counters::bump(&self.counters.gets);
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: Key, value: Value) -> StoreResult<()> {
        self.check_available()?;
        Counters::bump(&self.counters.puts);
        self.data.write().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &Key) -> StoreResult<()> {
        self.check_available()?;
        Counters::bump(&self.counters.deletes);
        self.data.write().remove(key);
        Ok(())
    }

    fn scan(&self, range: KeyRange, direction: Direction) -> StoreResult<StoreScanner> {
        self.check_available()?;
        Counters::bump(&self.counters.scans);

        if range.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let mut entries: Vec<StoreEntry> = self
            .data
            .read()
            .range(range.as_bounds())
            .map(|(k, v)| StoreEntry::new(k.clone(), v.clone()))
            .collect();
        if direction == Direction::Backward {
            entries.reverse();
        }

        trace!(store = %self.name, entries = entries.len(), ?direction, "scan snapshot taken");
        Ok(Box::new(entries.into_iter()))
    }

    fn write_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        self.check_available()?;
        if batch.is_empty() {
            return Ok(());
        }
        Counters::bump(&self.counters.batches);

        let ops = batch.len();
        let mut data = self.data.write();
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        trace!(store = %self.name, ops, "write batch applied");
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.check_available()?;
        Counters::bump(&self.counters.flushes);
        Ok(())
    }
}
