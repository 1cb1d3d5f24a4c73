//! Atomic write batches.

use hexkv_common::types::{Key, Value};

/// One operation of a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store a value.
    Put {
        /// Target key.
        key: Key,
        /// New value.
        value: Value,
    },
    /// Remove a key.
    Delete {
        /// Target key.
        key: Key,
    },
}

impl BatchOp {
    /// Returns the key this operation touches.
    pub fn key(&self) -> &Key {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// An ordered group of writes applied all-or-nothing.
///
/// Later operations on the same key win, exactly as if they had been
/// applied one after another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    size_bytes: usize,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: Key, value: Value) {
        self.size_bytes += key.len() + value.len();
        self.ops.push(BatchOp::Put { key, value });
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: Key) {
        self.size_bytes += key.len();
        self.ops.push(BatchOp::Delete { key });
    }

    /// Appends all operations of `other` after this batch's operations.
    pub fn append(&mut self, other: WriteBatch) {
        self.size_bytes += other.size_bytes;
        self.ops.extend(other.ops);
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total key and value bytes queued.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Returns the queued operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the most recent queued state of `key`: `Some(Some(v))` for a
    /// pending put, `Some(None)` for a pending delete, `None` if untouched.
    pub fn pending(&self, key: &Key) -> Option<Option<&Value>> {
        self.ops.iter().rev().find(|op| op.key() == key).map(|op| match op {
            BatchOp::Put { value, .. } => Some(value),
            BatchOp::Delete { .. } => None,
        })
    }

    /// Removes and returns all operations, leaving the batch empty.
    pub fn take(&mut self) -> WriteBatch {
        std::mem::take(self)
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
