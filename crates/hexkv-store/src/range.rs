//! Key ranges and scan entries.

use hexkv_common::types::{Key, Value};
use std::ops::Bound;

/// Direction of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Backward,
}

impl Direction {
    /// Returns true for ascending scans.
    #[inline]
    pub fn is_forward(self) -> bool {
        self == Self::Forward
    }
}

/// A key-value pair returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// The key.
    pub key: Key,
    /// The value.
    pub value: Value,
}

impl StoreEntry {
    /// Creates a new entry.
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }
}

/// Range bounds for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Start bound.
    pub start: Bound<Key>,
    /// End bound.
    pub end: Bound<Key>,
}

impl KeyRange {
    /// Creates a range covering all keys.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Creates a range from start (inclusive) to end (exclusive).
    pub fn new(start: Key, end: Key) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Excluded(end),
        }
    }

    /// Creates a range from start (inclusive) to an optional end (exclusive).
    ///
    /// `None` leaves the range open at the top, which is what a prefix
    /// without a successor (all `0xFF`) needs.
    pub fn half_open(start: Key, end: Option<Key>) -> Self {
        Self {
            start: Bound::Included(start),
            end: end.map_or(Bound::Unbounded, Bound::Excluded),
        }
    }

    /// Creates a range with a prefix (all keys starting with the prefix).
    pub fn prefix(prefix: Key) -> Self {
        let end = prefix.prefix_successor();
        Self::half_open(prefix, end)
    }

    /// Checks if a key is within the range.
    pub fn contains(&self, key: &Key) -> bool {
        let after_start = match &self.start {
            Bound::Included(start) => key >= start,
            Bound::Excluded(start) => key > start,
            Bound::Unbounded => true,
        };

        let before_end = match &self.end {
            Bound::Included(end) => key <= end,
            Bound::Excluded(end) => key < end,
            Bound::Unbounded => true,
        };

        after_start && before_end
    }

    /// Returns true if no key can fall inside the range.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            (Bound::Included(s), Bound::Included(e)) => s > e,
            _ => false,
        }
    }

    /// Returns the bounds as a tuple usable with `BTreeMap::range`.
    pub fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (self.start.as_ref(), self.end.as_ref())
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}
