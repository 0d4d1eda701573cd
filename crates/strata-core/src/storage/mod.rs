//! # Storage Primitive
//!
//! Ordered byte-keyed tables behind two traits:
//!
//! - [`StoreRead`]: point lookup and directional range scan.
//! - [`ValueBox`]: a readable store that applies a [`WriteBatch`] atomically.
//!
//! ## Backends
//!
//! | Backend | Type | Durability |
//! |---------|------|------------|
//! | In-memory | [`MemoryBox`] | process lifetime |
//! | Persistent | [`RedbBox`] | ACID via redb |
//!
//! [`StorageBackend`] wraps either one so callers can pick at runtime.
//!
//! ## Transactions
//!
//! Every public mutation builds a [`Transaction`] overlay over the store,
//! reads its own writes through it, and hands the resulting batch to
//! [`ValueBox::commit`] once. Either the whole batch lands or nothing does.

mod keys;
mod memory;
mod redb_box;
mod transaction;

pub use keys::{KeyBuilder, KeyReader};
pub use memory::MemoryBox;
pub use redb_box::RedbBox;
pub use transaction::Transaction;

use crate::StrataError;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Bound;
use std::path::Path;

// =============================================================================
// TABLES
// =============================================================================

/// Logical tables of a history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Primary message/hole index per `(peer, namespace)`.
    Index,
    /// Tag-scoped mirror entries.
    Tags,
    /// Shared reference-counted media.
    Media,
    /// Per-tag summary counters.
    Summaries,
    /// Pending actions by `(type, message)`.
    PendingActions,
    /// Pending action types by message, for cascading removal.
    PendingByMessage,
    /// Pending action counters.
    PendingCounts,
    /// Inverted text index: token -> message.
    TextTokens,
    /// Forward text index: message -> tokens.
    TextMessages,
    /// Unsent message queue.
    Unsent,
    /// Globally unique id -> message id.
    GlobalIds,
    /// Stored peer directory.
    Peers,
    /// Engine counters.
    Metadata,
}

impl Table {
    pub const ALL: [Table; 13] = [
        Table::Index,
        Table::Tags,
        Table::Media,
        Table::Summaries,
        Table::PendingActions,
        Table::PendingByMessage,
        Table::PendingCounts,
        Table::TextTokens,
        Table::TextMessages,
        Table::Unsent,
        Table::GlobalIds,
        Table::Peers,
        Table::Metadata,
    ];

    /// Persistent table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Index => "history_index",
            Table::Tags => "history_tags",
            Table::Media => "media",
            Table::Summaries => "tag_summaries",
            Table::PendingActions => "pending_actions",
            Table::PendingByMessage => "pending_by_message",
            Table::PendingCounts => "pending_counts",
            Table::TextTokens => "text_tokens",
            Table::TextMessages => "text_messages",
            Table::Unsent => "unsent",
            Table::GlobalIds => "global_ids",
            Table::Peers => "peers",
            Table::Metadata => "metadata",
        }
    }
}

// =============================================================================
// RANGES
// =============================================================================

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// A half-open key range `[start, end)`. `end = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    /// `[start, end)`.
    #[must_use]
    pub fn between(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// `[start, end]`.
    #[must_use]
    pub fn inclusive(start: Vec<u8>, end: &[u8]) -> Self {
        Self {
            start,
            end: Some(successor(end)),
        }
    }

    /// Every key starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = prefix_end(&prefix);
        Self { start: prefix, end }
    }

    /// True when no key can fall inside the range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end.as_deref().is_some_and(|end| end <= self.start.as_slice())
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().is_none_or(|end| key < end)
    }

    /// Range bounds usable by `BTreeMap::range` and redb. An empty range
    /// maps to `[start, start)`, which both accept without panicking.
    #[must_use]
    pub fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let start = self.start.as_slice();
        if self.is_empty() {
            return (Bound::Included(start), Bound::Excluded(start));
        }
        match self.end.as_deref() {
            Some(end) => (Bound::Included(start), Bound::Excluded(end)),
            None => (Bound::Included(start), Bound::Unbounded),
        }
    }
}

/// Smallest key strictly greater than every key with this prefix.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Smallest key strictly greater than `key`.
fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

/// Iterate the entries of an ordered byte map inside `range`.
pub(crate) fn range_of<'m, V>(
    map: &'m BTreeMap<Vec<u8>, V>,
    range: &KeyRange,
) -> btree_map::Range<'m, Vec<u8>, V> {
    map.range::<[u8], _>(range.bounds())
}

// =============================================================================
// TRAITS
// =============================================================================

/// One scanned `(key, value)` pair.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Read access to an ordered byte store.
pub trait StoreRead {
    /// Point lookup.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError>;

    /// Ordered scan of `range`, at most `limit` entries when given.
    fn scan(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StrataError>;

    /// First entry of `range` in the given order.
    fn first(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
    ) -> Result<Option<Entry>, StrataError> {
        Ok(self.scan(table, range, order, Some(1))?.into_iter().next())
    }
}

/// A store that applies write batches atomically.
pub trait ValueBox: StoreRead {
    /// Apply every write of `batch`, or none of them.
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StrataError>;
}

/// Pending writes: `Some(value)` sets, `None` removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    tables: BTreeMap<Table, BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.tables.entry(table).or_default().insert(key, Some(value));
    }

    pub fn remove(&mut self, table: Table, key: Vec<u8>) {
        self.tables.entry(table).or_default().insert(key, None);
    }

    /// The pending write for `key`: `Some(None)` is a pending removal.
    #[must_use]
    pub fn lookup(&self, table: Table, key: &[u8]) -> Option<Option<&[u8]>> {
        self.tables
            .get(&table)
            .and_then(|writes| writes.get(key))
            .map(|write| write.as_deref())
    }

    /// Writes of one table in key order.
    #[must_use]
    pub fn table(&self, table: Table) -> Option<&BTreeMap<Vec<u8>, Option<Vec<u8>>>> {
        self.tables.get(&table)
    }

    /// Every table with at least one write.
    pub fn tables(&self) -> impl Iterator<Item = (Table, &BTreeMap<Vec<u8>, Option<Vec<u8>>>)> {
        self.tables.iter().map(|(table, writes)| (*table, writes))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// BTreeMap tables, lost on drop.
    InMemory(MemoryBox),
    /// redb database file.
    Persistent(RedbBox),
}

impl StorageBackend {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(MemoryBox::new())
    }

    /// Open or create a redb database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        Ok(Self::Persistent(RedbBox::open(path)?))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl StoreRead for StorageBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        match self {
            Self::InMemory(store) => store.get(table, key),
            Self::Persistent(store) => store.get(table, key),
        }
    }

    fn scan(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StrataError> {
        match self {
            Self::InMemory(store) => store.scan(table, range, order, limit),
            Self::Persistent(store) => store.scan(table, range, order, limit),
        }
    }
}

impl ValueBox for StorageBackend {
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StrataError> {
        match self {
            Self::InMemory(store) => store.commit(batch),
            Self::Persistent(store) => store.commit(batch),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn prefix_range_covers_extensions_only() {
        let range = KeyRange::prefix(vec![1, 2]);
        assert!(range.contains(&[1, 2]));
        assert!(range.contains(&[1, 2, 255, 255]));
        assert!(!range.contains(&[1, 3]));
        assert!(!range.contains(&[1, 1, 9]));
        assert_eq!(range.end, Some(vec![1, 3]));
    }

    #[test]
    fn prefix_of_max_bytes_is_unbounded() {
        let range = KeyRange::prefix(vec![255, 255]);
        assert_eq!(range.end, None);
        assert!(range.contains(&[255, 255, 0]));
    }

    #[test]
    fn inverted_range_is_empty() {
        let range = KeyRange::between(vec![5], vec![3]);
        assert!(range.is_empty());
        assert!(!range.contains(&[4]));

        let mut map = BTreeMap::new();
        map.insert(vec![4u8], 1);
        assert_eq!(range_of(&map, &range).count(), 0);
    }

    #[test]
    fn inclusive_range_keeps_end() {
        let range = KeyRange::inclusive(vec![1], &[3]);
        assert!(range.contains(&[3]));
        assert!(!range.contains(&[3, 1]));
    }

    #[test]
    fn batch_records_removals() {
        let mut batch = WriteBatch::new();
        batch.set(Table::Index, vec![1], vec![9]);
        batch.remove(Table::Index, vec![2]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.lookup(Table::Index, &[1]), Some(Some(&[9u8][..])));
        assert_eq!(batch.lookup(Table::Index, &[2]), Some(None));
        assert_eq!(batch.lookup(Table::Media, &[1]), None);
    }
}
