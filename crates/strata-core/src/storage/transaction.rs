//! Write overlay over a readable store.

use super::{Entry, KeyRange, ScanOrder, StoreRead, Table, WriteBatch, range_of};
use crate::StrataError;
use std::collections::BTreeMap;

/// Buffered writes on top of a read snapshot.
///
/// Reads through the transaction observe its own pending writes, including
/// removals, so multi-step logic (split, merge, counter updates) can read
/// back what it just wrote. Nothing reaches the base store until the batch
/// from [`Transaction::into_batch`] is committed.
pub struct Transaction<'a> {
    base: &'a dyn StoreRead,
    writes: WriteBatch,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("pending_writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Transaction<'a> {
    #[must_use]
    pub fn new(base: &'a dyn StoreRead) -> Self {
        Self {
            base,
            writes: WriteBatch::new(),
        }
    }

    pub fn set(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.writes.set(table, key, value);
    }

    pub fn remove(&mut self, table: Table, key: Vec<u8>) {
        self.writes.remove(table, key);
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn into_batch(self) -> WriteBatch {
        self.writes
    }
}

impl StoreRead for Transaction<'_> {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        match self.writes.lookup(table, key) {
            Some(write) => Ok(write.map(<[u8]>::to_vec)),
            None => self.base.get(table, key),
        }
    }

    fn scan(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StrataError> {
        let Some(overlay) = self.writes.table(table) else {
            return self.base.scan(table, range, order, limit);
        };
        let overlay: Vec<(&Vec<u8>, &Option<Vec<u8>>)> = range_of(overlay, range).collect();
        if overlay.is_empty() {
            return self.base.scan(table, range, order, limit);
        }

        // Every overlay key can shadow at most one base entry.
        let base_limit = limit.map(|limit| limit.saturating_add(overlay.len()));
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .base
            .scan(table, range, order, base_limit)?
            .into_iter()
            .collect();

        // A truncated base scan only covers keys up to its last entry; overlay
        // sets past that point would jump the queue of unseen base keys.
        let frontier = match base_limit {
            Some(base_limit) if merged.len() >= base_limit => match order {
                ScanOrder::Ascending => merged.keys().next_back().cloned(),
                ScanOrder::Descending => merged.keys().next().cloned(),
            },
            _ => None,
        };

        for (key, write) in overlay {
            let beyond = frontier.as_ref().is_some_and(|frontier| match order {
                ScanOrder::Ascending => key > frontier,
                ScanOrder::Descending => key < frontier,
            });
            match write {
                Some(value) if !beyond => {
                    merged.insert(key.clone(), value.clone());
                }
                Some(_) => {}
                None => {
                    merged.remove(key);
                }
            }
        }

        let limit = limit.unwrap_or(usize::MAX);
        Ok(match order {
            ScanOrder::Ascending => merged.into_iter().take(limit).collect(),
            ScanOrder::Descending => merged.into_iter().rev().take(limit).collect(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBox, ValueBox};

    fn base() -> MemoryBox {
        let mut store = MemoryBox::new();
        let mut batch = WriteBatch::new();
        for i in [10u8, 20, 30, 40] {
            batch.set(Table::Index, vec![i], vec![i]);
        }
        store.commit(batch).expect("commit");
        store
    }

    fn keys(entries: &[Entry]) -> Vec<u8> {
        entries.iter().map(|(k, _)| k[0]).collect()
    }

    #[test]
    fn reads_see_own_writes() {
        let store = base();
        let mut txn = Transaction::new(&store);
        txn.set(Table::Index, vec![15], vec![1]);
        txn.remove(Table::Index, vec![20]);

        assert_eq!(txn.get(Table::Index, &[15]).expect("get"), Some(vec![1]));
        assert_eq!(txn.get(Table::Index, &[20]).expect("get"), None);
        assert_eq!(txn.get(Table::Index, &[30]).expect("get"), Some(vec![30]));

        let all = txn
            .scan(Table::Index, &KeyRange::prefix(Vec::new()), ScanOrder::Ascending, None)
            .expect("scan");
        assert_eq!(keys(&all), vec![10, 15, 30, 40]);
    }

    #[test]
    fn limited_scan_skips_removed_entries() {
        let store = base();
        let mut txn = Transaction::new(&store);
        txn.remove(Table::Index, vec![40]);
        txn.remove(Table::Index, vec![30]);

        let top = txn
            .scan(Table::Index, &KeyRange::prefix(Vec::new()), ScanOrder::Descending, Some(1))
            .expect("scan");
        assert_eq!(keys(&top), vec![20]);
    }

    #[test]
    fn limited_scan_orders_overlay_sets() {
        let store = base();
        let mut txn = Transaction::new(&store);
        txn.set(Table::Index, vec![5], vec![5]);
        txn.set(Table::Index, vec![50], vec![50]);

        let first_two = txn
            .scan(Table::Index, &KeyRange::prefix(Vec::new()), ScanOrder::Ascending, Some(2))
            .expect("scan");
        assert_eq!(keys(&first_two), vec![5, 10]);
    }

    #[test]
    fn batch_reaches_store_only_on_commit() {
        let mut store = base();
        let batch = {
            let mut txn = Transaction::new(&store);
            txn.set(Table::Media, vec![1], vec![1]);
            assert_eq!(txn.pending(), 1);
            txn.into_batch()
        };
        assert_eq!(store.get(Table::Media, &[1]).expect("get"), None);

        store.commit(batch).expect("commit");
        assert_eq!(store.get(Table::Media, &[1]).expect("get"), Some(vec![1]));
    }
}
