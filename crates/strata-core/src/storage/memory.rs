//! In-memory ordered store.

use super::{Entry, KeyRange, ScanOrder, StoreRead, Table, ValueBox, WriteBatch, range_of};
use crate::StrataError;
use std::collections::BTreeMap;

/// BTreeMap-backed store. Deterministic ordering, no durability.
#[derive(Debug, Clone, Default)]
pub struct MemoryBox {
    tables: BTreeMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored in `table`.
    #[must_use]
    pub fn table_len(&self, table: Table) -> usize {
        self.tables.get(&table).map_or(0, BTreeMap::len)
    }
}

impl StoreRead for MemoryBox {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        Ok(self
            .tables
            .get(&table)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn scan(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StrataError> {
        let Some(entries) = self.tables.get(&table) else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(usize::MAX);
        let iter = range_of(entries, range).map(|(k, v)| (k.clone(), v.clone()));
        Ok(match order {
            ScanOrder::Ascending => iter.take(limit).collect(),
            ScanOrder::Descending => iter.rev().take(limit).collect(),
        })
    }
}

impl ValueBox for MemoryBox {
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StrataError> {
        for (table, writes) in batch.tables() {
            let entries = self.tables.entry(table).or_default();
            for (key, write) in writes {
                match write {
                    Some(value) => {
                        entries.insert(key.clone(), value.clone());
                    }
                    None => {
                        entries.remove(key);
                    }
                }
            }
        }
        Ok(())
    }
}
