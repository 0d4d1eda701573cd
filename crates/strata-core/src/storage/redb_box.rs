//! # redb-backed Store
//!
//! A disk-backed ordered store using the redb embedded database.
//!
//! Each logical [`Table`] maps to one redb table of `&[u8] -> &[u8]`.
//! A [`WriteBatch`] is applied inside a single redb write transaction, which
//! gives every history mutation:
//! - ACID commit of all fan-out writes
//! - Crash safety (copy-on-write B-trees)
//! - Consistent snapshots for concurrent readers

use super::{Entry, KeyRange, ScanOrder, StoreRead, Table, ValueBox, WriteBatch};
use crate::StrataError;
use redb::{AccessGuard, Database, ReadableDatabase, StorageError, TableDefinition};
use std::path::Path;

fn definition(table: Table) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    TableDefinition::new(table.name())
}

fn io_error(e: impl std::fmt::Display) -> StrataError {
    StrataError::IoError(e.to_string())
}

/// A persistent store over one redb database file.
pub struct RedbBox {
    db: Database,
}

impl std::fmt::Debug for RedbBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBox").finish_non_exhaustive()
    }
}

impl RedbBox {
    /// Open or create a database at the given path.
    ///
    /// Every table is created up front so read transactions never observe a
    /// missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        let write_txn = db.begin_write().map_err(io_error)?;
        for table in Table::ALL {
            let _ = write_txn.open_table(definition(table)).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db })
    }
}

fn collect_entries<'a, I>(entries: I, limit: usize) -> Result<Vec<Entry>, StrataError>
where
    I: Iterator<
        Item = Result<
            (
                AccessGuard<'a, &'static [u8]>,
                AccessGuard<'a, &'static [u8]>,
            ),
            StorageError,
        >,
    >,
{
    let mut out = Vec::new();
    for entry in entries.take(limit) {
        let (key, value) = entry.map_err(io_error)?;
        out.push((key.value().to_vec(), value.value().to_vec()));
    }
    Ok(out)
}

impl StoreRead for RedbBox {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StrataError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let handle = read_txn.open_table(definition(table)).map_err(io_error)?;
        Ok(handle
            .get(key)
            .map_err(io_error)?
            .map(|value| value.value().to_vec()))
    }

    fn scan(
        &self,
        table: Table,
        range: &KeyRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, StrataError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let handle = read_txn.open_table(definition(table)).map_err(io_error)?;
        let iter = handle.range::<&[u8]>(range.bounds()).map_err(io_error)?;
        let limit = limit.unwrap_or(usize::MAX);
        match order {
            ScanOrder::Ascending => collect_entries(iter, limit),
            ScanOrder::Descending => collect_entries(iter.rev(), limit),
        }
    }
}

impl ValueBox for RedbBox {
    fn commit(&mut self, batch: WriteBatch) -> Result<(), StrataError> {
        if batch.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(io_error)?;
        for (table, writes) in batch.tables() {
            let mut handle = write_txn.open_table(definition(table)).map_err(io_error)?;
            for (key, write) in writes {
                match write {
                    Some(value) => {
                        handle
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(io_error)?;
                    }
                    None => {
                        handle.remove(key.as_slice()).map_err(io_error)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
