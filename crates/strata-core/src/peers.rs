//! # Peer Directory
//!
//! Author lookup for rendered messages.
//!
//! Rendering only needs `lookup(peer) -> Peer?`; a missing peer is a
//! recoverable rendering gap. [`PeerTable`] is the stored implementation,
//! backed by the `Peers` table. Any other directory (a `BTreeMap`, an
//! application cache) can be passed wherever a [`PeerDirectory`] is taken.

use crate::codec::{from_bytes, to_bytes};
use crate::storage::{KeyBuilder, StoreRead, Table, Transaction};
use crate::{Peer, PeerId, StrataError};
use std::collections::BTreeMap;

/// Resolves peer ids to peers.
pub trait PeerDirectory {
    fn lookup(&self, id: PeerId) -> Option<Peer>;
}

impl PeerDirectory for BTreeMap<PeerId, Peer> {
    fn lookup(&self, id: PeerId) -> Option<Peer> {
        self.get(&id).cloned()
    }
}

/// Log a storage error and convert to absence.
///
/// Directory lookups are best-effort: a failing read must not fail a listing.
fn log_and_convert<T>(result: Result<Option<T>, StrataError>, peer: PeerId) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(peer = peer.0, error = %e, "peer directory read failed");
            None
        }
    }
}

fn peer_key(id: PeerId) -> Vec<u8> {
    KeyBuilder::new().i64(id.0).build()
}

/// Peer directory stored alongside the history.
#[derive(Clone, Copy)]
pub struct PeerTable<'a> {
    store: &'a dyn StoreRead,
}

impl std::fmt::Debug for PeerTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTable").finish_non_exhaustive()
    }
}

impl<'a> PeerTable<'a> {
    #[must_use]
    pub fn new(store: &'a dyn StoreRead) -> Self {
        Self { store }
    }

    pub fn get(&self, id: PeerId) -> Result<Option<Peer>, StrataError> {
        self.store
            .get(Table::Peers, &peer_key(id))?
            .map(|bytes| from_bytes(&bytes))
            .transpose()
    }
}

impl PeerDirectory for PeerTable<'_> {
    fn lookup(&self, id: PeerId) -> Option<Peer> {
        log_and_convert(self.get(id), id)
    }
}

pub(crate) fn set(txn: &mut Transaction<'_>, peer: &Peer) -> Result<(), StrataError> {
    txn.set(Table::Peers, peer_key(peer.id), to_bytes(peer)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBox, ValueBox};

    #[test]
    fn stored_peers_resolve() {
        let mut store = MemoryBox::new();
        let batch = {
            let mut txn = Transaction::new(&store);
            set(&mut txn, &Peer::new(PeerId(4), "kim")).expect("set");
            txn.into_batch()
        };
        store.commit(batch).expect("commit");

        let table = PeerTable::new(&store);
        assert_eq!(table.lookup(PeerId(4)).map(|p| p.name), Some("kim".to_string()));
        assert!(table.lookup(PeerId(5)).is_none());
    }

    #[test]
    fn map_directory() {
        let mut peers = BTreeMap::new();
        peers.insert(PeerId(1), Peer::new(PeerId(1), "ana"));
        assert!(peers.lookup(PeerId(1)).is_some());
        assert!(peers.lookup(PeerId(2)).is_none());
    }

    #[test]
    fn corrupt_entry_is_absent() {
        let mut store = MemoryBox::new();
        let mut batch = crate::storage::WriteBatch::new();
        batch.set(Table::Peers, peer_key(PeerId(9)), vec![0xff; 3]);
        store.commit(batch).expect("commit");

        let table = PeerTable::new(&store);
        assert!(table.get(PeerId(9)).is_err());
        assert!(table.lookup(PeerId(9)).is_none());
    }
}
