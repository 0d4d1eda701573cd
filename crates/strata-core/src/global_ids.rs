//! Globally unique id to message id mapping.

use crate::codec::{from_bytes, to_bytes};
use crate::storage::{KeyBuilder, StoreRead, Table, Transaction};
use crate::{MessageId, PeerId, StrataError};

fn gid_key(peer_id: PeerId, globally_unique_id: i64) -> Vec<u8> {
    KeyBuilder::new()
        .i64(peer_id.0)
        .i64(globally_unique_id)
        .build()
}

pub fn lookup(
    store: &dyn StoreRead,
    peer_id: PeerId,
    globally_unique_id: i64,
) -> Result<Option<MessageId>, StrataError> {
    store
        .get(Table::GlobalIds, &gid_key(peer_id, globally_unique_id))?
        .map(|bytes| from_bytes(&bytes))
        .transpose()
}

pub(crate) fn set(
    txn: &mut Transaction<'_>,
    id: MessageId,
    globally_unique_id: i64,
) -> Result<(), StrataError> {
    txn.set(
        Table::GlobalIds,
        gid_key(id.peer_id, globally_unique_id),
        to_bytes(&id)?,
    );
    Ok(())
}

/// Drop the mapping if it still points at `id`.
pub(crate) fn remove(
    txn: &mut Transaction<'_>,
    id: MessageId,
    globally_unique_id: i64,
) -> Result<(), StrataError> {
    if lookup(txn, id.peer_id, globally_unique_id)? == Some(id) {
        txn.remove(Table::GlobalIds, gid_key(id.peer_id, globally_unique_id));
    }
    Ok(())
}
