//! Queue of outgoing messages that still await delivery.

use crate::operations::{HistoryChanges, UnsentOperation};
use crate::storage::{KeyBuilder, KeyRange, KeyReader, ScanOrder, StoreRead, Table, Transaction};
use crate::{MessageId, PeerId, StrataError};

fn unsent_key(id: MessageId) -> Vec<u8> {
    KeyBuilder::new()
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .build()
}

/// Every queued message id, ordered by `(peer, namespace, id)`.
pub fn ids(store: &dyn StoreRead) -> Result<Vec<MessageId>, StrataError> {
    store
        .scan(
            Table::Unsent,
            &KeyRange::prefix(Vec::new()),
            ScanOrder::Ascending,
            None,
        )?
        .into_iter()
        .map(|(key, _)| {
            let mut reader = KeyReader::new(&key);
            Ok(MessageId::new(
                PeerId(reader.i64()?),
                reader.i32()?,
                reader.i32()?,
            ))
        })
        .collect()
}

pub(crate) fn insert(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    id: MessageId,
) -> Result<(), StrataError> {
    if txn.get(Table::Unsent, &unsent_key(id))?.is_none() {
        txn.set(Table::Unsent, unsent_key(id), Vec::new());
        changes.unsent.push(UnsentOperation::Insert(id));
    }
    Ok(())
}

pub(crate) fn remove(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    id: MessageId,
) -> Result<(), StrataError> {
    if txn.get(Table::Unsent, &unsent_key(id))?.is_some() {
        txn.remove(Table::Unsent, unsent_key(id));
        changes.unsent.push(UnsentOperation::Remove(id));
    }
    Ok(())
}
