//! # Pending Action Queue
//!
//! Per-message, per-type action records with exact running counters.
//!
//! ## Tables
//!
//! - `PendingActions`: `(type, peer, namespace, id) -> data`. Prefix scans by
//!   type yield records in message id order.
//! - `PendingByMessage`: `(peer, namespace, id, type)`. Used to cascade every
//!   action of a removed message.
//! - `PendingCounts`: one counter per `(peer, namespace)` and per
//!   `(peer, namespace, type)`. A counter that reaches zero is deleted.
//!
//! Counters change only on a genuine create or removal of a record, so they
//! always equal the cardinality of the matching records.

use crate::codec::{Encoded, from_bytes, to_bytes};
use crate::operations::{HistoryChanges, PendingActionOperation};
use crate::storage::{KeyBuilder, KeyRange, KeyReader, ScanOrder, StoreRead, Table, Transaction};
use crate::{MessageId, PeerId, StrataError};
use serde::{Deserialize, Serialize};

/// Scope of a pending-action counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PendingCountKey {
    PeerNamespace {
        peer_id: PeerId,
        namespace: i32,
    },
    PeerNamespaceAction {
        peer_id: PeerId,
        namespace: i32,
        action_type: u32,
    },
}

impl PendingCountKey {
    fn storage_key(&self) -> Vec<u8> {
        match *self {
            Self::PeerNamespace { peer_id, namespace } => {
                KeyBuilder::new().u8(0).i64(peer_id.0).i32(namespace).build()
            }
            Self::PeerNamespaceAction {
                peer_id,
                namespace,
                action_type,
            } => KeyBuilder::new()
                .u8(1)
                .i64(peer_id.0)
                .i32(namespace)
                .u32(action_type)
                .build(),
        }
    }

    fn for_action(id: MessageId, action_type: u32) -> [Self; 2] {
        [
            Self::PeerNamespace {
                peer_id: id.peer_id,
                namespace: id.namespace,
            },
            Self::PeerNamespaceAction {
                peer_id: id.peer_id,
                namespace: id.namespace,
                action_type,
            },
        ]
    }
}

/// One stored pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingActionRecord {
    pub id: MessageId,
    pub action_type: u32,
    pub data: Encoded,
}

fn action_key(id: MessageId, action_type: u32) -> Vec<u8> {
    KeyBuilder::new()
        .u32(action_type)
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .build()
}

fn message_key(id: MessageId, action_type: u32) -> Vec<u8> {
    KeyBuilder::new()
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .u32(action_type)
        .build()
}

fn message_prefix(id: MessageId) -> Vec<u8> {
    KeyBuilder::new()
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .build()
}

// =============================================================================
// READS
// =============================================================================

/// The data of one action, if present.
pub fn get(
    store: &dyn StoreRead,
    id: MessageId,
    action_type: u32,
) -> Result<Option<Encoded>, StrataError> {
    store
        .get(Table::PendingActions, &action_key(id, action_type))?
        .map(|bytes| from_bytes(&bytes))
        .transpose()
}

/// Every action of `action_type`, ordered by message id.
pub fn actions(
    store: &dyn StoreRead,
    action_type: u32,
) -> Result<Vec<PendingActionRecord>, StrataError> {
    let range = KeyRange::prefix(KeyBuilder::new().u32(action_type).build());
    store
        .scan(Table::PendingActions, &range, ScanOrder::Ascending, None)?
        .into_iter()
        .map(|(key, bytes)| {
            let mut reader = KeyReader::new(&key);
            let action_type = reader.u32()?;
            let peer_id = PeerId(reader.i64()?);
            let namespace = reader.i32()?;
            let id = reader.i32()?;
            Ok(PendingActionRecord {
                id: MessageId::new(peer_id, namespace, id),
                action_type,
                data: from_bytes(&bytes)?,
            })
        })
        .collect()
}

/// Current value of a counter; absent counters are zero.
pub fn count(store: &dyn StoreRead, key: PendingCountKey) -> Result<i32, StrataError> {
    Ok(store
        .get(Table::PendingCounts, &key.storage_key())?
        .map(|bytes| from_bytes(&bytes))
        .transpose()?
        .unwrap_or(0))
}

// =============================================================================
// WRITES
// =============================================================================

fn adjust_counts(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    id: MessageId,
    action_type: u32,
    delta: i32,
) -> Result<(), StrataError> {
    for key in PendingCountKey::for_action(id, action_type) {
        let value = count(txn, key)?.saturating_add(delta).max(0);
        if value == 0 {
            txn.remove(Table::PendingCounts, key.storage_key());
        } else {
            txn.set(Table::PendingCounts, key.storage_key(), to_bytes(&value)?);
        }
        changes.pending_counts.insert(key, value);
    }
    Ok(())
}

/// Write or clear one action. The caller guarantees the message exists.
pub(crate) fn set(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    id: MessageId,
    action_type: u32,
    data: Option<Encoded>,
) -> Result<(), StrataError> {
    let existed = get(txn, id, action_type)?.is_some();
    match data {
        Some(data) => {
            txn.set(Table::PendingActions, action_key(id, action_type), to_bytes(&data)?);
            txn.set(Table::PendingByMessage, message_key(id, action_type), Vec::new());
            if !existed {
                adjust_counts(txn, changes, id, action_type, 1)?;
            }
            changes
                .pending_actions
                .push(PendingActionOperation::Set { id, action_type, data });
        }
        None if existed => {
            txn.remove(Table::PendingActions, action_key(id, action_type));
            txn.remove(Table::PendingByMessage, message_key(id, action_type));
            adjust_counts(txn, changes, id, action_type, -1)?;
            changes
                .pending_actions
                .push(PendingActionOperation::Remove { id, action_type });
        }
        None => {}
    }
    Ok(())
}

/// Remove every action attached to `id`.
pub(crate) fn remove_all(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    id: MessageId,
) -> Result<(), StrataError> {
    let range = KeyRange::prefix(message_prefix(id));
    let types = txn
        .scan(Table::PendingByMessage, &range, ScanOrder::Ascending, None)?
        .into_iter()
        .map(|(key, _)| {
            let mut reader = KeyReader::new(&key);
            reader.i64()?;
            reader.i32()?;
            reader.i32()?;
            reader.u32()
        })
        .collect::<Result<Vec<u32>, StrataError>>()?;
    for action_type in types {
        set(txn, changes, id, action_type, None)?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::MemoryBox;

    fn data(byte: u8) -> Encoded {
        Encoded::from_raw(9, vec![byte])
    }

    fn keys(id: MessageId, action_type: u32) -> [PendingCountKey; 2] {
        PendingCountKey::for_action(id, action_type)
    }

    #[test]
    fn overwrite_keeps_counts() {
        let store = MemoryBox::new();
        let mut txn = Transaction::new(&store);
        let mut changes = HistoryChanges::default();
        let id = MessageId::new(PeerId(1), 0, 5);

        set(&mut txn, &mut changes, id, 1, Some(data(1))).expect("set");
        set(&mut txn, &mut changes, id, 1, Some(data(2))).expect("set");

        let [total, typed] = keys(id, 1);
        assert_eq!(count(&txn, total).expect("count"), 1);
        assert_eq!(count(&txn, typed).expect("count"), 1);
        assert_eq!(get(&txn, id, 1).expect("get"), Some(data(2)));
    }

    #[test]
    fn clearing_absent_action_changes_nothing() {
        let store = MemoryBox::new();
        let mut txn = Transaction::new(&store);
        let mut changes = HistoryChanges::default();
        let id = MessageId::new(PeerId(1), 0, 5);

        set(&mut txn, &mut changes, id, 1, None).expect("clear");
        assert_eq!(txn.pending(), 0);
        assert!(changes.pending_actions.is_empty());
    }

    #[test]
    fn actions_ordered_by_message_id() {
        let store = MemoryBox::new();
        let mut txn = Transaction::new(&store);
        let mut changes = HistoryChanges::default();
        let peer = PeerId(2);

        for id in [30, 10, 20] {
            set(&mut txn, &mut changes, MessageId::new(peer, 0, id), 4, Some(data(0)))
                .expect("set");
        }
        set(&mut txn, &mut changes, MessageId::new(peer, 0, 15), 5, Some(data(0)))
            .expect("set");

        let ids: Vec<i32> = actions(&txn, 4)
            .expect("actions")
            .into_iter()
            .map(|record| record.id.id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);

        let [total, _] = keys(MessageId::new(peer, 0, 1), 4);
        assert_eq!(count(&txn, total).expect("count"), 4);
    }

    #[test]
    fn cascade_removes_every_type() {
        let store = MemoryBox::new();
        let mut txn = Transaction::new(&store);
        let mut changes = HistoryChanges::default();
        let id = MessageId::new(PeerId(1), 0, 8);

        set(&mut txn, &mut changes, id, 1, Some(data(1))).expect("set");
        set(&mut txn, &mut changes, id, 2, Some(data(2))).expect("set");
        remove_all(&mut txn, &mut changes, id).expect("cascade");

        assert!(get(&txn, id, 1).expect("get").is_none());
        assert!(get(&txn, id, 2).expect("get").is_none());
        let [total, typed] = keys(id, 2);
        assert_eq!(count(&txn, total).expect("count"), 0);
        assert_eq!(count(&txn, typed).expect("count"), 0);
        assert_eq!(changes.pending_counts.get(&total), Some(&0));
    }
}
