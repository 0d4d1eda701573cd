//! Primary index primitives.
//!
//! The primary index stores one entry per message and one per hole, keyed
//! `(peer, namespace, id)`. Holes are keyed by their max id, so the first
//! key at or above an id is either that message or the hole covering it.
//!
//! Every write here also maintains the tag mirrors, which keeps the tag
//! views in lockstep with the primary sequence.

use crate::codec::{from_bytes, to_bytes};
use crate::media::StoredMedia;
use crate::primitives::{FIRST_STABLE_ID, NEXT_STABLE_ID_KEY};
use crate::storage::{KeyBuilder, KeyRange, KeyReader, ScanOrder, StoreRead, Table, Transaction};
use crate::tags::{self, MirrorKind};
use crate::{
    ForwardInfo, Hole, MessageFlags, MessageId, MessageIndex, MessageTags, PeerId, StableId,
    StrataError,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// STORED SHAPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredMessage {
    pub stable_id: StableId,
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    pub flags: MessageFlags,
    pub tags: MessageTags,
    pub forward_info: Option<ForwardInfo>,
    pub author: Option<PeerId>,
    pub text: String,
    pub media: Vec<StoredMedia>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredHole {
    pub stable_id: StableId,
    pub min: i32,
    pub max_timestamp: i32,
    pub tags: MessageTags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum IndexEntry {
    Message(StoredMessage),
    Hole(StoredHole),
}

/// One `(peer, namespace)` id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Space {
    pub peer_id: PeerId,
    pub namespace: i32,
}

impl Space {
    pub(crate) const fn of(id: MessageId) -> Self {
        Self {
            peer_id: id.peer_id,
            namespace: id.namespace,
        }
    }

    pub(crate) const fn message_id(self, id: i32) -> MessageId {
        MessageId::new(self.peer_id, self.namespace, id)
    }

    fn prefix(self) -> Vec<u8> {
        KeyBuilder::new()
            .i64(self.peer_id.0)
            .i32(self.namespace)
            .build()
    }

    fn key(self, id: i32) -> Vec<u8> {
        KeyBuilder::new()
            .i64(self.peer_id.0)
            .i32(self.namespace)
            .i32(id)
            .build()
    }

    /// Public view of a stored hole keyed at `max`.
    pub(crate) fn hole(self, max: i32, hole: &StoredHole) -> Hole {
        Hole {
            stable_id: hole.stable_id,
            min: hole.min,
            max_index: MessageIndex::new(self.message_id(max), hole.max_timestamp),
            tags: hole.tags,
        }
    }
}

// =============================================================================
// READS
// =============================================================================

fn decode_entry(key: &[u8], value: &[u8]) -> Result<(i32, IndexEntry), StrataError> {
    let mut reader = KeyReader::new(key);
    reader.i64()?;
    reader.i32()?;
    Ok((reader.i32()?, from_bytes(value)?))
}

pub(crate) fn entry(
    store: &dyn StoreRead,
    space: Space,
    key_id: i32,
) -> Result<Option<IndexEntry>, StrataError> {
    store
        .get(Table::Index, &space.key(key_id))?
        .map(|bytes| from_bytes(&bytes))
        .transpose()
}

/// The stored message at `id`, if the slot holds one.
pub(crate) fn message(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<StoredMessage>, StrataError> {
    Ok(match entry(store, space, id)? {
        Some(IndexEntry::Message(message)) => Some(message),
        _ => None,
    })
}

/// Last entry keyed strictly below `id`.
pub(crate) fn below(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, IndexEntry)>, StrataError> {
    let range = KeyRange::between(space.prefix(), space.key(id));
    store
        .first(Table::Index, &range, ScanOrder::Descending)?
        .map(|(key, value)| decode_entry(&key, &value))
        .transpose()
}

/// First entry keyed at or above `id`.
pub(crate) fn at_or_above(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, IndexEntry)>, StrataError> {
    let range = KeyRange {
        start: space.key(id),
        end: KeyRange::prefix(space.prefix()).end,
    };
    store
        .first(Table::Index, &range, ScanOrder::Ascending)?
        .map(|(key, value)| decode_entry(&key, &value))
        .transpose()
}

/// First entry keyed strictly above `id`.
pub(crate) fn above(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, IndexEntry)>, StrataError> {
    match id.checked_add(1) {
        Some(next) => at_or_above(store, space, next),
        None => Ok(None),
    }
}

/// The hole covering `id`, with its key.
pub(crate) fn hole_containing(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, StoredHole)>, StrataError> {
    Ok(match at_or_above(store, space, id)? {
        Some((max, IndexEntry::Hole(hole))) if hole.min <= id => Some((max, hole)),
        _ => None,
    })
}

/// Every entry keyed inside `[lo, hi]`.
///
/// A hole keyed inside the range may start below `lo`.
pub(crate) fn entries_between(
    store: &dyn StoreRead,
    space: Space,
    lo: i32,
    hi: i32,
) -> Result<Vec<(i32, IndexEntry)>, StrataError> {
    if lo > hi {
        return Ok(Vec::new());
    }
    let range = KeyRange::inclusive(space.key(lo), &space.key(hi));
    store
        .scan(Table::Index, &range, ScanOrder::Ascending, None)?
        .into_iter()
        .map(|(key, value)| decode_entry(&key, &value))
        .collect()
}

/// Every entry of one peer, across namespaces, in key order.
pub(crate) fn peer_entries(
    store: &dyn StoreRead,
    peer_id: PeerId,
) -> Result<Vec<(Space, i32, IndexEntry)>, StrataError> {
    let range = KeyRange::prefix(KeyBuilder::new().i64(peer_id.0).build());
    store
        .scan(Table::Index, &range, ScanOrder::Ascending, None)?
        .into_iter()
        .map(|(key, value)| {
            let mut reader = KeyReader::new(&key);
            reader.i64()?;
            let namespace = reader.i32()?;
            let key_id = reader.i32()?;
            Ok((
                Space { peer_id, namespace },
                key_id,
                from_bytes(&value)?,
            ))
        })
        .collect()
}

/// Nearest message strictly below `id`, skipping holes.
pub(crate) fn message_below(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, StoredMessage)>, StrataError> {
    let mut cursor = id;
    while let Some((key_id, entry)) = below(store, space, cursor)? {
        match entry {
            IndexEntry::Message(message) => return Ok(Some((key_id, message))),
            IndexEntry::Hole(hole) => cursor = hole.min,
        }
    }
    Ok(None)
}

/// Nearest message strictly above `id`, skipping holes.
pub(crate) fn message_above(
    store: &dyn StoreRead,
    space: Space,
    id: i32,
) -> Result<Option<(i32, StoredMessage)>, StrataError> {
    let mut cursor = id;
    while let Some((key_id, entry)) = above(store, space, cursor)? {
        match entry {
            IndexEntry::Message(message) => return Ok(Some((key_id, message))),
            IndexEntry::Hole(_) => cursor = key_id,
        }
    }
    Ok(None)
}

// =============================================================================
// WRITES
// =============================================================================

pub(crate) fn put_message(
    txn: &mut Transaction<'_>,
    space: Space,
    id: i32,
    message: &StoredMessage,
) -> Result<(), StrataError> {
    let bytes = to_bytes(&IndexEntry::Message(message.clone()))?;
    txn.set(Table::Index, space.key(id), bytes);
    tags::add(
        txn,
        space.peer_id,
        space.namespace,
        id,
        message.tags,
        MirrorKind::Message,
    );
    Ok(())
}

pub(crate) fn delete_message(
    txn: &mut Transaction<'_>,
    space: Space,
    id: i32,
    message: &StoredMessage,
) {
    txn.remove(Table::Index, space.key(id));
    tags::remove(txn, space.peer_id, space.namespace, id, message.tags);
}

pub(crate) fn put_hole(
    txn: &mut Transaction<'_>,
    space: Space,
    max: i32,
    hole: &StoredHole,
) -> Result<(), StrataError> {
    debug_assert!(hole.min <= max, "hole bounds inverted");
    txn.set(Table::Index, space.key(max), to_bytes(&IndexEntry::Hole(*hole))?);
    tags::add(
        txn,
        space.peer_id,
        space.namespace,
        max,
        hole.tags,
        MirrorKind::Hole,
    );
    Ok(())
}

pub(crate) fn delete_hole(txn: &mut Transaction<'_>, space: Space, max: i32, hole: &StoredHole) {
    txn.remove(Table::Index, space.key(max));
    tags::remove(txn, space.peer_id, space.namespace, max, hole.tags);
}

/// Hand out the next stable id from the persisted counter.
pub(crate) fn allocate_stable_id(txn: &mut Transaction<'_>) -> Result<StableId, StrataError> {
    let next: u32 = txn
        .get(Table::Metadata, NEXT_STABLE_ID_KEY)?
        .map(|bytes| from_bytes(&bytes))
        .transpose()?
        .unwrap_or(FIRST_STABLE_ID);
    txn.set(
        Table::Metadata,
        NEXT_STABLE_ID_KEY.to_vec(),
        to_bytes(&next.saturating_add(1))?,
    );
    Ok(StableId(next))
}

// =============================================================================
// TESTS
// =============================================================================
