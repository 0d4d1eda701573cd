//! # Tag Summary Counters
//!
//! Lazily synced per `(tag, peer, namespace)` aggregates.
//!
//! A summary holds the last authoritative snapshot (`version`, `count`,
//! `max_id`) plus local deltas applied to `count`:
//!
//! | Event | Effect on `count` |
//! |-------|-------------------|
//! | first tagged insert, no summary | create `(0, 1, 0)` |
//! | tagged insert, `id > max_id` | `+1` |
//! | tagged insert, `id <= max_id` | unchanged |
//! | tagged remove | `-1`, floor `0` |
//! | `replace` | overwrite, `version + 1` |
//!
//! Holes never affect summaries. Only `replace` changes `version`.

use crate::codec::{from_bytes, to_bytes};
use crate::operations::HistoryChanges;
use crate::storage::{KeyBuilder, StoreRead, Table, Transaction};
use crate::{MessageTags, PeerId, StrataError};
use serde::{Deserialize, Serialize};

/// Identifies one summary. `tag` is a single-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub tag: MessageTags,
    pub peer_id: PeerId,
    pub namespace: i32,
}

impl SummaryKey {
    #[must_use]
    pub const fn new(tag: MessageTags, peer_id: PeerId, namespace: i32) -> Self {
        Self {
            tag,
            peer_id,
            namespace,
        }
    }

    fn storage_key(&self) -> Vec<u8> {
        KeyBuilder::new()
            .u8(self.tag.bit_index())
            .i64(self.peer_id.0)
            .i32(self.namespace)
            .build()
    }
}

/// Snapshot plus local deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    /// Number of authoritative replaces applied so far.
    pub version: i32,
    pub count: i32,
    /// Upper id bound of the last authoritative snapshot.
    pub max_id: i32,
}

pub fn get(store: &dyn StoreRead, key: SummaryKey) -> Result<Option<TagSummary>, StrataError> {
    store
        .get(Table::Summaries, &key.storage_key())?
        .map(|bytes| from_bytes(&bytes))
        .transpose()
}

fn put(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    key: SummaryKey,
    summary: TagSummary,
) -> Result<(), StrataError> {
    txn.set(Table::Summaries, key.storage_key(), to_bytes(&summary)?);
    changes.summaries.insert(key, summary);
    Ok(())
}

/// Account for a tagged message inserted at `id`.
pub(crate) fn message_inserted(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    key: SummaryKey,
    id: i32,
) -> Result<(), StrataError> {
    let summary = match get(txn, key)? {
        None => TagSummary {
            version: 0,
            count: 1,
            max_id: 0,
        },
        Some(summary) if id > summary.max_id => TagSummary {
            count: summary.count.saturating_add(1),
            ..summary
        },
        Some(_) => return Ok(()),
    };
    put(txn, changes, key, summary)
}

/// Account for a tagged message removed from `id`.
pub(crate) fn message_removed(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    key: SummaryKey,
) -> Result<(), StrataError> {
    let Some(summary) = get(txn, key)? else {
        return Ok(());
    };
    let count = summary.count.saturating_sub(1).max(0);
    put(txn, changes, key, TagSummary { count, ..summary })
}

/// Overwrite with an authoritative snapshot, advancing the version.
pub(crate) fn replace(
    txn: &mut Transaction<'_>,
    changes: &mut HistoryChanges,
    key: SummaryKey,
    count: i32,
    max_id: i32,
) -> Result<(), StrataError> {
    let version = get(txn, key)?.map_or(1, |summary| summary.version.saturating_add(1));
    tracing::debug!(
        peer = key.peer_id.0,
        namespace = key.namespace,
        tag = key.tag.bits(),
        version,
        count,
        max_id,
        "tag summary replaced"
    );
    put(
        txn,
        changes,
        key,
        TagSummary {
            version,
            count: count.max(0),
            max_id,
        },
    )
}

// =============================================================================
// TESTS
// =============================================================================
