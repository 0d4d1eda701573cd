//! # Media Store
//!
//! Reference-counted table of shareable media records.
//!
//! External media is stored once per [`MediaId`]; every stored message that
//! references it holds one reference. The first payload written for an id
//! wins and later payloads for the same id are ignored. The record is
//! deleted when its last reference goes away.
//!
//! Embedded media never reaches this table: it is kept inline with the
//! owning message.

use crate::codec::{Encoded, from_bytes, to_bytes};
use crate::storage::{KeyBuilder, KeyRange, ScanOrder, StoreRead, Table, Transaction};
use crate::{Media, MediaId, StrataError};
use serde::{Deserialize, Serialize};

/// A shared media record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: MediaId,
    pub payload: Encoded,
    /// Number of stored messages referencing this record. Always `>= 1`.
    pub reference_count: i32,
}

/// Media as persisted inside a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum StoredMedia {
    Embedded(Encoded),
    External(MediaId),
}

fn media_key(id: MediaId) -> Vec<u8> {
    KeyBuilder::new().i32(id.namespace).i64(id.id).build()
}

/// Look up one media record.
pub fn get(store: &dyn StoreRead, id: MediaId) -> Result<Option<MediaRecord>, StrataError> {
    store
        .get(Table::Media, &media_key(id))?
        .map(|bytes| from_bytes(&bytes))
        .transpose()
}

/// Every stored media record in id order.
pub fn records(store: &dyn StoreRead) -> Result<Vec<MediaRecord>, StrataError> {
    store
        .scan(
            Table::Media,
            &KeyRange::prefix(Vec::new()),
            ScanOrder::Ascending,
            None,
        )?
        .into_iter()
        .map(|(_, bytes)| from_bytes(&bytes))
        .collect()
}

/// Take a reference on `media` and return its persisted form.
pub(crate) fn reference(
    txn: &mut Transaction<'_>,
    media: &Media,
) -> Result<StoredMedia, StrataError> {
    let (id, payload) = match media {
        Media::Embedded(payload) => return Ok(StoredMedia::Embedded(payload.clone())),
        Media::External { id, payload } => (*id, payload),
    };

    let record = match get(txn, id)? {
        Some(mut record) => {
            record.reference_count = record.reference_count.saturating_add(1);
            record
        }
        None => MediaRecord {
            id,
            payload: payload.clone(),
            reference_count: 1,
        },
    };
    tracing::trace!(
        namespace = id.namespace,
        id = id.id,
        references = record.reference_count,
        "media referenced"
    );
    txn.set(Table::Media, media_key(id), to_bytes(&record)?);
    Ok(StoredMedia::External(id))
}

/// Drop one reference; deletes the record when none remain.
pub(crate) fn release(
    txn: &mut Transaction<'_>,
    media: &StoredMedia,
) -> Result<(), StrataError> {
    let StoredMedia::External(id) = media else {
        return Ok(());
    };
    let Some(mut record) = get(txn, *id)? else {
        return Ok(());
    };

    record.reference_count = record.reference_count.saturating_sub(1);
    if record.reference_count <= 0 {
        tracing::trace!(namespace = id.namespace, id = id.id, "media record deleted");
        txn.remove(Table::Media, media_key(*id));
    } else {
        txn.set(Table::Media, media_key(*id), to_bytes(&record)?);
    }
    Ok(())
}

/// Resolve persisted media back into caller-facing [`Media`].
///
/// A dangling external reference is logged and resolves to `None`.
pub(crate) fn resolve(
    store: &dyn StoreRead,
    media: &StoredMedia,
) -> Result<Option<Media>, StrataError> {
    match media {
        StoredMedia::Embedded(payload) => Ok(Some(Media::Embedded(payload.clone()))),
        StoredMedia::External(id) => match get(store, *id)? {
            Some(record) => Ok(Some(Media::External {
                id: *id,
                payload: record.payload,
            })),
            None => {
                tracing::warn!(
                    namespace = id.namespace,
                    id = id.id,
                    "missing media record"
                );
                Ok(None)
            }
        },
    }
}

// =============================================================================
// TESTS
// =============================================================================
