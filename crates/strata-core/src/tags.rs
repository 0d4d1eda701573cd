//! # Tag-Scoped Views
//!
//! One ordered mirror per tag bit of the primary index.
//!
//! A view for tag `T` lists every message carrying `T` and every primary
//! hole whose mask contains `T`. Entries are keyed
//! `(peer, tag-bit, namespace, id)`, where holes use their max id like the
//! primary index does, so a prefix scan of `(peer, tag-bit)` walks the view
//! in the same order as the primary sequence.

use crate::storage::{KeyBuilder, KeyRange, KeyReader, ScanOrder, StoreRead, Table, Transaction};
use crate::{MessageTags, PeerId, StrataError};

/// What a mirror entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MirrorKind {
    Message,
    Hole,
}

impl MirrorKind {
    const fn marker(self) -> u8 {
        match self {
            MirrorKind::Message => 0,
            MirrorKind::Hole => 1,
        }
    }
}

/// One position in a tag view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViewEntry {
    pub namespace: i32,
    /// Message id, or max id for holes.
    pub key_id: i32,
    pub kind: MirrorKind,
}

fn mirror_key(peer_id: PeerId, tag: MessageTags, namespace: i32, key_id: i32) -> Vec<u8> {
    KeyBuilder::new()
        .i64(peer_id.0)
        .u8(tag.bit_index())
        .i32(namespace)
        .i32(key_id)
        .build()
}

/// Mirror one primary entry into every view of `tags`.
pub(crate) fn add(
    txn: &mut Transaction<'_>,
    peer_id: PeerId,
    namespace: i32,
    key_id: i32,
    tags: MessageTags,
    kind: MirrorKind,
) {
    for tag in tags.iter() {
        txn.set(
            Table::Tags,
            mirror_key(peer_id, tag, namespace, key_id),
            vec![kind.marker()],
        );
    }
}

/// Drop one primary entry from every view of `tags`.
pub(crate) fn remove(
    txn: &mut Transaction<'_>,
    peer_id: PeerId,
    namespace: i32,
    key_id: i32,
    tags: MessageTags,
) {
    for tag in tags.iter() {
        txn.remove(Table::Tags, mirror_key(peer_id, tag, namespace, key_id));
    }
}

/// Walk the view of a single-bit `tag` for one peer, across namespaces.
pub(crate) fn view(
    store: &dyn StoreRead,
    tag: MessageTags,
    peer_id: PeerId,
) -> Result<Vec<ViewEntry>, StrataError> {
    let prefix = KeyBuilder::new().i64(peer_id.0).u8(tag.bit_index()).build();
    store
        .scan(
            Table::Tags,
            &KeyRange::prefix(prefix),
            ScanOrder::Ascending,
            None,
        )?
        .into_iter()
        .map(|(key, value)| {
            let mut reader = KeyReader::new(&key);
            reader.i64()?;
            reader.u8()?;
            let namespace = reader.i32()?;
            let key_id = reader.i32()?;
            let kind = if value.first() == Some(&MirrorKind::Hole.marker()) {
                MirrorKind::Hole
            } else {
                MirrorKind::Message
            };
            Ok(ViewEntry {
                namespace,
                key_id,
                kind,
            })
        })
        .collect()
}
