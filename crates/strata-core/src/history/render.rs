//! Rendered listings of the primary sequence and of tag views.

use super::index::{self, IndexEntry, Space, StoredMessage};
use crate::media;
use crate::peers::PeerDirectory;
use crate::storage::StoreRead;
use crate::tags::{self, MirrorKind};
use crate::{MessageId, MessageTags, PeerId, RenderedEntry, RenderedMessage, StrataError};

fn render_message(
    store: &dyn StoreRead,
    id: MessageId,
    stored: StoredMessage,
    directory: &dyn PeerDirectory,
) -> Result<RenderedMessage, StrataError> {
    let author = stored.author.and_then(|author| {
        let peer = directory.lookup(author);
        if peer.is_none() {
            tracing::warn!(%id, author = author.0, "author missing from peer directory");
        }
        peer
    });

    let mut resolved = Vec::with_capacity(stored.media.len());
    for item in &stored.media {
        if let Some(item) = media::resolve(store, item)? {
            resolved.push(item);
        }
    }

    Ok(RenderedMessage {
        stable_id: stored.stable_id,
        id,
        globally_unique_id: stored.globally_unique_id,
        timestamp: stored.timestamp,
        flags: stored.flags,
        tags: stored.tags,
        forward_info: stored.forward_info,
        author,
        text: stored.text,
        media: resolved,
    })
}

fn render_entry(
    store: &dyn StoreRead,
    space: Space,
    key_id: i32,
    entry: IndexEntry,
    directory: &dyn PeerDirectory,
) -> Result<RenderedEntry, StrataError> {
    Ok(match entry {
        IndexEntry::Message(stored) => RenderedEntry::Message(render_message(
            store,
            space.message_id(key_id),
            stored,
            directory,
        )?),
        IndexEntry::Hole(hole) => RenderedEntry::Hole(space.hole(key_id, &hole)),
    })
}

pub(super) fn list(
    store: &dyn StoreRead,
    peer_id: PeerId,
    directory: &dyn PeerDirectory,
) -> Result<Vec<RenderedEntry>, StrataError> {
    index::peer_entries(store, peer_id)?
        .into_iter()
        .map(|(space, key_id, entry)| render_entry(store, space, key_id, entry, directory))
        .collect()
}

pub(super) fn list_tag(
    store: &dyn StoreRead,
    tag: MessageTags,
    peer_id: PeerId,
    directory: &dyn PeerDirectory,
) -> Result<Vec<RenderedEntry>, StrataError> {
    if !tag.is_single() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for view_entry in tags::view(store, tag, peer_id)? {
        let space = Space {
            peer_id,
            namespace: view_entry.namespace,
        };
        let entry = index::entry(store, space, view_entry.key_id)?;
        let consistent = matches!(
            (&entry, view_entry.kind),
            (Some(IndexEntry::Message(_)), MirrorKind::Message)
                | (Some(IndexEntry::Hole(_)), MirrorKind::Hole)
        );
        match entry {
            Some(entry) if consistent => {
                entries.push(render_entry(store, space, view_entry.key_id, entry, directory)?);
            }
            _ => {
                tracing::warn!(
                    peer = peer_id.0,
                    namespace = view_entry.namespace,
                    id = view_entry.key_id,
                    "dangling tag view entry"
                );
            }
        }
    }
    Ok(entries)
}

pub(super) fn message(
    store: &dyn StoreRead,
    id: MessageId,
    directory: &dyn PeerDirectory,
) -> Result<Option<RenderedMessage>, StrataError> {
    index::message(store, Space::of(id), id.id)?
        .map(|stored| render_message(store, id, stored, directory))
        .transpose()
}
