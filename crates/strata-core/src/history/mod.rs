//! # History Table
//!
//! The orchestrator of the engine: the ordered, gap-aware message sequence of
//! every `(peer, namespace)`, with all derived structures kept consistent as
//! side effects of its operations.
//!
//! ## Mutations
//!
//! Each public mutation opens a [`Transaction`] over the store, runs every
//! primary and fan-out write through it, then commits the batch once. A
//! failure anywhere leaves the store untouched and returns no change set.
//!
//! ## Hole Rules
//!
//! - Insert into a hole splits it. The lower piece takes the inserted
//!   message's timestamp as its upper bound and a new stable id; the upper
//!   piece keeps its bound and stable id. Empty pieces are dropped.
//! - Remove lets a neighbouring hole absorb the freed gap. Two neighbouring
//!   holes merge. A hole always spans the full gap between its neighbouring
//!   messages (or the space bounds).
//! - `add_hole` turns a hole-free gap into one hole.
//!
//! ## Example
//!
//! ```
//! use strata_core::{HistoryConfig, HistoryTable, MessageId, PeerId, StoreMessage};
//!
//! let mut history = HistoryTable::in_memory(HistoryConfig::default())?;
//! let id = MessageId::new(PeerId(1), 0, 90);
//! history.add_hole(id)?;
//! history.insert(&[StoreMessage::new(id, 90)])?;
//! assert_eq!(history.debug_list(PeerId(1), &history.peers())?.len(), 3);
//! # Ok::<(), strata_core::StrataError>(())
//! ```

mod fill;
mod index;
mod render;

use crate::codec::Encoded;
use crate::config::HistoryConfig;
use crate::media::{self, MediaRecord, StoredMedia};
use crate::operations::{HistoryChanges, HistoryOperation};
use crate::peers::{self, PeerDirectory, PeerTable};
use crate::pending::{self, PendingActionRecord, PendingCountKey};
use crate::primitives::{MAX_MESSAGE_ID, MIN_MESSAGE_ID, OPEN_TIMESTAMP};
use crate::storage::{MemoryBox, StorageBackend, StoreRead, Transaction, ValueBox};
use crate::summary::{self, SummaryKey, TagSummary};
use crate::{
    HoleFill, Media, MediaId, MessageId, MessageIndex, MessageTags, Peer, PeerId,
    RenderedEntry, RenderedMessage, StableId, StoreMessage, StrataError, global_ids, text_index,
    unsent,
};
use fill::FillScope;
use index::{IndexEntry, Space, StoredHole, StoredMessage};
use std::path::Path;

// =============================================================================
// MUTATION CONTEXT
// =============================================================================

/// State of one in-flight mutation.
struct Context<'a> {
    txn: Transaction<'a>,
    changes: HistoryChanges,
    config: &'a HistoryConfig,
}

fn validate(id: MessageId) -> Result<(), StrataError> {
    if id.is_valid() {
        Ok(())
    } else {
        Err(StrataError::InvalidMessageId(id))
    }
}

impl Context<'_> {
    fn record(&mut self, space: Space, operation: HistoryOperation) {
        self.changes.record(space.peer_id, operation);
    }

    fn put_hole(&mut self, space: Space, max: i32, hole: StoredHole) -> Result<(), StrataError> {
        index::put_hole(&mut self.txn, space, max, &hole)?;
        self.record(space, HistoryOperation::InsertHole(space.hole(max, &hole)));
        Ok(())
    }

    fn delete_hole(&mut self, space: Space, max: i32, hole: StoredHole) {
        index::delete_hole(&mut self.txn, space, max, &hole);
        self.record(space, HistoryOperation::RemoveHole(space.hole(max, &hole)));
    }

    // -------------------------------------------------------------------------
    // Fan-out helpers
    // -------------------------------------------------------------------------

    fn reference_media(&mut self, items: &[Media]) -> Result<Vec<StoredMedia>, StrataError> {
        items
            .iter()
            .map(|item| media::reference(&mut self.txn, item))
            .collect()
    }

    fn release_media(&mut self, items: &[StoredMedia]) -> Result<(), StrataError> {
        for item in items {
            media::release(&mut self.txn, item)?;
        }
        Ok(())
    }

    fn summaries_inserted(&mut self, id: MessageId, tags: MessageTags) -> Result<(), StrataError> {
        for tag in tags.intersection(self.config.summary_tags).iter() {
            let key = SummaryKey::new(tag, id.peer_id, id.namespace);
            summary::message_inserted(&mut self.txn, &mut self.changes, key, id.id)?;
        }
        Ok(())
    }

    fn summaries_removed(&mut self, id: MessageId, tags: MessageTags) -> Result<(), StrataError> {
        for tag in tags.intersection(self.config.summary_tags).iter() {
            let key = SummaryKey::new(tag, id.peer_id, id.namespace);
            summary::message_removed(&mut self.txn, &mut self.changes, key)?;
        }
        Ok(())
    }

    fn sync_unsent(&mut self, id: MessageId, queued: bool) -> Result<(), StrataError> {
        if queued {
            unsent::insert(&mut self.txn, &mut self.changes, id)
        } else {
            unsent::remove(&mut self.txn, &mut self.changes, id)
        }
    }

    fn index_text(&mut self, message: &StoreMessage) -> Result<(), StrataError> {
        if self.config.indexes_namespace(message.id.namespace) {
            text_index::add(&mut self.txn, message.id, &message.text, message.tags)?;
        }
        Ok(())
    }

    fn stored(
        message: &StoreMessage,
        stable_id: StableId,
        media: Vec<StoredMedia>,
    ) -> StoredMessage {
        StoredMessage {
            stable_id,
            globally_unique_id: message.globally_unique_id,
            timestamp: message.timestamp,
            flags: message.flags,
            tags: message.tags,
            forward_info: message.forward_info.clone(),
            author: message.author,
            text: message.text.clone(),
            media,
        }
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Split the hole keyed at `max` around the message `at`.
    fn split_hole(
        &mut self,
        space: Space,
        max: i32,
        hole: StoredHole,
        at: i32,
        timestamp: i32,
    ) -> Result<(), StrataError> {
        tracing::trace!(
            peer = space.peer_id.0,
            namespace = space.namespace,
            min = hole.min,
            max,
            at,
            "split hole"
        );
        self.delete_hole(space, max, hole);

        if hole.min < at {
            let lower = StoredHole {
                stable_id: index::allocate_stable_id(&mut self.txn)?,
                min: hole.min,
                max_timestamp: timestamp,
                tags: hole.tags,
            };
            self.put_hole(space, at - 1, lower)?;
        }
        if at < max {
            let upper = StoredHole { min: at + 1, ..hole };
            self.put_hole(space, max, upper)?;
        }
        Ok(())
    }

    /// Insert one message. Returns its stable id, or `None` when the slot was
    /// already taken.
    fn insert_message(&mut self, message: &StoreMessage) -> Result<Option<StableId>, StrataError> {
        validate(message.id)?;
        let space = Space::of(message.id);
        let id = message.id.id;

        if index::message(&self.txn, space, id)?.is_some() {
            tracing::trace!(id = %message.id, "slot occupied, insert skipped");
            return Ok(None);
        }
        if let Some((max, hole)) = index::hole_containing(&self.txn, space, id)? {
            self.split_hole(space, max, hole, id, message.timestamp)?;
        }

        let stable_id = index::allocate_stable_id(&mut self.txn)?;
        let media = self.reference_media(&message.media)?;
        let stored = Self::stored(message, stable_id, media);
        index::put_message(&mut self.txn, space, id, &stored)?;

        self.summaries_inserted(message.id, message.tags)?;
        self.sync_unsent(message.id, message.flags.awaits_delivery())?;
        if let Some(gid) = message.globally_unique_id {
            global_ids::set(&mut self.txn, message.id, gid)?;
        }
        self.index_text(message)?;

        self.record(
            space,
            HistoryOperation::InsertMessage {
                index: message.index(),
                stable_id,
                tags: message.tags,
            },
        );
        Ok(Some(stable_id))
    }

    // -------------------------------------------------------------------------
    // Remove
    // -------------------------------------------------------------------------

    /// Let neighbouring holes absorb the gap left by a removed message.
    fn absorb_gap(&mut self, space: Space, freed: i32) -> Result<(), StrataError> {
        let lower = index::below(&self.txn, space, freed)?;
        let upper = index::above(&self.txn, space, freed)?;

        match (lower, upper) {
            (
                Some((lower_max, IndexEntry::Hole(lower_hole))),
                Some((upper_max, IndexEntry::Hole(upper_hole))),
            ) => {
                tracing::trace!(
                    peer = space.peer_id.0,
                    namespace = space.namespace,
                    min = lower_hole.min,
                    max = upper_max,
                    "merge holes"
                );
                self.delete_hole(space, lower_max, lower_hole);
                self.delete_hole(space, upper_max, upper_hole);
                let merged = StoredHole {
                    stable_id: upper_hole.stable_id,
                    min: lower_hole.min,
                    max_timestamp: lower_hole.max_timestamp.max(upper_hole.max_timestamp),
                    tags: lower_hole.tags.union(upper_hole.tags),
                };
                self.put_hole(space, upper_max, merged)
            }
            (Some((lower_max, IndexEntry::Hole(lower_hole))), upper) => {
                let (new_max, timestamp) = match upper {
                    Some((upper_id, IndexEntry::Message(message))) => {
                        (upper_id - 1, message.timestamp)
                    }
                    _ => (MAX_MESSAGE_ID, OPEN_TIMESTAMP),
                };
                tracing::trace!(min = lower_hole.min, new_max, "extend lower hole");
                self.delete_hole(space, lower_max, lower_hole);
                let extended = StoredHole {
                    max_timestamp: timestamp,
                    ..lower_hole
                };
                self.put_hole(space, new_max, extended)
            }
            (lower, Some((upper_max, IndexEntry::Hole(upper_hole)))) => {
                let new_min = match lower {
                    Some((lower_id, IndexEntry::Message(_))) => lower_id + 1,
                    _ => MIN_MESSAGE_ID,
                };
                tracing::trace!(new_min, max = upper_max, "extend upper hole");
                self.delete_hole(space, upper_max, upper_hole);
                let extended = StoredHole {
                    min: new_min,
                    ..upper_hole
                };
                self.put_hole(space, upper_max, extended)
            }
            _ => Ok(()),
        }
    }

    /// Remove every fan-out trace of a stored message, leaving holes alone.
    fn detach(&mut self, id: MessageId, stored: &StoredMessage) -> Result<(), StrataError> {
        index::delete_message(&mut self.txn, Space::of(id), id.id, stored);
        self.release_media(&stored.media)?;
        self.summaries_removed(id, stored.tags)?;
        pending::remove_all(&mut self.txn, &mut self.changes, id)?;
        if let Some(gid) = stored.globally_unique_id {
            global_ids::remove(&mut self.txn, id, gid)?;
        }
        text_index::remove(&mut self.txn, id)
    }

    fn remove_message(&mut self, id: MessageId) -> Result<bool, StrataError> {
        let space = Space::of(id);
        let Some(stored) = index::message(&self.txn, space, id.id)? else {
            return Ok(false);
        };
        self.detach(id, &stored)?;
        self.sync_unsent(id, false)?;
        self.record(
            space,
            HistoryOperation::RemoveMessage {
                index: MessageIndex::new(id, stored.timestamp),
                stable_id: stored.stable_id,
            },
        );
        self.absorb_gap(space, id.id)?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Point the hole just below `id` at the new timestamp of its successor.
    fn rebound_lower_hole(
        &mut self,
        space: Space,
        id: i32,
        timestamp: i32,
    ) -> Result<(), StrataError> {
        let Some((max, IndexEntry::Hole(hole))) = index::below(&self.txn, space, id)? else {
            return Ok(());
        };
        tracing::trace!(min = hole.min, max, timestamp, "rebound lower hole");
        self.delete_hole(space, max, hole);
        let rebounded = StoredHole {
            max_timestamp: timestamp,
            ..hole
        };
        self.put_hole(space, max, rebounded)
    }

    fn update_message(
        &mut self,
        previous: MessageId,
        message: &StoreMessage,
    ) -> Result<bool, StrataError> {
        let space = Space::of(previous);
        let Some(old) = index::message(&self.txn, space, previous.id)? else {
            return Ok(false);
        };
        validate(message.id)?;

        if previous == message.id {
            let media = self.reference_media(&message.media)?;
            self.release_media(&old.media)?;
            index::delete_message(&mut self.txn, space, previous.id, &old);

            let stored = Self::stored(message, old.stable_id, media);
            index::put_message(&mut self.txn, space, previous.id, &stored)?;
            if old.timestamp != message.timestamp {
                self.rebound_lower_hole(space, previous.id, message.timestamp)?;
            }

            self.summaries_removed(previous, old.tags.difference(message.tags))?;
            self.summaries_inserted(previous, message.tags.difference(old.tags))?;
            pending::remove_all(&mut self.txn, &mut self.changes, previous)?;
            self.sync_unsent(previous, message.flags.awaits_delivery())?;
            if let Some(gid) = old.globally_unique_id {
                global_ids::remove(&mut self.txn, previous, gid)?;
            }
            if let Some(gid) = message.globally_unique_id {
                global_ids::set(&mut self.txn, previous, gid)?;
            }
            text_index::remove(&mut self.txn, previous)?;
            self.index_text(message)?;

            self.record(
                space,
                HistoryOperation::UpdateMessage {
                    previous: MessageIndex::new(previous, old.timestamp),
                    index: message.index(),
                    stable_id: old.stable_id,
                },
            );
        } else {
            // Pinned references keep records shared by both versions alive
            // across the delete.
            let pinned = self.reference_media(&message.media)?;
            self.remove_message(previous)?;
            self.insert_message(message)?;
            self.release_media(&pinned)?;
        }
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Holes
    // -------------------------------------------------------------------------

    fn add_hole(&mut self, id: MessageId) -> Result<(), StrataError> {
        validate(id)?;
        let space = Space::of(id);
        if index::message(&self.txn, space, id.id)?.is_some() {
            return Ok(());
        }

        let lower = index::message_below(&self.txn, space, id.id)?;
        let upper = index::message_above(&self.txn, space, id.id)?;
        let min = lower.map_or(MIN_MESSAGE_ID, |(lower_id, _)| lower_id + 1);
        let (max, timestamp) = upper.map_or((MAX_MESSAGE_ID, OPEN_TIMESTAMP), |(upper_id, m)| {
            (upper_id - 1, m.timestamp)
        });

        let gap_has_hole = index::entries_between(&self.txn, space, min, max)?
            .iter()
            .any(|(_, entry)| matches!(entry, IndexEntry::Hole(_)));
        if gap_has_hole {
            return Ok(());
        }

        tracing::trace!(min, max, "create hole");
        let hole = StoredHole {
            stable_id: index::allocate_stable_id(&mut self.txn)?,
            min,
            max_timestamp: timestamp,
            tags: self.config.existing_tags,
        };
        self.put_hole(space, max, hole)
    }
}

// =============================================================================
// HISTORY TABLE
// =============================================================================

/// Message history over a [`ValueBox`] store.
#[derive(Debug)]
pub struct HistoryTable<B: ValueBox> {
    store: B,
    config: HistoryConfig,
}

impl HistoryTable<StorageBackend> {
    /// A history kept in memory.
    pub fn in_memory(config: HistoryConfig) -> Result<Self, StrataError> {
        Self::new(StorageBackend::InMemory(MemoryBox::new()), config)
    }

    /// A history persisted in the redb file at `path`.
    pub fn open(path: impl AsRef<Path>, config: HistoryConfig) -> Result<Self, StrataError> {
        Self::new(StorageBackend::open(path)?, config)
    }
}

impl<B: ValueBox> HistoryTable<B> {
    /// Wrap a store. Fails when the configuration is inconsistent.
    pub fn new(store: B, config: HistoryConfig) -> Result<Self, StrataError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &B {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> B {
        self.store
    }

    fn reader(&self) -> &dyn StoreRead {
        &self.store
    }

    /// Run one mutation as a single committed batch.
    fn apply<F>(&mut self, mutation: F) -> Result<HistoryChanges, StrataError>
    where
        F: FnOnce(&mut Context<'_>) -> Result<(), StrataError>,
    {
        let (batch, changes) = {
            let mut context = Context {
                txn: Transaction::new(&self.store),
                changes: HistoryChanges::default(),
                config: &self.config,
            };
            mutation(&mut context)?;
            (context.txn.into_batch(), context.changes)
        };
        let writes = batch.len();
        self.store.commit(batch)?;
        tracing::trace!(writes, "history batch committed");
        Ok(changes)
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Insert messages. Occupied slots are left untouched.
    pub fn insert(&mut self, messages: &[StoreMessage]) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(count = messages.len(), "insert messages");
        self.apply(|context| {
            for message in messages {
                context.insert_message(message)?;
            }
            Ok(())
        })
    }

    /// Replace the message at `previous` with `message`.
    ///
    /// Same id keeps the stable id and the hole layout. A different id
    /// removes the old slot (holes absorb it) and inserts at the new one.
    /// A missing `previous` makes this a no-op.
    pub fn update(
        &mut self,
        previous: MessageId,
        message: &StoreMessage,
    ) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(%previous, id = %message.id, "update message");
        self.apply(|context| context.update_message(previous, message).map(|_| ()))
    }

    /// Remove messages. Ids without a message are skipped.
    pub fn remove(&mut self, ids: &[MessageId]) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(count = ids.len(), "remove messages");
        self.apply(|context| {
            for id in ids {
                context.remove_message(*id)?;
            }
            Ok(())
        })
    }

    /// Mark the gap around `id` as unknown.
    pub fn add_hole(&mut self, id: MessageId) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(%id, "add hole");
        self.apply(|context| context.add_hole(id))
    }

    /// Fill the hole containing `anchor` with fetched messages.
    ///
    /// With `tags`, only that tag view's holes are resolved; the range stays
    /// unknown for every other tag.
    pub fn fill_hole(
        &mut self,
        anchor: MessageId,
        fill: HoleFill,
        tags: Option<MessageTags>,
        messages: &[StoreMessage],
    ) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(%anchor, count = messages.len(), complete = fill.complete, "fill hole");
        let scope = FillScope::Single;
        self.apply(|context| context.fill(anchor, fill, tags, scope, messages))
    }

    /// Fill several discontiguous holes of one tag view.
    pub fn fill_multiple_holes(
        &mut self,
        main_hole: MessageId,
        fill: HoleFill,
        tags: MessageTags,
        messages: &[StoreMessage],
    ) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(%main_hole, count = messages.len(), "fill multiple holes");
        let scope = FillScope::Multiple;
        self.apply(|context| context.fill(main_hole, fill, Some(tags), scope, messages))
    }

    /// Overwrite a tag summary with an authoritative snapshot.
    pub fn replace_tag_summary(
        &mut self,
        key: SummaryKey,
        count: i32,
        max_id: i32,
    ) -> Result<HistoryChanges, StrataError> {
        if !key.tag.is_single() {
            return Err(StrataError::InvalidConfig(format!(
                "summary tag {:#x} is not a single bit",
                key.tag.bits()
            )));
        }
        self.apply(|context| {
            summary::replace(&mut context.txn, &mut context.changes, key, count, max_id)
        })
    }

    /// Set (`Some`) or clear (`None`) a pending action. No-op when the
    /// message does not exist.
    pub fn set_pending_action(
        &mut self,
        id: MessageId,
        action_type: u32,
        data: Option<Encoded>,
    ) -> Result<HistoryChanges, StrataError> {
        tracing::debug!(%id, action_type, set = data.is_some(), "pending action");
        self.apply(|context| {
            if index::message(&context.txn, Space::of(id), id.id)?.is_none() {
                return Ok(());
            }
            pending::set(&mut context.txn, &mut context.changes, id, action_type, data)
        })
    }

    /// Index `text` for an existing message, replacing its previous tokens.
    pub fn add_text(
        &mut self,
        id: MessageId,
        text: &str,
        tags: MessageTags,
    ) -> Result<HistoryChanges, StrataError> {
        self.apply(|context| text_index::add(&mut context.txn, id, text, tags))
    }

    /// Drop every text token of `id`.
    pub fn remove_text(&mut self, id: MessageId) -> Result<HistoryChanges, StrataError> {
        self.apply(|context| text_index::remove(&mut context.txn, id))
    }

    /// Store a peer in the built-in directory.
    pub fn set_peer(&mut self, peer: &Peer) -> Result<HistoryChanges, StrataError> {
        self.apply(|context| peers::set(&mut context.txn, peer))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The built-in peer directory.
    #[must_use]
    pub fn peers(&self) -> PeerTable<'_> {
        PeerTable::new(self.reader())
    }

    /// Ordered entries of every namespace of `peer_id`.
    pub fn debug_list(
        &self,
        peer_id: PeerId,
        directory: &dyn PeerDirectory,
    ) -> Result<Vec<RenderedEntry>, StrataError> {
        render::list(self.reader(), peer_id, directory)
    }

    /// Ordered entries of one tag view. A multi-bit `tag` yields nothing.
    pub fn debug_list_tag(
        &self,
        tag: MessageTags,
        peer_id: PeerId,
        directory: &dyn PeerDirectory,
    ) -> Result<Vec<RenderedEntry>, StrataError> {
        render::list_tag(self.reader(), tag, peer_id, directory)
    }

    /// One message, rendered.
    pub fn message(
        &self,
        id: MessageId,
        directory: &dyn PeerDirectory,
    ) -> Result<Option<RenderedMessage>, StrataError> {
        render::message(self.reader(), id, directory)
    }

    /// Messages holding every token of `query`.
    pub fn search(
        &self,
        peer_id: Option<PeerId>,
        query: &str,
        tags: Option<MessageTags>,
    ) -> Result<Vec<MessageId>, StrataError> {
        text_index::search(self.reader(), peer_id, query, tags)
    }

    pub fn tag_summary(&self, key: SummaryKey) -> Result<Option<TagSummary>, StrataError> {
        summary::get(self.reader(), key)
    }

    pub fn pending_action(
        &self,
        id: MessageId,
        action_type: u32,
    ) -> Result<Option<Encoded>, StrataError> {
        pending::get(self.reader(), id, action_type)
    }

    /// Every pending action of `action_type`, ordered by message id.
    pub fn pending_actions(
        &self,
        action_type: u32,
    ) -> Result<Vec<PendingActionRecord>, StrataError> {
        pending::actions(self.reader(), action_type)
    }

    pub fn pending_action_count(&self, key: PendingCountKey) -> Result<i32, StrataError> {
        pending::count(self.reader(), key)
    }

    pub fn media(&self, id: MediaId) -> Result<Option<MediaRecord>, StrataError> {
        media::get(self.reader(), id)
    }

    /// Every shared media record in id order.
    pub fn media_records(&self) -> Result<Vec<MediaRecord>, StrataError> {
        media::records(self.reader())
    }

    /// Messages awaiting delivery.
    pub fn unsent_ids(&self) -> Result<Vec<MessageId>, StrataError> {
        unsent::ids(self.reader())
    }

    pub fn message_id_for_globally_unique_id(
        &self,
        peer_id: PeerId,
        globally_unique_id: i64,
    ) -> Result<Option<MessageId>, StrataError> {
        global_ids::lookup(self.reader(), peer_id, globally_unique_id)
    }
}
