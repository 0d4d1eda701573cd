//! # Change Sets
//!
//! Every mutating call returns a [`HistoryChanges`] describing what it did,
//! for downstream propagation (views, badges, sync). A change set is built
//! while the mutation runs and handed out only after its batch committed, so
//! it never describes state that did not land.

use crate::codec::Encoded;
use crate::pending::PendingCountKey;
use crate::summary::{SummaryKey, TagSummary};
use crate::{Hole, MessageId, MessageIndex, MessageTags, PeerId, StableId};
use serde::Serialize;
use std::collections::BTreeMap;

/// One change to a peer's ordered history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HistoryOperation {
    InsertMessage {
        index: MessageIndex,
        stable_id: StableId,
        tags: MessageTags,
    },
    InsertHole(Hole),
    RemoveMessage {
        index: MessageIndex,
        stable_id: StableId,
    },
    RemoveHole(Hole),
    UpdateMessage {
        previous: MessageIndex,
        index: MessageIndex,
        stable_id: StableId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnsentOperation {
    Insert(MessageId),
    Remove(MessageId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PendingActionOperation {
    Set {
        id: MessageId,
        action_type: u32,
        data: Encoded,
    },
    Remove {
        id: MessageId,
        action_type: u32,
    },
}

/// Everything one mutating call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryChanges {
    /// Ordered history operations per peer, in application order.
    pub operations_by_peer: BTreeMap<PeerId, Vec<HistoryOperation>>,
    pub unsent: Vec<UnsentOperation>,
    pub pending_actions: Vec<PendingActionOperation>,
    /// Final value of every pending counter touched.
    pub pending_counts: BTreeMap<PendingCountKey, i32>,
    /// Final value of every summary touched.
    pub summaries: BTreeMap<SummaryKey, TagSummary>,
}

impl HistoryChanges {
    pub(crate) fn record(&mut self, peer_id: PeerId, operation: HistoryOperation) {
        self.operations_by_peer
            .entry(peer_id)
            .or_default()
            .push(operation);
    }

    /// Operations recorded for `peer_id`.
    #[must_use]
    pub fn operations(&self, peer_id: PeerId) -> &[HistoryOperation] {
        self.operations_by_peer
            .get(&peer_id)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations_by_peer.is_empty()
            && self.unsent.is_empty()
            && self.pending_actions.is_empty()
            && self.pending_counts.is_empty()
            && self.summaries.is_empty()
    }
}
