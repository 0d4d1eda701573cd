//! # Core Type Definitions
//!
//! This module contains the identifier and mask types for the strata history engine:
//! - Conversation and message identifiers (`PeerId`, `MessageId`, `MessageIndex`)
//! - Media and render identity (`MediaId`, `StableId`)
//! - Bit masks (`MessageTags`, `MessageFlags`)
//! - Error types (`StrataError`)
//!
//! Message input/output shapes live in the `message` submodule.
//!
//! ## Ordering Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Message ordering is always scoped to one `(peer, namespace)` pair and uses
//! the `id` alone, never the timestamp.

mod message;

pub use message::{
    FillDirection, ForwardInfo, Hole, HoleFill, Media, Peer, RenderedEntry, RenderedMessage,
    StoreMessage,
};

use crate::primitives::{MAX_MESSAGE_ID, MIN_MESSAGE_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

// =============================================================================
// CONVERSATION & MESSAGE IDENTIFIERS
// =============================================================================

/// Identifier of a conversation partner (user, group or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub i64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message slot inside one conversation.
///
/// Field order matters: the derived `Ord` sorts by peer, then namespace, then id,
/// which is the same order the storage keys use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    /// The conversation this message belongs to.
    pub peer_id: PeerId,
    /// Message namespace inside the conversation (e.g. cloud vs. local).
    pub namespace: i32,
    /// Position inside `(peer_id, namespace)`. Valid range is `[1, i32::MAX]`.
    pub id: i32,
}

impl MessageId {
    /// Create a new message id.
    #[must_use]
    pub const fn new(peer_id: PeerId, namespace: i32, id: i32) -> Self {
        Self {
            peer_id,
            namespace,
            id,
        }
    }

    /// Same conversation and namespace, different position.
    #[must_use]
    pub const fn with_id(self, id: i32) -> Self {
        Self { id, ..self }
    }

    /// Check that the id lies inside the addressable space.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.id >= MIN_MESSAGE_ID && self.id <= MAX_MESSAGE_ID
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.peer_id, self.namespace, self.id)
    }
}

/// A message id paired with its timestamp.
///
/// Holes use it for their upper bound: `max_index.timestamp` is the best known
/// timestamp at the top of the unknown range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageIndex {
    pub id: MessageId,
    pub timestamp: i32,
}

impl MessageIndex {
    #[must_use]
    pub const fn new(id: MessageId, timestamp: i32) -> Self {
        Self { id, timestamp }
    }
}

/// Global identifier of a shareable media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaId {
    pub namespace: i32,
    pub id: i64,
}

impl MediaId {
    #[must_use]
    pub const fn new(namespace: i32, id: i64) -> Self {
        Self { namespace, id }
    }
}

/// Process-local surrogate identifying a rendered entry across updates.
///
/// Allocated from a persisted counter; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StableId(pub u32);

// =============================================================================
// TAG MASK
// =============================================================================

/// Bitmask classifying a message for filtered views (e.g. "media", "unread").
///
/// Each set bit selects one tag-scoped view.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MessageTags(pub u32);

impl MessageTags {
    /// The empty mask.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The single tag at bit position `index` (0..32).
    #[must_use]
    pub const fn bit(index: u8) -> Self {
        Self(1u32 << (index % 32))
    }

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when exactly one bit is set.
    #[must_use]
    pub const fn is_single(self) -> bool {
        self.0.count_ones() == 1
    }

    /// True when every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Bit position of the lowest set bit. Meaningful for single-bit masks.
    #[must_use]
    pub const fn bit_index(self) -> u8 {
        self.0.trailing_zeros() as u8
    }

    /// Iterate the single-bit tags of this mask, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = MessageTags> {
        (0u8..32)
            .map(MessageTags::bit)
            .filter(move |tag| self.contains(*tag))
    }
}

impl BitOr for MessageTags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for MessageTags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

// =============================================================================
// MESSAGE FLAGS
// =============================================================================

/// Delivery state flags of a stored message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MessageFlags(pub u32);

impl MessageFlags {
    /// Outgoing message not yet acknowledged by the server.
    pub const UNSENT: Self = Self(1 << 0);
    /// Sending gave up; the message stays local.
    pub const FAILED: Self = Self(1 << 1);
    /// Message received from the other side.
    pub const INCOMING: Self = Self(1 << 2);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Unsent and not failed: the message belongs in the unsent queue.
    #[must_use]
    pub const fn awaits_delivery(self) -> bool {
        self.contains(Self::UNSENT) && !self.contains(Self::FAILED)
    }
}

impl BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the strata engine.
///
/// Not-found conditions are never errors: they resolve to no-ops or empty
/// results. Storage failures are passed through without retry.
#[derive(Debug, Error)]
pub enum StrataError {
    /// The storage primitive failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A value could not be encoded for storage.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored value could not be decoded.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// The message id lies outside `[1, i32::MAX]`.
    #[error("Invalid message id: {0}")]
    InvalidMessageId(MessageId),

    /// The configuration is inconsistent or unreadable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// TESTS
// =============================================================================
