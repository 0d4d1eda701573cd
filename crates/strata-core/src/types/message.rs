//! Message, hole and rendered-entry shapes.

use super::{MediaId, MessageFlags, MessageId, MessageIndex, MessageTags, PeerId, StableId};
use crate::codec::Encoded;
use serde::{Deserialize, Serialize};

// =============================================================================
// INPUT SHAPES
// =============================================================================

/// Forwarding attribution attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardInfo {
    pub author: PeerId,
    pub source: Option<PeerId>,
    pub source_message: Option<MessageId>,
    pub date: i32,
    pub author_signature: Option<String>,
}

/// Media attached to a message.
///
/// Embedded media lives inline with its message and is never shared.
/// External media is stored once in the media table and reference counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Media {
    Embedded(Encoded),
    External { id: MediaId, payload: Encoded },
}

impl Media {
    /// The shared media id, if any.
    #[must_use]
    pub fn id(&self) -> Option<MediaId> {
        match self {
            Self::Embedded(_) => None,
            Self::External { id, .. } => Some(*id),
        }
    }

    #[must_use]
    pub fn payload(&self) -> &Encoded {
        match self {
            Self::Embedded(payload) | Self::External { payload, .. } => payload,
        }
    }
}

/// A message as supplied by the caller for insertion or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMessage {
    pub id: MessageId,
    #[serde(default)]
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    #[serde(default)]
    pub flags: MessageFlags,
    #[serde(default)]
    pub tags: MessageTags,
    #[serde(default)]
    pub forward_info: Option<ForwardInfo>,
    #[serde(default)]
    pub author: Option<PeerId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl StoreMessage {
    /// A plain message with no text, tags, flags or media.
    #[must_use]
    pub fn new(id: MessageId, timestamp: i32) -> Self {
        Self {
            id,
            globally_unique_id: None,
            timestamp,
            flags: MessageFlags::empty(),
            tags: MessageTags::empty(),
            forward_info: None,
            author: None,
            text: String::new(),
            media: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: MessageTags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: PeerId) -> Self {
        self.author = Some(author);
        self
    }

    #[must_use]
    pub fn with_media(mut self, media: Media) -> Self {
        self.media.push(media);
        self
    }

    #[must_use]
    pub fn with_globally_unique_id(mut self, gid: i64) -> Self {
        self.globally_unique_id = Some(gid);
        self
    }

    #[must_use]
    pub fn with_forward_info(mut self, info: ForwardInfo) -> Self {
        self.forward_info = Some(info);
        self
    }

    /// The `(id, timestamp)` index of this message.
    #[must_use]
    pub fn index(&self) -> MessageIndex {
        MessageIndex::new(self.id, self.timestamp)
    }
}

/// A conversation partner as known to the peer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
}

impl Peer {
    #[must_use]
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

// =============================================================================
// HOLES
// =============================================================================

/// An unknown id range `[min, max_index.id.id]` of one `(peer, namespace)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hole {
    pub stable_id: StableId,
    /// Lowest id covered by the hole.
    pub min: i32,
    /// Highest covered id and the best known timestamp at that upper end.
    pub max_index: MessageIndex,
    /// Tag views in which this hole is visible.
    pub tags: MessageTags,
}

impl Hole {
    /// Highest id covered by the hole.
    #[must_use]
    pub const fn max(&self) -> i32 {
        self.max_index.id.id
    }

    #[must_use]
    pub const fn contains(&self, id: i32) -> bool {
        self.min <= id && id <= self.max()
    }

    /// True when the upper timestamp bound is the open sentinel.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.max_index.timestamp == crate::primitives::OPEN_TIMESTAMP
    }
}

/// How a fetched range resolves the hole it was fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillDirection {
    /// Messages were fetched newest first; the remainder lies below them.
    UpperToLower,
    /// Messages were fetched oldest first; the remainder lies above them.
    LowerToUpper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoleFill {
    /// The hole is fully consumed regardless of coverage.
    pub complete: bool,
    pub direction: FillDirection,
}

impl HoleFill {
    #[must_use]
    pub const fn complete() -> Self {
        Self {
            complete: true,
            direction: FillDirection::UpperToLower,
        }
    }

    #[must_use]
    pub const fn partial(direction: FillDirection) -> Self {
        Self {
            complete: false,
            direction,
        }
    }
}

// =============================================================================
// RENDERED ENTRIES
// =============================================================================

/// A stored message resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub stable_id: StableId,
    pub id: MessageId,
    pub globally_unique_id: Option<i64>,
    pub timestamp: i32,
    pub flags: MessageFlags,
    pub tags: MessageTags,
    pub forward_info: Option<ForwardInfo>,
    /// Author as resolved by the peer directory. `None` when unknown.
    pub author: Option<Peer>,
    pub text: String,
    pub media: Vec<Media>,
}

/// One entry of a rendered history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RenderedEntry {
    Message(RenderedMessage),
    Hole(Hole),
}

impl RenderedEntry {
    #[must_use]
    pub fn stable_id(&self) -> StableId {
        match self {
            Self::Message(message) => message.stable_id,
            Self::Hole(hole) => hole.stable_id,
        }
    }

    /// Id range covered by the entry.
    #[must_use]
    pub fn id_range(&self) -> (i32, i32) {
        match self {
            Self::Message(message) => (message.id.id, message.id.id),
            Self::Hole(hole) => (hole.min, hole.max()),
        }
    }
}
