//! # strata-core
//!
//! The message history storage engine for Strata.
//!
//! This crate keeps, per conversation, the ordered and gap-aware sequence of
//! messages and holes, plus every structure derived from it:
//! - tag-scoped views mirroring the primary sequence
//! - reference-counted shared media
//! - per-tag summaries with authoritative replacement
//! - pending actions with per-conversation counters
//! - an unsent-message set and a globally-unique-id lookup
//! - a tokenized full-text index
//!
//! ## Architectural Constraints
//!
//! - Every public mutation commits as one write batch or not at all
//! - Every mutation returns a [`HistoryChanges`] describing what it did
//! - Storage is a narrow ordered key-value seam ([`ValueBox`]) with an
//!   in-memory and a redb implementation
//! - No async, no network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod codec;
pub mod config;
pub mod global_ids;
pub mod history;
pub mod media;
pub mod operations;
pub mod peers;
pub mod pending;
pub mod primitives;
pub mod storage;
pub mod summary;
mod tags;
pub mod text_index;
pub mod types;
pub mod unsent;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    FillDirection, ForwardInfo, Hole, HoleFill, Media, MediaId, MessageFlags, MessageId,
    MessageIndex, MessageTags, Peer, PeerId, RenderedEntry, RenderedMessage, StableId,
    StoreMessage, StrataError,
};

// =============================================================================
// RE-EXPORTS: History Engine
// =============================================================================

pub use codec::{Encoded, PayloadType};
pub use config::HistoryConfig;
pub use history::HistoryTable;
pub use media::MediaRecord;
pub use operations::{HistoryChanges, HistoryOperation, PendingActionOperation, UnsentOperation};
pub use peers::{PeerDirectory, PeerTable};
pub use pending::{PendingActionRecord, PendingCountKey};
pub use summary::{SummaryKey, TagSummary};
pub use text_index::{sanitize_query, tokenize};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{
    KeyRange, MemoryBox, RedbBox, ScanOrder, StorageBackend, StoreRead, Table, ValueBox,
    WriteBatch,
};
