//! # Engine Primitives
//!
//! Fixed constants of the strata history engine.
//!
//! These values are compiled into the binary and shape both the addressable
//! id space and the persisted key layout. Changing any of them invalidates
//! existing databases.

/// Lowest addressable message id inside a `(peer, namespace)` space.
pub const MIN_MESSAGE_ID: i32 = 1;

/// Highest addressable message id inside a `(peer, namespace)` space.
pub const MAX_MESSAGE_ID: i32 = i32::MAX;

/// Timestamp sentinel marking a hole whose upper end is open/unbounded.
pub const OPEN_TIMESTAMP: i32 = i32::MAX;

// =============================================================================
// TEXT INDEX LIMITS
// =============================================================================

/// Maximum number of tokens taken from a search query.
///
/// Extra tokens are dropped, which keeps every query computationally bounded.
pub const MAX_QUERY_TOKENS: usize = 32;

/// Maximum length in characters of a single indexed token.
///
/// Longer words are truncated before indexing and before matching.
pub const MAX_TOKEN_CHARS: usize = 64;

// =============================================================================
// STABLE ID ALLOCATION
// =============================================================================

/// First stable id handed out by a fresh store.
pub const FIRST_STABLE_ID: u32 = 1;

/// Metadata key of the persisted stable id counter.
pub const NEXT_STABLE_ID_KEY: &[u8] = b"next_stable_id";
