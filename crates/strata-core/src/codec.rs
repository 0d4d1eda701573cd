//! # Payload Codec
//!
//! Opaque payload encoding for media and pending-action data.
//!
//! The engine never needs the decoded form of these payloads beyond equality
//! and size, so they are carried as an [`Encoded`] value: a compile-time type
//! tag plus postcard bytes. Callers register payload types by implementing
//! [`PayloadType`].
//!
//! The module also hosts the postcard helpers every table uses to persist its
//! values.

use crate::StrataError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A serde type that can travel as an opaque payload.
///
/// `TYPE_TAG` must be unique per payload type within one application.
pub trait PayloadType: Serialize + DeserializeOwned {
    const TYPE_TAG: u32;
}

/// Encoded payload: type tag plus serialized bytes.
///
/// Two payloads are equal iff both tag and bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Encoded {
    pub type_tag: u32,
    pub bytes: Vec<u8>,
}

impl Encoded {
    /// Wrap already-encoded bytes.
    #[must_use]
    pub fn from_raw(type_tag: u32, bytes: Vec<u8>) -> Self {
        Self { type_tag, bytes }
    }

    /// Encode a payload value.
    pub fn encode<T: PayloadType>(value: &T) -> Result<Self, StrataError> {
        Ok(Self {
            type_tag: T::TYPE_TAG,
            bytes: to_bytes(value)?,
        })
    }

    /// Decode back into `T`.
    ///
    /// Returns `Ok(None)` when the payload carries a different type tag.
    pub fn decode<T: PayloadType>(&self) -> Result<Option<T>, StrataError> {
        if self.type_tag != T::TYPE_TAG {
            return Ok(None);
        }
        from_bytes(&self.bytes).map(Some)
    }

    /// Size of the encoded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Serialize a stored value with postcard.
pub(crate) fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StrataError> {
    postcard::to_allocvec(value).map_err(|e| StrataError::SerializationError(e.to_string()))
}

/// Deserialize a stored value with postcard.
pub(crate) fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StrataError> {
    postcard::from_bytes(bytes).map_err(|e| StrataError::DeserializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
