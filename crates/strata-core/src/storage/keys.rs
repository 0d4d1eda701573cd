//! Order-preserving composite key encoding.
//!
//! Keys compare byte-wise in the same order as the tuples they encode:
//! integers are big-endian with the sign bit flipped, and strings carry a
//! big-endian `u16` length prefix so that a string component never bleeds
//! into the next one.

use crate::StrataError;

const SIGN_32: u32 = 0x8000_0000;
const SIGN_64: u64 = 0x8000_0000_0000_0000;

/// Builds a composite key component by component.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    bytes: Vec<u8>,
}

impl KeyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(24),
        }
    }

    #[must_use]
    pub fn u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    #[must_use]
    pub fn u32(mut self, value: u32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    #[must_use]
    pub fn i32(self, value: i32) -> Self {
        self.u32((value as u32) ^ SIGN_32)
    }

    #[must_use]
    pub fn i64(mut self, value: i64) -> Self {
        self.bytes
            .extend_from_slice(&((value as u64) ^ SIGN_64).to_be_bytes());
        self
    }

    /// Append a length-prefixed string. Strings longer than `u16::MAX`
    /// bytes are truncated at a char boundary.
    #[must_use]
    pub fn str(mut self, value: &str) -> Self {
        let mut end = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &value.as_bytes()[..end];
        self.bytes.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.bytes.extend_from_slice(bytes);
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads components back out of a key built by [`KeyBuilder`].
#[derive(Debug)]
pub struct KeyReader<'a> {
    bytes: &'a [u8],
}

impl<'a> KeyReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StrataError> {
        if self.bytes.len() < len {
            return Err(StrataError::DeserializationError(format!(
                "truncated key: need {} bytes, have {}",
                len,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StrataError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, StrataError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u32(&mut self) -> Result<u32, StrataError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, StrataError> {
        Ok((self.u32()? ^ SIGN_32) as i32)
    }

    pub fn i64(&mut self) -> Result<i64, StrataError> {
        Ok((u64::from_be_bytes(self.array()?) ^ SIGN_64) as i64)
    }

    pub fn str(&mut self) -> Result<&'a str, StrataError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|e| StrataError::DeserializationError(e.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn key_i32(value: i32) -> Vec<u8> {
        KeyBuilder::new().i32(value).build()
    }

    fn key_i64(value: i64) -> Vec<u8> {
        KeyBuilder::new().i64(value).build()
    }

    #[test]
    fn signed_integers_sort_numerically() {
        let values = [i32::MIN, -70_000, -1, 0, 1, 255, 256, i32::MAX];
        for pair in values.windows(2) {
            assert!(key_i32(pair[0]) < key_i32(pair[1]), "{} < {}", pair[0], pair[1]);
        }

        let wide = [i64::MIN, -1, 0, 1 << 40, i64::MAX];
        for pair in wide.windows(2) {
            assert!(key_i64(pair[0]) < key_i64(pair[1]));
        }
    }

    #[test]
    fn composite_keys_sort_by_components() {
        let a = KeyBuilder::new().i64(1).i32(0).i32(900).build();
        let b = KeyBuilder::new().i64(1).i32(1).i32(1).build();
        let c = KeyBuilder::new().i64(2).i32(-5).i32(1).build();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn length_prefix_separates_strings() {
        let short = KeyBuilder::new().str("ab").i32(9).build();
        let long = KeyBuilder::new().str("abc").i32(1).build();
        assert!(!long.starts_with(&KeyBuilder::new().str("ab").build()));
        assert_ne!(short, long);
    }

    #[test]
    fn reader_decodes_components() {
        let key = KeyBuilder::new()
            .str("hello")
            .i64(-42)
            .i32(7)
            .u8(3)
            .u32(99)
            .build();
        let mut reader = KeyReader::new(&key);
        assert_eq!(reader.str().expect("str"), "hello");
        assert_eq!(reader.i64().expect("i64"), -42);
        assert_eq!(reader.i32().expect("i32"), 7);
        assert_eq!(reader.u8().expect("u8"), 3);
        assert_eq!(reader.u32().expect("u32"), 99);
        assert!(reader.u8().is_err());
    }
}
