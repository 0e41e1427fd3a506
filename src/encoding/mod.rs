//! Deterministic binary encoding for persisted pages and metadata snapshots.
//!
//! The [`Encode`] and [`Decode`] traits define a hand-written, byte-stable
//! wire format. Because brindex owns this format, the bytes handed to a
//! [`PageStore`](crate::store::PageStore) never change shape due to a
//! dependency upgrade, and a metadata snapshot written by one build is
//! readable by any other.
//!
//! # Wire format
//!
//! | Rust type          | Encoding                                     |
//! |--------------------|----------------------------------------------|
//! | `u32`              | 4 bytes, little-endian                       |
//! | `u64`              | 8 bytes, little-endian                       |
//! | `i32`              | 4 bytes, little-endian                       |
//! | `i64`              | 8 bytes, little-endian                       |
//! | `Vec<u8>`          | `[u32 len][bytes]`                           |
//! | `String`           | `[u32 len][utf-8 bytes]`                     |
//! | sequence of `T`    | `[u32 count][T₁][T₂]…` (via [`encode_seq`])  |
//! | `enum`             | `[u32 variant][fields…]` (hand-written)      |
//!
//! All multi-byte integers are little-endian. Lengths and counts are `u32`,
//! limiting individual items to 4 GiB.
//!
//! Variable-length decoders enforce upper bounds ([`MAX_BYTE_LEN`],
//! [`MAX_SEQ_ELEMENTS`]) so a corrupted length field cannot trigger an
//! allocation bomb.
//!
//! No function in this module panics; all failures surface as
//! [`EncodingError`].

#[cfg(test)]
mod tests;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Safety limits
// ------------------------------------------------------------------------------------------------

/// Maximum byte length accepted for a single `Vec<u8>` or `String` while
/// decoding (64 MiB). Anything larger is rejected as corrupt.
pub const MAX_BYTE_LEN: u32 = 64 * 1024 * 1024;

/// Maximum element count accepted for a sequence while decoding (16 M).
pub const MAX_SEQ_ELEMENTS: u32 = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// An enum discriminant was not recognised.
    #[error("invalid tag {tag} for {type_name}")]
    InvalidTag {
        /// The tag value that was read.
        tag: u32,
        /// The Rust type being decoded.
        type_name: &'static str,
    },

    /// A byte sequence decoded as a string was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A length or count exceeded its safety limit.
    #[error("length overflow: {0}")]
    LengthOverflow(String),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations must be deterministic: the same logical value always
/// yields the exact same byte sequence.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from the front of a byte slice.
///
/// Returns `(value, bytes_consumed)` so callers can advance a cursor
/// through a buffer holding multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`, returning `(value, consumed)`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Encode a slice of values as `[u32 count][T₁][T₂]…`.
pub fn encode_seq<T: Encode>(items: &[T], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    let count = len_to_u32(items.len())?;
    count.encode_to(buf)?;
    for item in items {
        item.encode_to(buf)?;
    }
    Ok(())
}

/// Decode a sequence written by [`encode_seq`], returning `(items, consumed)`.
pub fn decode_seq<T: Decode>(buf: &[u8]) -> Result<(Vec<T>, usize), EncodingError> {
    let mut offset = 0;
    let (count, n) = u32::decode_from(buf)?;
    offset += n;
    if count > MAX_SEQ_ELEMENTS {
        return Err(EncodingError::LengthOverflow(format!(
            "sequence count {count} exceeds limit {MAX_SEQ_ELEMENTS}"
        )));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (item, n) = T::decode_from(&buf[offset..])?;
        offset += n;
        items.push(item);
    }
    Ok((items, offset))
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` holds at least `needed` bytes.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Convert a `usize` length to `u32`, rejecting values above 4 GiB.
#[inline]
fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("length {len} exceeds u32 range")))
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

macro_rules! impl_le_int {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
                    buf.extend_from_slice(&self.to_le_bytes());
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
                    const WIDTH: usize = std::mem::size_of::<$ty>();
                    require(buf, WIDTH)?;
                    let mut raw = [0u8; WIDTH];
                    raw.copy_from_slice(&buf[..WIDTH]);
                    Ok((<$ty>::from_le_bytes(raw), WIDTH))
                }
            }
        )*
    };
}

impl_le_int!(u32, u64, i32, i64);

impl Encode for Vec<u8> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = len_to_u32(self.len())?;
        len.encode_to(buf)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl Decode for Vec<u8> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (len, n) = u32::decode_from(buf)?;
        offset += n;
        if len > MAX_BYTE_LEN {
            return Err(EncodingError::LengthOverflow(format!(
                "byte length {len} exceeds limit {MAX_BYTE_LEN}"
            )));
        }
        let len = len as usize;
        require(&buf[offset..], len)?;
        let bytes = buf[offset..offset + len].to_vec();
        Ok((bytes, offset + len))
    }
}

impl Encode for String {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = len_to_u32(self.len())?;
        len.encode_to(buf)?;
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bytes, consumed) = Vec::<u8>::decode_from(buf)?;
        Ok((String::from_utf8(bytes)?, consumed))
    }
}
