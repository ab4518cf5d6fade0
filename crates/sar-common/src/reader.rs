//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that efficiently
//! reads binary data from a byte slice without copying, and [`EndianSwap`],
//! which corrects values read from an archive cooked with the opposite byte
//! order.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// Reverses the byte order of every multi-byte field of a value.
///
/// Single-byte fields are left untouched.
pub trait EndianSwap {
    fn endian_swap(&mut self);
}

macro_rules! impl_endian_swap {
    ($($ty:ty),*) => {
        $(
            impl EndianSwap for $ty {
                #[inline]
                fn endian_swap(&mut self) {
                    *self = self.swap_bytes();
                }
            }
        )*
    };
}

impl_endian_swap!(u16, u32, u64);

impl EndianSwap for u8 {
    #[inline]
    fn endian_swap(&mut self) {}
}

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// Primitive reads (`read_u32`) are little-endian. Structures
/// read with [`read_struct`](Self::read_struct) use host byte order, and
/// [`read_swappable`](Self::read_swappable) optionally corrects them.
///
/// # Example
///
/// ```
/// use sar_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.read_u32().unwrap(), 0x08070605);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a string of `length` bytes whose last byte must be a null terminator.
    ///
    /// Returns the bytes before the terminator.
    pub fn read_terminated_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let bytes = self.read_bytes(length)?;
        match bytes.split_last() {
            Some((0, body)) => Ok(body),
            _ => Err(Error::MissingNullTerminator),
        }
    }

    /// Read a struct using zerocopy, in host byte order.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Read a struct and swap its byte order when `swap` is set.
    #[inline]
    pub fn read_swappable<T: FromBytes + EndianSwap>(&mut self, swap: bool) -> Result<T> {
        let mut value = self.read_struct::<T>()?;
        if swap {
            value.endian_swap();
        }
        Ok(value)
    }

    /// Expect specific magic bytes.
    pub fn expect_magic(&mut self, expected: &[u8]) -> Result<()> {
        let actual = self.read_bytes(expected.len())?;
        if actual != expected {
            return Err(Error::InvalidMagic {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x04030201
            0xFF, 0xFF, 0xFF, 0xFF, // u32: 0xFFFFFFFF
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert_eq!(reader.read_u32().unwrap(), 0xFFFFFFFF);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_terminated_bytes() {
        let data = b"hello\0world";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_terminated_bytes(6).unwrap(), b"hello");
        assert!(matches!(
            reader.read_terminated_bytes(5),
            Err(Error::MissingNullTerminator)
        ));
    }

    #[test]
    fn test_read_terminated_bytes_empty() {
        let mut reader = BinaryReader::new(b"");
        assert!(matches!(
            reader.read_terminated_bytes(0),
            Err(Error::MissingNullTerminator)
        ));
    }

    #[test]
    fn test_read_swappable() {
        let value = 0x1122_3344u32;
        let bytes = value.swap_bytes().to_ne_bytes();

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_swappable::<u32>(true).unwrap(), value);

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_swappable::<u32>(false).unwrap(), value.swap_bytes());
    }

    #[test]
    fn test_expect_magic() {
        let mut reader = BinaryReader::new(b"ZSTDrest");
        assert!(reader.expect_magic(b"ZSTD").is_ok());
        assert_eq!(reader.position(), 4);
        assert!(reader.expect_magic(b"LZ4C").is_err());
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        assert!(reader.read_u32().is_err());
    }
}
