//! CRC32 hashing utilities.
//!
//! SAR packages use the standard IEEE 802.3 CRC32 polynomial for both the
//! pre-cook content checksum and the post-cook on-disk checksum.

/// Compute the CRC32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
