//! Decompression of framed package payloads.
//!
//! Compressed entries and compressed file tables begin with an 8-byte
//! preamble: a FourCC naming the codec and the little-endian decompressed
//! size. The codec data follows.

use sar_common::BinaryReader;
use zstd::dict::DecoderDictionary;

use crate::{Error, Result};

/// Upper bound on any single decompressed payload or dictionary.
pub const MAX_READ_SIZE: u64 = 1 << 30;

/// Size of the codec preamble.
pub const PREAMBLE_SIZE: usize = 8;

/// Block codec used by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Raw LZ4 blocks, used by version 16 packages.
    Lz4,
    /// Zstandard frames, optionally dictionary-assisted.
    Zstd,
}

impl Codec {
    /// FourCC written in the preamble.
    pub const fn magic(self) -> &'static [u8; 4] {
        match self {
            Self::Lz4 => b"LZ4C",
            Self::Zstd => b"ZSTD",
        }
    }
}

/// A prepared Zstandard decompression dictionary.
pub struct DecompressionDict {
    size: usize,
    prepared: DecoderDictionary<'static>,
}

impl DecompressionDict {
    /// Prepare a dictionary from its raw bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() as u64 > MAX_READ_SIZE {
            return Err(Error::InvalidDictionary(format!(
                "dictionary size {} is out of range",
                bytes.len()
            )));
        }

        Ok(Self {
            size: bytes.len(),
            prepared: DecoderDictionary::copy(bytes),
        })
    }

    /// Size of the raw dictionary in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false; empty dictionaries are rejected.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl std::fmt::Debug for DecompressionDict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressionDict")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Split a framed payload into its declared size and codec data.
fn split_preamble(codec: Codec, data: &[u8]) -> Result<(usize, &[u8])> {
    let mut reader = BinaryReader::new(data);
    reader
        .expect_magic(codec.magic())
        .map_err(|e| Error::Decompression(e.to_string()))?;
    let size = reader
        .read_u32()
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if size as u64 > MAX_READ_SIZE {
        return Err(Error::Decompression(format!(
            "declared size {size} exceeds the {MAX_READ_SIZE} byte limit"
        )));
    }

    Ok((size as usize, reader.remaining_bytes()))
}

fn check_size(output: Vec<u8>, expected: usize) -> Result<Vec<u8>> {
    if output.len() != expected {
        return Err(Error::Decompression(format!(
            "decompressed {} bytes, expected {expected}",
            output.len()
        )));
    }
    Ok(output)
}

/// Decompress an `LZ4C` framed payload.
pub fn decompress_lz4(data: &[u8]) -> Result<Vec<u8>> {
    let (size, body) = split_preamble(Codec::Lz4, data)?;
    let output = lz4_flex::block::decompress(body, size)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    check_size(output, size)
}

/// Decompress a `ZSTD` framed payload.
pub fn decompress_zstd(data: &[u8], dict: Option<&DecompressionDict>) -> Result<Vec<u8>> {
    let (size, body) = split_preamble(Codec::Zstd, data)?;

    let mut decompressor = match dict {
        Some(dict) => zstd::bulk::Decompressor::with_prepared_dictionary(&dict.prepared),
        None => zstd::bulk::Decompressor::new(),
    }
    .map_err(|e| Error::Decompression(e.to_string()))?;

    let output = decompressor
        .decompress(body, size)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    check_size(output, size)
}

/// Decompress a framed payload with the given codec.
///
/// The dictionary is only consulted by Zstandard.
pub fn decompress(codec: Codec, data: &[u8], dict: Option<&DecompressionDict>) -> Result<Vec<u8>> {
    match codec {
        Codec::Lz4 => decompress_lz4(data),
        Codec::Zstd => decompress_zstd(data, dict),
    }
}
