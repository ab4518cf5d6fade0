//! Common utilities for SAR packages.
//!
//! This crate provides the foundational types shared by the package reader and
//! its tools:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`EndianSwap`] - Byte order correction for archives cooked on the other endianness
//! - [`GamePath`] - Case-insensitive `config://` / `content://` file paths
//! - [`crc`] - CRC32 (IEEE) hashing utilities

mod error;
mod path;
mod reader;

pub mod crc;

pub use error::{Error, Result};
pub use path::{FileType, GameDirectory, GamePath, Platform};
pub use reader::{BinaryReader, EndianSwap};

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for byte searching
pub use memchr;
