//! Error types for the package crate.

use thiserror::Error;

/// Broad classes of package failures.
///
/// Structural and resource failures during load leave the whole package
/// unusable. Integrity and IO failures are local to the call that hit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed header or file table, truncated data.
    Structural,
    /// CRC32 mismatch.
    Integrity,
    /// Seek, read, write or flush failure.
    Io,
    /// Unusable compression dictionary.
    Resource,
    /// The caller asked for something the package cannot do.
    Usage,
}

/// Errors that can occur when working with SAR packages.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] sar_common::Error),

    /// Buffer too small to hold a header.
    #[error("header truncated: needed {needed} bytes but only {available} available")]
    HeaderTooSmall { needed: usize, available: usize },

    /// Invalid package signature, in either byte order.
    #[error("invalid package signature: expected {expected:#06x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Unsupported header version.
    #[error("unsupported package version: {0}")]
    UnsupportedVersion(u32),

    /// Game directory field out of range.
    #[error("invalid game directory: {0}")]
    InvalidGameDirectory(u16),

    /// Platform field out of range.
    #[error("invalid platform: {0}")]
    InvalidPlatform(u8),

    /// Archive size disagrees with the header.
    #[error("package size mismatch: header declares {expected} bytes, archive is {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Malformed file table.
    #[error("invalid file table: {0}")]
    InvalidFileTable(String),

    /// An entry's data range lies outside the archive.
    #[error("entry {path:?} range [{offset}, +{size}) exceeds package size {total}")]
    EntryOutOfBounds {
        path: String,
        offset: u64,
        size: u64,
        total: u64,
    },

    /// The same path appears twice in the file table.
    #[error("duplicate file table entry: {0}")]
    DuplicateEntry(String),

    /// CRC32 mismatch.
    #[error("CRC32 mismatch for {what}: expected {expected:#010x}, got {actual:#010x}")]
    Crc32Mismatch {
        what: String,
        expected: u32,
        actual: u32,
    },

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Compression dictionary could not be resolved.
    #[error("invalid compression dictionary: {0}")]
    InvalidDictionary(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The package failed to load.
    #[error("package is not loaded: {0}")]
    NotLoaded(String),

    /// Package files can only be opened for reading.
    #[error("unsupported open mode: {0:?}")]
    UnsupportedOpenMode(crate::OpenMode),

    /// The package source was not opened for writing.
    #[error("package is not writable")]
    NotWritable,

    /// Directory listing is unavailable for this query.
    #[error("directory query unsupported: {0}")]
    DirectoryQueryUnsupported(String),

    /// Invalid combination of load options.
    #[error("invalid package options: {0}")]
    InvalidOptions(&'static str),
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::Common(_)
            | Self::HeaderTooSmall { .. }
            | Self::InvalidSignature { .. }
            | Self::UnsupportedVersion(_)
            | Self::InvalidGameDirectory(_)
            | Self::InvalidPlatform(_)
            | Self::SizeMismatch { .. }
            | Self::InvalidFileTable(_)
            | Self::EntryOutOfBounds { .. }
            | Self::DuplicateEntry(_)
            | Self::Decompression(_) => ErrorCategory::Structural,
            Self::Crc32Mismatch { .. } => ErrorCategory::Integrity,
            Self::InvalidDictionary(_) => ErrorCategory::Resource,
            Self::EntryNotFound(_)
            | Self::NotLoaded(_)
            | Self::UnsupportedOpenMode(_)
            | Self::NotWritable
            | Self::DirectoryQueryUnsupported(_)
            | Self::InvalidOptions(_) => ErrorCategory::Usage,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::EntryNotFound(_) => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;
