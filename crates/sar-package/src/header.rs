//! Package header parsing.
//!
//! Every package starts with a 48-byte header: an 8-byte prefix holding the
//! signature and version, followed by a 40-byte payload whose layout depends
//! on the version. The raw layouts are parsed into a [`HeaderLayout`] and
//! normalized once into a [`PackageHeader`]; nothing downstream of the
//! header branches on the raw layout.

use sar_common::{BinaryReader, EndianSwap, GameDirectory, Platform};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::decompress::Codec;
use crate::{Error, Result};

/// Package signature.
pub const PACKAGE_SIGNATURE: u32 = 0xDA7F;

/// Version written by the current cooker.
pub const PACKAGE_VERSION: u32 = 21;

/// Size of the on-disk header in bytes.
pub const HEADER_SIZE: usize = 48;

/// Signature and version, common to every header version.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct HeaderPrefix {
    pub signature: u32,
    pub version: u32,
}

/// Header payload for version 13.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct HeaderV13 {
    pub total_package_size: u64,
    pub offset_to_file_table: u64,
    pub total_entries: u32,
    pub game_directory: u16,
    pub compressed_file_table: u16,
    pub file_table_size: u32,
    pub build_version_major: u32,
    pub build_changelist: u32,
    pub package_variation: u16,
    pub supports_directory_queries: u8,
    pub obfuscated: u8,
}

/// Header payload for versions 16 and 17.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct HeaderV16 {
    pub total_package_size: u64,
    pub offset_to_file_table: u64,
    pub total_entries: u32,
    pub game_directory: u16,
    pub compressed_file_table: u16,
    pub file_table_size: u32,
    pub build_version_major: u32,
    pub build_changelist: u32,
    pub supports_directory_queries: u16,
    pub obfuscated: u16,
}

/// Header payload for versions 18 through 20.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct HeaderV18 {
    pub total_package_size: u64,
    pub offset_to_file_table: u64,
    pub total_entries: u32,
    pub game_directory: u16,
    pub compressed_file_table: u16,
    pub file_table_size: u32,
    pub build_version_major: u32,
    pub build_changelist: u32,
    pub supports_directory_queries: u16,
    pub obfuscated: u8,
    pub platform: u8,
}

/// Header payload for version 21.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct HeaderV21 {
    pub total_package_size: u64,
    pub offset_to_file_table: u64,
    pub total_entries: u32,
    pub game_directory: u16,
    pub compressed_file_table: u16,
    pub file_table_size: u32,
    pub package_variation: u16,
    pub build_version_major: u16,
    pub build_changelist: u32,
    pub supports_directory_queries: u16,
    pub obfuscated: u8,
    pub platform: u8,
}

impl EndianSwap for HeaderPrefix {
    fn endian_swap(&mut self) {
        self.signature = self.signature.swap_bytes();
        self.version = self.version.swap_bytes();
    }
}

// Fields shared by every payload layout.
macro_rules! swap_common_fields {
    ($header:expr) => {
        $header.total_package_size = $header.total_package_size.swap_bytes();
        $header.offset_to_file_table = $header.offset_to_file_table.swap_bytes();
        $header.total_entries = $header.total_entries.swap_bytes();
        $header.game_directory = $header.game_directory.swap_bytes();
        $header.compressed_file_table = $header.compressed_file_table.swap_bytes();
        $header.file_table_size = $header.file_table_size.swap_bytes();
    };
}

impl EndianSwap for HeaderV13 {
    fn endian_swap(&mut self) {
        swap_common_fields!(self);
        self.build_version_major = self.build_version_major.swap_bytes();
        self.build_changelist = self.build_changelist.swap_bytes();
        self.package_variation = self.package_variation.swap_bytes();
    }
}

impl EndianSwap for HeaderV16 {
    fn endian_swap(&mut self) {
        swap_common_fields!(self);
        self.build_version_major = self.build_version_major.swap_bytes();
        self.build_changelist = self.build_changelist.swap_bytes();
        self.supports_directory_queries = self.supports_directory_queries.swap_bytes();
        self.obfuscated = self.obfuscated.swap_bytes();
    }
}

impl EndianSwap for HeaderV18 {
    fn endian_swap(&mut self) {
        swap_common_fields!(self);
        self.build_version_major = self.build_version_major.swap_bytes();
        self.build_changelist = self.build_changelist.swap_bytes();
        self.supports_directory_queries = self.supports_directory_queries.swap_bytes();
    }
}

impl EndianSwap for HeaderV21 {
    fn endian_swap(&mut self) {
        swap_common_fields!(self);
        self.package_variation = self.package_variation.swap_bytes();
        self.build_version_major = self.build_version_major.swap_bytes();
        self.build_changelist = self.build_changelist.swap_bytes();
        self.supports_directory_queries = self.supports_directory_queries.swap_bytes();
    }
}

/// A header payload tagged with the layout it was read as.
#[derive(Debug, Clone, Copy)]
pub enum HeaderLayout {
    V13(HeaderV13),
    V16(HeaderV16),
    V18(HeaderV18),
    V21(HeaderV21),
}

impl HeaderLayout {
    /// Read the payload for `version`, correcting byte order when `swap` is set.
    pub fn read(reader: &mut BinaryReader<'_>, version: u32, swap: bool) -> Result<Self> {
        let layout = match version {
            13 => Self::V13(reader.read_swappable(swap)?),
            16 | 17 => Self::V16(reader.read_swappable(swap)?),
            18..=20 => Self::V18(reader.read_swappable(swap)?),
            21 => Self::V21(reader.read_swappable(swap)?),
            other => return Err(Error::UnsupportedVersion(other)),
        };
        Ok(layout)
    }
}

/// Version-independent view of a package header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PackageHeader {
    pub signature: u32,
    pub version: u32,
    pub platform: Platform,
    pub game_directory: GameDirectory,
    pub obfuscated: bool,
    pub compressed_file_table: bool,
    pub supports_directory_queries: bool,
    pub total_entries: u32,
    pub build_changelist: u32,
    pub build_version_major: u32,
    pub package_variation: u32,
    pub offset_to_file_table: u64,
    pub file_table_size: u32,
    pub total_package_size: u64,
    /// The archive was cooked with the opposite byte order.
    pub byte_swapped: bool,
}

/// Fields every layout carries, before validation.
struct RawFields {
    total_package_size: u64,
    offset_to_file_table: u64,
    total_entries: u32,
    game_directory: u16,
    compressed_file_table: u16,
    file_table_size: u32,
    build_version_major: u32,
    build_changelist: u32,
    package_variation: u32,
    supports_directory_queries: bool,
    obfuscated: bool,
    platform: Option<u8>,
}

impl From<HeaderLayout> for RawFields {
    fn from(layout: HeaderLayout) -> Self {
        match layout {
            HeaderLayout::V13(h) => Self {
                total_package_size: h.total_package_size,
                offset_to_file_table: h.offset_to_file_table,
                total_entries: h.total_entries,
                game_directory: h.game_directory,
                compressed_file_table: h.compressed_file_table,
                file_table_size: h.file_table_size,
                build_version_major: h.build_version_major,
                build_changelist: h.build_changelist,
                package_variation: h.package_variation as u32,
                supports_directory_queries: h.supports_directory_queries != 0,
                obfuscated: h.obfuscated != 0,
                platform: None,
            },
            HeaderLayout::V16(h) => Self {
                total_package_size: h.total_package_size,
                offset_to_file_table: h.offset_to_file_table,
                total_entries: h.total_entries,
                game_directory: h.game_directory,
                compressed_file_table: h.compressed_file_table,
                file_table_size: h.file_table_size,
                build_version_major: h.build_version_major,
                build_changelist: h.build_changelist,
                package_variation: 0,
                supports_directory_queries: h.supports_directory_queries != 0,
                obfuscated: h.obfuscated != 0,
                platform: None,
            },
            HeaderLayout::V18(h) => Self {
                total_package_size: h.total_package_size,
                offset_to_file_table: h.offset_to_file_table,
                total_entries: h.total_entries,
                game_directory: h.game_directory,
                compressed_file_table: h.compressed_file_table,
                file_table_size: h.file_table_size,
                build_version_major: h.build_version_major,
                build_changelist: h.build_changelist,
                package_variation: 0,
                supports_directory_queries: h.supports_directory_queries != 0,
                obfuscated: h.obfuscated != 0,
                platform: Some(h.platform),
            },
            HeaderLayout::V21(h) => Self {
                total_package_size: h.total_package_size,
                offset_to_file_table: h.offset_to_file_table,
                total_entries: h.total_entries,
                game_directory: h.game_directory,
                compressed_file_table: h.compressed_file_table,
                file_table_size: h.file_table_size,
                build_version_major: h.build_version_major as u32,
                build_changelist: h.build_changelist,
                package_variation: h.package_variation as u32,
                supports_directory_queries: h.supports_directory_queries != 0,
                obfuscated: h.obfuscated != 0,
                platform: Some(h.platform),
            },
        }
    }
}

impl PackageHeader {
    /// Parse and validate a header from the first bytes of an archive.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::HeaderTooSmall {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut reader = BinaryReader::new(&bytes[..HEADER_SIZE]);
        let mut prefix: HeaderPrefix = reader.read_struct()?;

        let byte_swapped = match { prefix.signature } {
            PACKAGE_SIGNATURE => false,
            s if s == PACKAGE_SIGNATURE.swap_bytes() => true,
            actual => {
                return Err(Error::InvalidSignature {
                    expected: PACKAGE_SIGNATURE,
                    actual,
                })
            }
        };
        if byte_swapped {
            prefix.endian_swap();
        }

        let version = prefix.version;
        let layout = HeaderLayout::read(&mut reader, version, byte_swapped)?;
        let raw = RawFields::from(layout);

        let game_directory = GameDirectory::from_serialized(raw.game_directory)
            .ok_or(Error::InvalidGameDirectory(raw.game_directory))?;
        let platform = match raw.platform {
            Some(value) => Platform::from_serialized(value).ok_or(Error::InvalidPlatform(value))?,
            None => Platform::current(),
        };

        Ok(Self {
            signature: PACKAGE_SIGNATURE,
            version,
            platform,
            game_directory,
            obfuscated: raw.obfuscated,
            compressed_file_table: raw.compressed_file_table != 0,
            supports_directory_queries: raw.supports_directory_queries,
            total_entries: raw.total_entries,
            build_changelist: raw.build_changelist,
            build_version_major: raw.build_version_major,
            package_variation: raw.package_variation,
            offset_to_file_table: raw.offset_to_file_table,
            file_table_size: raw.file_table_size,
            total_package_size: raw.total_package_size,
            byte_swapped,
        })
    }

    /// Quick check whether `bytes` start with a valid package header.
    pub fn is_valid(bytes: &[u8]) -> bool {
        Self::read(bytes).is_ok()
    }

    /// Codec used for compressed entries and the compressed file table.
    pub fn codec(&self) -> Codec {
        if self.version == 16 {
            Codec::Lz4
        } else {
            Codec::Zstd
        }
    }

    /// The file table blob ends with a CRC32 of its contents.
    pub fn has_file_table_crc32(&self) -> bool {
        self.version > 19
    }

    /// Entries carry a CRC32 of their on-disk bytes.
    pub fn has_post_crc32(&self) -> bool {
        self.version > 18
    }

    /// Written by an older cooker than the current one.
    pub fn is_old(&self) -> bool {
        self.version < PACKAGE_VERSION
    }
}
