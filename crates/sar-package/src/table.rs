//! File table loading.
//!
//! The file table sits near the end of the package. Loading it reads the
//! blob, verifies its trailing CRC32 when the version has one, removes the
//! table obfuscation, decompresses it when requested, and parses the entry
//! records into a [`FileIndex`].

use rustc_hash::FxHashMap;
use sar_common::{crc, BinaryReader, EndianSwap, GamePath};
use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::decompress::{self, MAX_READ_SIZE};
use crate::header::PackageHeader;
use crate::obfuscation;
use crate::source::IoState;
use crate::{Error, Result};

/// On-disk file table record, excluding the variable-length name.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawFileEntry {
    pub offset_to_file: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub modified_time: u64,
    pub crc32_pre: u32,
    pub crc32_post: u32,
}

impl EndianSwap for RawFileEntry {
    fn endian_swap(&mut self) {
        self.offset_to_file = self.offset_to_file.swap_bytes();
        self.compressed_size = self.compressed_size.swap_bytes();
        self.uncompressed_size = self.uncompressed_size.swap_bytes();
        self.modified_time = self.modified_time.swap_bytes();
        self.crc32_pre = self.crc32_pre.swap_bytes();
        self.crc32_post = self.crc32_post.swap_bytes();
    }
}

/// Location and checksums of one file in a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileEntry {
    /// Absolute offset of the file's bytes in the package.
    pub offset_to_file: u64,
    /// Bytes occupied in the package.
    pub compressed_size: u64,
    /// Bytes after decompression.
    pub uncompressed_size: u64,
    /// Modification time recorded by the cooker.
    pub modified_time: u64,
    /// CRC32 of the original, uncooked content.
    pub crc32_pre: u32,
    /// CRC32 of the bytes as stored in the package.
    pub crc32_post: u32,
}

impl FileEntry {
    /// Stored with a codec rather than verbatim.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.uncompressed_size
    }

    /// End offset of the stored bytes, or `None` on overflow.
    #[inline]
    pub fn end_offset(&self) -> Option<u64> {
        self.offset_to_file.checked_add(self.compressed_size)
    }
}

impl From<RawFileEntry> for FileEntry {
    fn from(raw: RawFileEntry) -> Self {
        Self {
            offset_to_file: raw.offset_to_file,
            compressed_size: raw.compressed_size,
            uncompressed_size: raw.uncompressed_size,
            modified_time: raw.modified_time,
            crc32_pre: raw.crc32_pre,
            crc32_post: raw.crc32_post,
        }
    }
}

/// A file table record as held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub entry: FileEntry,
    /// Per-file obfuscation key, zero when the package is not obfuscated.
    pub xor_key: u32,
    /// Position of the record in the on-disk table.
    pub order: u32,
}

/// The parsed file table.
#[derive(Debug, Default)]
pub(crate) struct FileIndex {
    pub table: FxHashMap<GamePath, TableEntry>,
    /// Case-insensitively sorted paths; empty unless the package supports
    /// directory queries.
    pub sorted: Vec<GamePath>,
    /// Every entry carries a usable post-cook CRC32.
    pub has_post_crc32: bool,
}

/// Read, verify, decode and parse the file table of a package.
///
/// Leaves the handle rewound to the start of the package.
pub(crate) fn load_file_table(io: &mut IoState, header: &PackageHeader) -> Result<FileIndex> {
    if header.offset_to_file_table > i64::MAX as u64 {
        return Err(Error::InvalidFileTable(format!(
            "file table offset {} is out of range",
            header.offset_to_file_table
        )));
    }

    let mut blob = vec![0u8; header.file_table_size as usize];
    io.read_exact_at(header.offset_to_file_table, &mut blob)?;
    debug!(
        offset = header.offset_to_file_table,
        size = blob.len(),
        "read file table"
    );

    let data = decode_file_table(blob, header)?;
    let index = parse_file_table(&data, header)?;

    io.rewind()?;
    Ok(index)
}

/// Strip the trailing CRC32, de-obfuscate and decompress a file table blob.
pub(crate) fn decode_file_table(mut blob: Vec<u8>, header: &PackageHeader) -> Result<Vec<u8>> {
    if header.has_file_table_crc32() {
        let body_len = blob.len().checked_sub(4).ok_or_else(|| {
            Error::InvalidFileTable(format!(
                "file table of {} bytes is too small to hold its CRC32",
                blob.len()
            ))
        })?;

        let expected = BinaryReader::new(&blob[body_len..]).read_u32()?;
        blob.truncate(body_len);
        let actual = crc::hash_bytes(&blob);
        if expected != actual {
            return Err(Error::Crc32Mismatch {
                what: "file table".to_string(),
                expected,
                actual,
            });
        }
    }

    // The table is obfuscated regardless of the per-file flag.
    let key = obfuscation::file_table_key(header.build_version_major, header.build_changelist);
    obfuscation::obfuscate(key, &mut blob, 0);

    if header.compressed_file_table {
        let decompressed = decompress::decompress(header.codec(), &blob, None)?;
        debug!(
            compressed = blob.len(),
            decompressed = decompressed.len(),
            "decompressed file table"
        );
        return Ok(decompressed);
    }

    Ok(blob)
}

fn truncated(what: &str, index: u32) -> impl FnOnce(sar_common::Error) -> Error + '_ {
    move |e| Error::InvalidFileTable(format!("{what} of entry {index}: {e}"))
}

/// Parse the decoded table records.
pub(crate) fn parse_file_table(data: &[u8], header: &PackageHeader) -> Result<FileIndex> {
    let swap = header.byte_swapped;
    let header_has_post_crc32 = header.has_post_crc32();
    let total_size = header.total_package_size;

    let mut reader = BinaryReader::new(data);
    let mut index = FileIndex {
        table: FxHashMap::default(),
        sorted: Vec::new(),
        has_post_crc32: true,
    };
    index
        .table
        .reserve(header.total_entries.min(1 << 20) as usize);

    for order in 0..header.total_entries {
        let raw: RawFileEntry = reader
            .read_swappable(swap)
            .map_err(truncated("record", order))?;
        let mut entry = FileEntry::from(raw);

        // Older tables carry only the pre-cook CRC32. It doubles as the
        // post-cook value when the bytes are stored verbatim.
        if !header_has_post_crc32 {
            if !header.obfuscated && !entry.is_compressed() {
                entry.crc32_post = entry.crc32_pre;
            } else {
                entry.crc32_post = 0;
                index.has_post_crc32 = false;
            }
        }

        let in_bounds = entry.offset_to_file <= total_size
            && entry.end_offset().is_some_and(|end| end <= total_size);

        let name_length: u32 = reader
            .read_swappable(swap)
            .map_err(truncated("name length", order))?;
        if name_length == 0 || name_length as u64 > MAX_READ_SIZE {
            return Err(Error::InvalidFileTable(format!(
                "entry {order} has invalid name length {name_length}"
            )));
        }
        let raw_name = reader
            .read_terminated_bytes(name_length as usize)
            .map_err(truncated("name", order))?;
        let name = std::str::from_utf8(raw_name).map_err(sar_common::Error::from)?;

        if !in_bounds {
            return Err(Error::EntryOutOfBounds {
                path: name.to_string(),
                offset: entry.offset_to_file,
                size: entry.compressed_size,
                total: total_size,
            });
        }

        // The key covers the name exactly as stored, with `\` separators.
        let xor_key = if header.obfuscated {
            obfuscation::obfuscation_key(raw_name)
        } else {
            0
        };

        let path = GamePath::new(header.game_directory, name);
        let table_entry = TableEntry {
            entry,
            xor_key,
            order,
        };
        if index.table.insert(path.clone(), table_entry).is_some() {
            return Err(Error::DuplicateEntry(path.to_string()));
        }

        if header.supports_directory_queries {
            index.sorted.push(path);
        }
    }

    index.sorted.sort_unstable();
    if !index.has_post_crc32 {
        debug!("file table lacks post-cook CRC32 values, verification will decode files");
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_common::{GameDirectory, Platform};

    fn header(version: u32) -> PackageHeader {
        PackageHeader {
            signature: crate::header::PACKAGE_SIGNATURE,
            version,
            platform: Platform::Pc,
            game_directory: GameDirectory::Content,
            obfuscated: false,
            compressed_file_table: false,
            supports_directory_queries: true,
            total_entries: 0,
            build_changelist: 42,
            build_version_major: 1,
            package_variation: 0,
            offset_to_file_table: 0,
            file_table_size: 0,
            total_package_size: 1000,
            byte_swapped: false,
        }
    }

    fn record(out: &mut Vec<u8>, entry: FileEntry, name: &str) {
        let raw = RawFileEntry {
            offset_to_file: entry.offset_to_file,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            modified_time: entry.modified_time,
            crc32_pre: entry.crc32_pre,
            crc32_post: entry.crc32_post,
        };
        out.extend_from_slice(raw.as_bytes());
        out.extend_from_slice(&(name.len() as u32 + 1).to_ne_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }

    fn stored(offset: u64, size: u64, crc: u32) -> FileEntry {
        FileEntry {
            offset_to_file: offset,
            compressed_size: size,
            uncompressed_size: size,
            modified_time: 7,
            crc32_pre: crc,
            crc32_post: crc,
        }
    }

    #[test]
    fn test_record_size() {
        assert_eq!(std::mem::size_of::<RawFileEntry>(), 40);
    }

    #[test]
    fn test_parse_sorted_and_keyed() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 10, 1), "UI\\b.json");
        record(&mut data, stored(58, 10, 2), "a.txt");
        record(&mut data, stored(68, 0, 0), "UI\\A.json");

        let mut header = header(21);
        header.total_entries = 3;
        let index = parse_file_table(&data, &header).unwrap();

        assert_eq!(index.table.len(), 3);
        assert!(index.has_post_crc32);
        let names: Vec<_> = index.sorted.iter().map(|p| p.relative()).collect();
        assert_eq!(names, ["a.txt", "UI/A.json", "UI/b.json"]);

        let b = index.table[&GamePath::new(GameDirectory::Content, "ui/B.JSON")];
        assert_eq!(b.order, 0);
        assert_eq!(b.xor_key, 0);
        assert_eq!(b.entry.crc32_pre, 1);
    }

    #[test]
    fn test_obfuscated_key_uses_raw_name() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 10, 1), "Dir\\File.txt");

        let mut header = header(21);
        header.total_entries = 1;
        header.obfuscated = true;
        let index = parse_file_table(&data, &header).unwrap();

        let entry = index.table[&GamePath::new(GameDirectory::Content, "dir/file.txt")];
        assert_eq!(entry.xor_key, obfuscation::obfuscation_key(b"Dir\\File.txt"));
    }

    #[test]
    fn test_no_sorted_list_without_directory_queries() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 10, 1), "a.txt");

        let mut header = header(21);
        header.total_entries = 1;
        header.supports_directory_queries = false;
        let index = parse_file_table(&data, &header).unwrap();

        assert_eq!(index.table.len(), 1);
        assert!(index.sorted.is_empty());
    }

    #[test]
    fn test_legacy_crc_migration() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 10, 0xAAAA), "stored.txt");

        let mut header = header(18);
        header.total_entries = 1;
        let index = parse_file_table(&data, &header).unwrap();
        let entry = index.table.values().next().unwrap().entry;
        assert_eq!(entry.crc32_post, 0xAAAA);
        assert!(index.has_post_crc32);

        let mut compressed = stored(48, 10, 0xBBBB);
        compressed.uncompressed_size = 40;
        compressed.crc32_post = 0x1234;
        let mut data = Vec::new();
        record(&mut data, compressed, "packed.txt");
        let index = parse_file_table(&data, &header).unwrap();
        let entry = index.table.values().next().unwrap().entry;
        assert_eq!(entry.crc32_post, 0);
        assert!(!index.has_post_crc32);
    }

    #[test]
    fn test_out_of_bounds_entry() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 10, 1), "ok.txt");
        record(&mut data, stored(995, 10, 1), "bad.txt");

        let mut header = header(21);
        header.total_entries = 2;
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::EntryOutOfBounds { path, .. }) if path == "bad.txt"
        ));
    }

    #[test]
    fn test_overflowing_entry() {
        let mut data = Vec::new();
        record(&mut data, stored(10, u64::MAX, 1), "wrap.txt");

        let mut header = header(21);
        header.total_entries = 1;
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::EntryOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_duplicate_entry() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 1, 1), "Same.txt");
        record(&mut data, stored(49, 1, 1), "same.TXT");

        let mut header = header(21);
        header.total_entries = 2;
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::DuplicateEntry(_))
        ));
    }

    #[test]
    fn test_malformed_names() {
        let mut header = header(21);
        header.total_entries = 1;

        // Zero length.
        let mut data = stored(48, 1, 1).to_raw_bytes();
        data.extend_from_slice(&0u32.to_ne_bytes());
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::InvalidFileTable(_))
        ));

        // Missing terminator.
        let mut data = stored(48, 1, 1).to_raw_bytes();
        data.extend_from_slice(&3u32.to_ne_bytes());
        data.extend_from_slice(b"abc");
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::InvalidFileTable(_))
        ));

        // Truncated.
        let mut data = stored(48, 1, 1).to_raw_bytes();
        data.extend_from_slice(&10u32.to_ne_bytes());
        data.extend_from_slice(b"ab");
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::InvalidFileTable(_))
        ));

        // Oversized.
        let mut data = stored(48, 1, 1).to_raw_bytes();
        data.extend_from_slice(&((MAX_READ_SIZE + 1) as u32).to_ne_bytes());
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::InvalidFileTable(_))
        ));
    }

    #[test]
    fn test_missing_records() {
        let mut data = Vec::new();
        record(&mut data, stored(48, 1, 1), "one.txt");

        let mut header = header(21);
        header.total_entries = 2;
        assert!(matches!(
            parse_file_table(&data, &header),
            Err(Error::InvalidFileTable(_))
        ));
    }

    #[test]
    fn test_decode_checks_table_crc() {
        let header = header(21);
        let key = obfuscation::file_table_key(header.build_version_major, header.build_changelist);

        let mut body = b"table body".to_vec();
        obfuscation::obfuscate(key, &mut body, 0);
        let mut blob = body.clone();
        blob.extend_from_slice(&crc::hash_bytes(&body).to_le_bytes());

        assert_eq!(decode_file_table(blob.clone(), &header).unwrap(), b"table body");

        blob[0] ^= 1;
        assert!(matches!(
            decode_file_table(blob, &header),
            Err(Error::Crc32Mismatch { .. })
        ));
        assert!(matches!(
            decode_file_table(vec![1, 2, 3], &header),
            Err(Error::InvalidFileTable(_))
        ));
    }

    impl FileEntry {
        fn to_raw_bytes(self) -> Vec<u8> {
            let mut out = Vec::new();
            record(&mut out, self, "x");
            out.truncate(std::mem::size_of::<RawFileEntry>());
            out
        }
    }
}
