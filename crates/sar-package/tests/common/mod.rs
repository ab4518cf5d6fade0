//! Builds SAR packages in memory for the integration tests.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use sar_common::{crc, EndianSwap};
use sar_package::header::{HeaderPrefix, HeaderV13, HeaderV16, HeaderV18, HeaderV21};
use sar_package::{
    file_table_key, obfuscate, obfuscation_key, GameDirectory, GamePath, PackageFileSystem,
    PackageOptions, Platform, RawFileEntry, HEADER_SIZE, PACKAGE_SIGNATURE,
};
use zerocopy::{Immutable, IntoBytes};

struct CookedFile {
    name: String,
    data: Vec<u8>,
    compress: bool,
    modified_time: u64,
}

/// Package writer covering every layout the reader accepts.
pub struct Cooker {
    pub version: u32,
    pub platform: Platform,
    pub game_directory: GameDirectory,
    pub obfuscate: bool,
    pub compress_table: bool,
    pub directory_queries: bool,
    pub swap: bool,
    pub build_changelist: u32,
    pub build_version_major: u32,
    pub package_variation: u16,
    dictionary: Option<Vec<u8>>,
    files: Vec<CookedFile>,
}

impl Cooker {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            platform: Platform::Pc,
            game_directory: GameDirectory::Content,
            obfuscate: false,
            compress_table: false,
            directory_queries: true,
            swap: false,
            build_changelist: 1234,
            build_version_major: 3,
            package_variation: 0,
            dictionary: None,
            files: Vec::new(),
        }
    }

    pub fn obfuscated(mut self) -> Self {
        self.obfuscate = true;
        self
    }

    pub fn compressed_table(mut self) -> Self {
        self.compress_table = true;
        self
    }

    pub fn byte_swapped(mut self) -> Self {
        self.swap = true;
        self
    }

    pub fn without_directory_queries(mut self) -> Self {
        self.directory_queries = false;
        self
    }

    /// Add a file stored verbatim. `name` uses `\` separators as on disk.
    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, false);
        self
    }

    /// Add a file stored with the package codec.
    pub fn compressed(mut self, name: &str, data: &[u8]) -> Self {
        self.push(name, data, true);
        self
    }

    /// Add the compression dictionary. Compressed files added to this
    /// package are encoded with it.
    pub fn dictionary(mut self, bytes: &[u8], compress: bool) -> Self {
        let name = self.dictionary_name();
        self.dictionary = Some(bytes.to_vec());
        self.push(&name, bytes, compress);
        self
    }

    /// Add an entry with an arbitrary name, for dictionary edge cases.
    pub fn raw_entry(mut self, name: &str, data: &[u8], compress: bool) -> Self {
        self.push(name, data, compress);
        self
    }

    pub fn dictionary_name(&self) -> String {
        let platform = if self.version >= 18 {
            self.platform
        } else {
            Platform::current()
        };
        format!("pkgcdict_{}.dat", platform.name())
    }

    fn push(&mut self, name: &str, data: &[u8], compress: bool) {
        let modified_time = 1_600_000_000 + self.files.len() as u64;
        self.files.push(CookedFile {
            name: name.to_string(),
            data: data.to_vec(),
            compress,
            modified_time,
        });
    }

    fn write_u32(&self, out: &mut Vec<u8>, value: u32) {
        if self.swap {
            out.write_u32::<BigEndian>(value).unwrap();
        } else {
            out.write_u32::<LittleEndian>(value).unwrap();
        }
    }

    /// Frame `data` with the codec preamble.
    pub fn encode(&self, data: &[u8], use_dictionary: bool) -> Vec<u8> {
        let (magic, payload): (&[u8; 4], Vec<u8>) = if self.version == 16 {
            (b"LZ4C", lz4_flex::block::compress(data))
        } else {
            let payload = match (&self.dictionary, use_dictionary) {
                (Some(dict), true) => zstd::bulk::Compressor::with_dictionary(3, dict)
                    .unwrap()
                    .compress(data)
                    .unwrap(),
                _ => zstd::bulk::compress(data, 3).unwrap(),
            };
            (b"ZSTD", payload)
        };

        let mut out = magic.to_vec();
        out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        out.write_all(&payload).unwrap();
        out
    }

    pub fn cook(&self) -> Vec<u8> {
        let dictionary_name = self.dictionary_name();
        let mut body = Vec::new();
        let mut table = Vec::new();

        for file in &self.files {
            let offset = (HEADER_SIZE + body.len()) as u64;
            let is_dictionary = file.name == dictionary_name;

            let mut stored = if file.compress {
                self.encode(&file.data, !is_dictionary)
            } else {
                file.data.clone()
            };
            assert!(
                !file.compress || stored.len() != file.data.len(),
                "test data for {} must compress to a different size",
                file.name
            );
            if self.obfuscate {
                obfuscate(obfuscation_key(file.name.as_bytes()), &mut stored, 0);
            }

            let mut raw = RawFileEntry {
                offset_to_file: offset,
                compressed_size: stored.len() as u64,
                uncompressed_size: file.data.len() as u64,
                modified_time: file.modified_time,
                crc32_pre: crc::hash_bytes(&file.data),
                crc32_post: if self.version > 18 {
                    crc::hash_bytes(&stored)
                } else {
                    0
                },
            };
            if self.swap {
                raw.endian_swap();
            }

            table.extend_from_slice(raw.as_bytes());
            self.write_u32(&mut table, file.name.len() as u32 + 1);
            table.extend_from_slice(file.name.as_bytes());
            table.push(0);
            body.extend_from_slice(&stored);
        }

        let mut blob = if self.compress_table {
            self.encode(&table, false)
        } else {
            table
        };
        obfuscate(
            file_table_key(self.build_version_major, self.build_changelist),
            &mut blob,
            0,
        );
        if self.version > 19 {
            let checksum = crc::hash_bytes(&blob);
            blob.write_u32::<LittleEndian>(checksum).unwrap();
        }

        let offset_to_file_table = (HEADER_SIZE + body.len()) as u64;
        let total = offset_to_file_table + blob.len() as u64;

        let mut out = self.header(total, offset_to_file_table, blob.len() as u32);
        out.extend_from_slice(&body);
        out.extend_from_slice(&blob);
        out
    }

    fn header(&self, total: u64, offset_to_file_table: u64, file_table_size: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        self.push_struct(
            &mut out,
            HeaderPrefix {
                signature: PACKAGE_SIGNATURE,
                version: self.version,
            },
        );

        let total_entries = self.files.len() as u32;
        let game_directory = self.game_directory.to_serialized();
        let compressed_file_table = self.compress_table as u16;
        let directory_queries = self.directory_queries as u16;

        match self.version {
            13 => self.push_struct(
                &mut out,
                HeaderV13 {
                    total_package_size: total,
                    offset_to_file_table,
                    total_entries,
                    game_directory,
                    compressed_file_table,
                    file_table_size,
                    build_version_major: self.build_version_major,
                    build_changelist: self.build_changelist,
                    package_variation: self.package_variation,
                    supports_directory_queries: directory_queries as u8,
                    obfuscated: self.obfuscate as u8,
                },
            ),
            16 | 17 => self.push_struct(
                &mut out,
                HeaderV16 {
                    total_package_size: total,
                    offset_to_file_table,
                    total_entries,
                    game_directory,
                    compressed_file_table,
                    file_table_size,
                    build_version_major: self.build_version_major,
                    build_changelist: self.build_changelist,
                    supports_directory_queries: directory_queries,
                    obfuscated: self.obfuscate as u16,
                },
            ),
            18..=20 => self.push_struct(
                &mut out,
                HeaderV18 {
                    total_package_size: total,
                    offset_to_file_table,
                    total_entries,
                    game_directory,
                    compressed_file_table,
                    file_table_size,
                    build_version_major: self.build_version_major,
                    build_changelist: self.build_changelist,
                    supports_directory_queries: directory_queries,
                    obfuscated: self.obfuscate as u8,
                    platform: self.platform as u8,
                },
            ),
            _ => self.push_struct(
                &mut out,
                HeaderV21 {
                    total_package_size: total,
                    offset_to_file_table,
                    total_entries,
                    game_directory,
                    compressed_file_table,
                    file_table_size,
                    package_variation: self.package_variation,
                    build_version_major: self.build_version_major as u16,
                    build_changelist: self.build_changelist,
                    supports_directory_queries: directory_queries,
                    obfuscated: self.obfuscate as u8,
                    platform: self.platform as u8,
                },
            ),
        }

        assert_eq!(out.len(), HEADER_SIZE);
        out
    }

    fn push_struct<T: IntoBytes + Immutable + EndianSwap>(&self, out: &mut Vec<u8>, mut value: T) {
        if self.swap {
            value.endian_swap();
        }
        out.extend_from_slice(value.as_bytes());
    }
}

/// Text that compresses well.
pub fn compressible(seed: &str, len: usize) -> Vec<u8> {
    seed.bytes().cycle().take(len).collect()
}

pub fn content(relative: &str) -> GamePath {
    GamePath::new(GameDirectory::Content, relative)
}

pub fn load(bytes: Vec<u8>) -> PackageFileSystem {
    PackageFileSystem::from_bytes("test.sar", bytes, PackageOptions::default())
}

pub fn load_with(bytes: Vec<u8>, options: PackageOptions) -> PackageFileSystem {
    PackageFileSystem::from_bytes("test.sar", bytes, options)
}

pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
