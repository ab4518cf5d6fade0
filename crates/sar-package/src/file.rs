//! Read handles for files inside a package.
//!
//! Both readers hold a clone of their [`PackageFileSystem`], so the package
//! stays alive for as long as any file is open. All disk access goes through
//! the package's IO lock.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::Ordering;

use sar_common::GamePath;

use crate::decompress::{self, Codec, MAX_READ_SIZE};
use crate::package::PackageFileSystem;
use crate::table::TableEntry;
use crate::{Error, Result};

/// Access modes a caller may request when opening a file.
///
/// Packages are read-only, so everything except [`OpenMode::Read`] is
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    WriteTruncate,
    WriteAppend,
    ReadWrite,
}

impl OpenMode {
    /// Whether the mode would modify the file.
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// A file opened from a package.
///
/// Upstream code reads through this trait without knowing it is backed by an
/// archive.
pub trait VirtualFile: Read + Seek + Send {
    /// Path the file was opened with.
    fn path(&self) -> &GamePath;

    /// Logical (decompressed) size in bytes.
    fn size(&self) -> u64;

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        false
    }

    /// The whole logical contents, independent of the current position.
    fn read_all(&mut self) -> Result<Vec<u8>>;
}

/// Resolve a seek request against a file of `size` bytes.
fn seek_within(current: u64, size: u64, pos: SeekFrom) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => size.checked_add_signed(delta),
    };

    match target {
        Some(target) if target <= size => Ok(target),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("seek to {pos:?} is outside [0, {size}]"),
        )),
    }
}

/// A file stored verbatim, possibly obfuscated.
pub struct StoredFile {
    package: PackageFileSystem,
    path: GamePath,
    base: u64,
    size: u64,
    xor_key: Option<u32>,
    position: u64,
}

impl StoredFile {
    /// Reader over the on-disk bytes of `entry`.
    pub(crate) fn new(package: PackageFileSystem, path: GamePath, entry: &TableEntry) -> Self {
        package.shared.active_files.fetch_add(1, Ordering::AcqRel);
        let xor_key = package.is_obfuscated().then_some(entry.xor_key);
        Self {
            package,
            path,
            base: entry.entry.offset_to_file,
            size: entry.entry.compressed_size,
            xor_key,
            position: 0,
        }
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Drop for StoredFile {
    fn drop(&mut self) {
        self.package.shared.active_files.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Read for StoredFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size - self.position;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = remaining.min(buf.len() as u64) as usize;
        let n = self
            .package
            .shared
            .read_stored(self.base, self.position, self.xor_key, &mut buf[..len])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for StoredFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = seek_within(self.position, self.size, pos)?;
        Ok(self.position)
    }
}

impl VirtualFile for StoredFile {
    fn path(&self) -> &GamePath {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        if self.size > MAX_READ_SIZE {
            return Err(Error::Decompression(format!(
                "{} is {} bytes, over the {MAX_READ_SIZE} byte read limit",
                self.path, self.size
            )));
        }

        let mut data = vec![0u8; self.size as usize];
        let n = self
            .package
            .shared
            .read_stored(self.base, 0, self.xor_key, &mut data)?;
        if n != data.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read {n} of {} bytes of {}", data.len(), self.path),
            )));
        }
        Ok(data)
    }
}

/// A compressed file. The stored bytes are decoded in full on first access.
pub struct CompressedFile {
    stored: StoredFile,
    uncompressed_size: u64,
    codec: Codec,
    decoded: Option<Vec<u8>>,
    position: u64,
}

impl CompressedFile {
    pub(crate) fn new(package: PackageFileSystem, path: GamePath, entry: &TableEntry) -> Self {
        let codec = package.codec();
        Self {
            stored: StoredFile::new(package, path, entry),
            uncompressed_size: entry.entry.uncompressed_size,
            codec,
            decoded: None,
            position: 0,
        }
    }

    /// Whether the contents have been decompressed yet.
    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    fn decode(&mut self) -> Result<Vec<u8>> {
        if self.uncompressed_size > MAX_READ_SIZE {
            return Err(Error::Decompression(format!(
                "{} decompresses to {} bytes, over the {MAX_READ_SIZE} byte read limit",
                self.stored.path, self.uncompressed_size
            )));
        }

        let compressed = self.stored.read_all()?;
        let package = &self.stored.package;
        let dict = package.dictionary_for(&self.stored.path);
        let data = decompress::decompress(self.codec, &compressed, dict)?;

        if data.len() as u64 != self.uncompressed_size {
            return Err(Error::Decompression(format!(
                "{} decompressed to {} bytes, expected {}",
                self.stored.path,
                data.len(),
                self.uncompressed_size
            )));
        }
        Ok(data)
    }

    fn decoded(&mut self) -> Result<&[u8]> {
        if self.decoded.is_none() {
            self.decoded = Some(self.decode()?);
        }
        Ok(self.decoded.as_deref().unwrap_or_default())
    }
}

impl Read for CompressedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let position = self.position as usize;
        let data = self.decoded()?;
        let available = &data[position.min(data.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for CompressedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = seek_within(self.position, self.uncompressed_size, pos)?;
        Ok(self.position)
    }
}

impl VirtualFile for CompressedFile {
    fn path(&self) -> &GamePath {
        &self.stored.path
    }

    fn size(&self) -> u64 {
        self.uncompressed_size
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        // Skip the cached copy when nothing has been decoded yet.
        match &self.decoded {
            Some(data) => Ok(data.clone()),
            None => self.decode(),
        }
    }
}
