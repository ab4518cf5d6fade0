//! Positional access to the bytes of a package.
//!
//! A [`PackageSource`] is the single handle all readers of a package share.
//! [`IoState`] pairs it with the cached position of that handle so that
//! sequential reads skip redundant seeks. Both live behind the package's
//! IO lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::Mmap;

/// Where the bytes of a package come from.
enum Backing {
    File(File),
    Mapped(Cursor<Mmap>),
    Memory(Cursor<Vec<u8>>),
}

/// Seekable byte source backing a package.
pub(crate) struct PackageSource {
    backing: Backing,
    writable: bool,
}

impl PackageSource {
    /// Open a file on disk, read-only or read-write.
    pub fn open_file(path: &Path, writable: bool) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        Ok(Self {
            backing: Backing::File(file),
            writable,
        })
    }

    /// Memory-map a file on disk.
    pub fn open_mapped(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the map is read-only; the package assumes nobody truncates
        // the archive while it is open.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            backing: Backing::Mapped(Cursor::new(mmap)),
            writable: false,
        })
    }

    /// Read a whole file into memory.
    pub fn open_buffered(path: &Path) -> io::Result<Self> {
        Ok(Self::from_memory(std::fs::read(path)?))
    }

    /// Serve an in-memory buffer.
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self {
            backing: Backing::Memory(Cursor::new(data)),
            writable: false,
        }
    }

    /// Total size in bytes.
    pub fn len(&self) -> io::Result<u64> {
        match &self.backing {
            Backing::File(file) => Ok(file.metadata()?.len()),
            Backing::Mapped(cursor) => Ok(cursor.get_ref().len() as u64),
            Backing::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
        }
    }

    /// Whether writes are permitted.
    pub fn can_write(&self) -> bool {
        self.writable
    }
}

impl Read for PackageSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::File(file) => file.read(buf),
            Backing::Mapped(cursor) => cursor.read(buf),
            Backing::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for PackageSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::File(file) => file.seek(pos),
            Backing::Mapped(cursor) => cursor.seek(pos),
            Backing::Memory(cursor) => cursor.seek(pos),
        }
    }
}

impl Write for PackageSource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::File(file) if self.writable => file.write(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "package source is read-only",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::File(file) if self.writable => file.sync_data(),
            _ => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "package source is read-only",
            )),
        }
    }
}

/// Read until `buf` is full or the source is exhausted.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// The shared source plus the cached position of its handle.
///
/// `position` is `None` whenever the real handle position is unknown, which
/// forces the next access to seek.
pub(crate) struct IoState {
    source: PackageSource,
    position: Option<u64>,
}

impl IoState {
    pub fn new(source: PackageSource) -> Self {
        Self {
            source,
            position: None,
        }
    }

    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    /// Cached handle position.
    #[cfg(test)]
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        match self.source.seek(SeekFrom::Start(offset)) {
            Ok(_) => {
                self.position = Some(offset);
                Ok(())
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }

    /// Move the handle back to the start of the package.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek_to(0)
    }

    /// Read up to `buf.len()` bytes at `offset`, seeking only when the
    /// cached position differs. Returns the number of bytes read.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.position != Some(offset) {
            self.seek_to(offset)?;
        }

        match read_fully(&mut self.source, buf) {
            Ok(n) => {
                self.position = Some(offset + n as u64);
                Ok(n)
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let n = self.read_at(offset, buf)?;
        if n != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read {n} of {} bytes at offset {offset}", buf.len()),
            ));
        }
        Ok(())
    }

    /// Always seek to `offset` and read exactly `buf.len()` bytes.
    ///
    /// On failure the handle is moved back to the previously cached position,
    /// or the cache is invalidated if that is not possible.
    pub fn read_raw(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let previous = self.position;
        self.seek_to(offset)?;

        let result = read_fully(&mut self.source, buf).and_then(|n| {
            if n == buf.len() {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read {n} of {} bytes at offset {offset}", buf.len()),
                ))
            }
        });
        self.settle(previous, offset + buf.len() as u64, result)
    }

    /// Write `data` at `offset`. Requires a writable source.
    ///
    /// Failure handling matches [`read_raw`](Self::read_raw).
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let previous = self.position;
        self.seek_to(offset)?;

        let result = self.source.write_all(data);
        self.settle(previous, offset + data.len() as u64, result)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.source.flush()
    }

    fn settle(&mut self, previous: Option<u64>, end: u64, result: io::Result<()>) -> io::Result<()> {
        match result {
            Ok(()) => {
                self.position = Some(end);
                Ok(())
            }
            Err(e) => {
                self.position = None;
                if let Some(previous) = previous {
                    // Best effort; a failed restore leaves the cache invalid.
                    let _ = self.seek_to(previous);
                }
                Err(e)
            }
        }
    }
}
