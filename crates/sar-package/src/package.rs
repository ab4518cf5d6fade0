//! The package file system.
//!
//! [`PackageFileSystem`] loads a package once at construction and then
//! serves lookups, file handles, directory listings and raw IO. A package
//! that fails to load is still a valid value: `is_ok()` is false and every
//! query fails or comes back empty.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use sar_common::{GameDirectory, GamePath, Platform};
use tracing::{debug, info, warn};

use crate::decompress::{Codec, DecompressionDict, MAX_READ_SIZE};
use crate::dict::{DictionaryCell, DictionaryState};
use crate::file::{CompressedFile, OpenMode, StoredFile, VirtualFile};
use crate::header::{PackageHeader, HEADER_SIZE};
use crate::obfuscation;
use crate::options::PackageOptions;
use crate::source::{IoState, PackageSource};
use crate::table::{self, FileEntry, FileIndex, TableEntry};
use crate::{Error, Result};

/// Everything a successful load produces.
pub(crate) struct Loaded {
    pub header: PackageHeader,
    pub index: FileIndex,
    /// Dictionary path, present only when the table contains it.
    pub dict_path: Option<GamePath>,
}

pub(crate) enum LoadState {
    Ready(Loaded),
    Failed(String),
}

/// State shared by a package handle and all files opened from it.
pub(crate) struct Shared {
    pub name: String,
    pub io: Mutex<IoState>,
    state: LoadState,
    /// Set when a mandatory dictionary resolution fails after the table was
    /// loaded. Hides the table for good.
    revoked: OnceLock<String>,
    pub dict: DictionaryCell,
    pub active_files: AtomicUsize,
}

impl Shared {
    pub fn loaded(&self) -> Result<&Loaded> {
        if let Some(reason) = self.revoked.get() {
            return Err(Error::NotLoaded(reason.clone()));
        }
        match &self.state {
            LoadState::Ready(loaded) => Ok(loaded),
            LoadState::Failed(reason) => Err(Error::NotLoaded(reason.clone())),
        }
    }

    /// Read stored bytes of a file at `position` within it, removing the
    /// obfuscation when a key is given.
    pub fn read_stored(
        &self,
        base: u64,
        position: u64,
        xor_key: Option<u32>,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let n = self.io.lock().read_at(base + position, buf)?;
        if let Some(key) = xor_key {
            obfuscation::obfuscate(key, &mut buf[..n], position);
        }
        Ok(n)
    }

    fn load(&mut self) -> Result<()> {
        let io = self.io.get_mut();

        let mut bytes = [0u8; HEADER_SIZE];
        let n = io.read_at(0, &mut bytes)?;
        let header = PackageHeader::read(&bytes[..n])?;
        debug!(
            package = %self.name,
            version = header.version,
            entries = header.total_entries,
            byte_swapped = header.byte_swapped,
            "read package header"
        );

        let actual = io.source().len()?;
        if actual != header.total_package_size {
            return Err(Error::SizeMismatch {
                expected: header.total_package_size,
                actual,
            });
        }

        let index = table::load_file_table(io, &header)?;

        let dict_path = GamePath::new(
            header.game_directory,
            format!("pkgcdict_{}.dat", header.platform.name()),
        );
        let dict_path = index.table.contains_key(&dict_path).then_some(dict_path);

        self.state = LoadState::Ready(Loaded {
            header,
            index,
            dict_path,
        });
        Ok(())
    }
}

/// A read-only view of a SAR package.
///
/// Cloning is cheap and every clone refers to the same loaded package.
#[derive(Clone)]
pub struct PackageFileSystem {
    pub(crate) shared: Arc<Shared>,
}

impl PackageFileSystem {
    /// Open and load the package at `path`.
    ///
    /// Never fails outright; check [`is_ok`](Self::is_ok) and
    /// [`load_error`](Self::load_error).
    pub fn new(path: impl AsRef<Path>, options: PackageOptions) -> Self {
        let path = path.as_ref();
        let source = options
            .validate()
            .and_then(|()| Self::open_source(path, &options).map_err(Error::from));
        Self::load(path.display().to_string(), source, &options)
    }

    /// Load a package held in memory.
    ///
    /// Only `defer_dictionary` applies; a writable in-memory package is
    /// rejected.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>, options: PackageOptions) -> Self {
        let source = if options.is_writable() {
            Err(Error::InvalidOptions("an in-memory package cannot be writable"))
        } else {
            Ok(PackageSource::from_memory(data))
        };
        Self::load(name.into(), source, &options)
    }

    fn open_source(path: &Path, options: &PackageOptions) -> io::Result<PackageSource> {
        if options.is_load_into_memory() {
            PackageSource::open_buffered(path)
        } else if options.is_memory_mapped() {
            PackageSource::open_mapped(path)
        } else {
            PackageSource::open_file(path, options.is_writable())
        }
    }

    fn load(name: String, source: Result<PackageSource>, options: &PackageOptions) -> Self {
        let (source, opened) = match source {
            Ok(source) => (source, Ok(())),
            Err(err) => (PackageSource::from_memory(Vec::new()), Err(err)),
        };

        let mut shared = Shared {
            name,
            io: Mutex::new(IoState::new(source)),
            state: LoadState::Failed("package has not been loaded".to_string()),
            revoked: OnceLock::new(),
            dict: DictionaryCell::new(),
            active_files: AtomicUsize::new(0),
        };

        if let Err(err) = opened.and_then(|()| shared.load()) {
            warn!(package = %shared.name, error = %err, "failed to load package");
            shared.state = LoadState::Failed(err.to_string());
        }

        let package = Self {
            shared: Arc::new(shared),
        };

        if package.is_ok() && !options.is_dictionary_deferred() {
            if let Err(err) = package.process_compression_dict() {
                warn!(package = %package.name(), error = %err, "failed to resolve compression dictionary");
                let _ = package.shared.revoked.set(err.to_string());
            }
        }

        if let Ok(loaded) = package.shared.loaded() {
            info!(
                package = %package.name(),
                entries = loaded.index.table.len(),
                version = loaded.header.version,
                changelist = loaded.header.build_changelist,
                "loaded package"
            );
        }

        package
    }

    /// Whether the package loaded successfully.
    pub fn is_ok(&self) -> bool {
        self.shared.loaded().is_ok()
    }

    /// Why the package failed to load.
    pub fn load_error(&self) -> Option<&str> {
        if let Some(reason) = self.shared.revoked.get() {
            return Some(reason);
        }
        match &self.shared.state {
            LoadState::Ready(_) => None,
            LoadState::Failed(reason) => Some(reason),
        }
    }

    /// The path or name the package was opened with.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn header(&self) -> Option<&PackageHeader> {
        self.shared.loaded().ok().map(|loaded| &loaded.header)
    }

    pub fn game_directory(&self) -> Option<GameDirectory> {
        self.header().map(|h| h.game_directory)
    }

    pub fn platform(&self) -> Option<Platform> {
        self.header().map(|h| h.platform)
    }

    pub fn build_changelist(&self) -> u32 {
        self.header().map_or(0, |h| h.build_changelist)
    }

    pub fn build_version_major(&self) -> u32 {
        self.header().map_or(0, |h| h.build_version_major)
    }

    pub fn package_variation(&self) -> u32 {
        self.header().map_or(0, |h| h.package_variation)
    }

    pub fn is_obfuscated(&self) -> bool {
        self.header().is_some_and(|h| h.obfuscated)
    }

    pub fn supports_directory_queries(&self) -> bool {
        self.header().is_some_and(|h| h.supports_directory_queries)
    }

    /// Every entry carries a CRC32 of its stored bytes, so verification can
    /// skip decoding.
    pub fn has_post_crc32(&self) -> bool {
        self.shared
            .loaded()
            .is_ok_and(|loaded| loaded.index.has_post_crc32)
    }

    pub(crate) fn codec(&self) -> Codec {
        self.header().map_or(Codec::Zstd, PackageHeader::codec)
    }

    /// Number of files in the package.
    pub fn entry_count(&self) -> usize {
        self.shared
            .loaded()
            .map_or(0, |loaded| loaded.index.table.len())
    }

    fn table_entry(&self, path: &GamePath) -> Option<&TableEntry> {
        self.shared.loaded().ok()?.index.table.get(path)
    }

    pub fn exists(&self, path: &GamePath) -> bool {
        self.table_entry(path).is_some()
    }

    /// Logical size of a file.
    pub fn file_size(&self, path: &GamePath) -> Option<u64> {
        self.table_entry(path).map(|t| t.entry.uncompressed_size)
    }

    pub fn modified_time(&self, path: &GamePath) -> Option<u64> {
        self.table_entry(path).map(|t| t.entry.modified_time)
    }

    /// The file table record for `path`.
    pub fn entry(&self, path: &GamePath) -> Option<FileEntry> {
        self.table_entry(path).map(|t| t.entry)
    }

    fn matches_platform(&self, platform: Platform) -> bool {
        self.platform() == Some(platform)
    }

    pub fn exists_for_platform(&self, platform: Platform, path: &GamePath) -> bool {
        self.matches_platform(platform) && self.exists(path)
    }

    pub fn file_size_for_platform(&self, platform: Platform, path: &GamePath) -> Option<u64> {
        self.matches_platform(platform)
            .then(|| self.file_size(path))
            .flatten()
    }

    pub fn modified_time_for_platform(&self, platform: Platform, path: &GamePath) -> Option<u64> {
        self.matches_platform(platform)
            .then(|| self.modified_time(path))
            .flatten()
    }

    /// All entries in on-disk table order.
    pub fn file_table(&self) -> Vec<(GamePath, TableEntry)> {
        let Ok(loaded) = self.shared.loaded() else {
            return Vec::new();
        };
        let mut entries: Vec<_> = loaded
            .index
            .table
            .iter()
            .map(|(path, entry)| (path.clone(), *entry))
            .collect();
        entries.sort_unstable_by_key(|(_, entry)| entry.order);
        entries
    }

    /// Open a file for reading.
    ///
    /// Entries whose compressed and uncompressed sizes differ are decoded on
    /// first access.
    pub fn open(&self, path: &GamePath, mode: OpenMode) -> Result<Box<dyn VirtualFile>> {
        if mode.is_write() {
            return Err(Error::UnsupportedOpenMode(mode));
        }

        let loaded = self.shared.loaded()?;
        let (path, entry) = loaded
            .index
            .table
            .get_key_value(path)
            .ok_or_else(|| Error::EntryNotFound(path.to_string()))?;

        if entry.entry.is_compressed() {
            Ok(Box::new(CompressedFile::new(self.clone(), path.clone(), entry)))
        } else {
            Ok(Box::new(StoredFile::new(self.clone(), path.clone(), entry)))
        }
    }

    /// Read the full contents of a file.
    pub fn read_file(&self, path: &GamePath) -> Result<Vec<u8>> {
        self.open(path, OpenMode::Read)?.read_all()
    }

    /// Read several files concurrently.
    ///
    /// Disk access still serializes on the package's IO lock; decompression
    /// runs in parallel.
    #[cfg(feature = "parallel")]
    pub fn read_files_parallel(&self, paths: &[GamePath]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        paths.par_iter().map(|path| self.read_file(path)).collect()
    }

    /// List the files in `directory`.
    ///
    /// Non-recursive listings return only direct children. `extension`
    /// matches case-insensitively with or without the leading `.`. Fails
    /// when the package was cooked without directory query support or the
    /// directory belongs to another game directory.
    pub fn directory_listing(
        &self,
        directory: &GamePath,
        recursive: bool,
        extension: Option<&str>,
    ) -> Result<Vec<GamePath>> {
        let loaded = self.shared.loaded()?;

        if directory.directory() != loaded.header.game_directory {
            return Err(Error::DirectoryQueryUnsupported(format!(
                "{directory} is outside the {} directory of this package",
                loaded.header.game_directory.scheme()
            )));
        }
        let sorted = &loaded.index.sorted;
        if sorted.is_empty() {
            return Err(Error::DirectoryQueryUnsupported(format!(
                "{} was cooked without directory queries",
                self.name()
            )));
        }

        let query = directory.relative().trim_end_matches('/');
        let candidates = if query.is_empty() {
            &sorted[..]
        } else {
            let lower = sorted.partition_point(|p| compare_prefix(p.relative(), query).is_lt());
            let len = sorted[lower..].partition_point(|p| compare_prefix(p.relative(), query).is_eq());
            &sorted[lower..lower + len]
        };

        let extension = extension
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty());

        let listing = candidates
            .iter()
            .filter(|path| {
                extension.map_or(true, |ext| {
                    path.extension().trim_start_matches('.').eq_ignore_ascii_case(ext)
                })
            })
            .filter(|path| {
                if recursive {
                    // Guards against `foo` matching `foobar/...`.
                    query.is_empty() || path.relative().as_bytes().get(query.len()) == Some(&b'/')
                } else {
                    path.parent().eq_ignore_ascii_case(query)
                }
            })
            .cloned()
            .collect();
        Ok(listing)
    }

    /// Path of the compression dictionary, when the package has one.
    pub fn compression_dict_path(&self) -> Option<&GamePath> {
        self.shared.loaded().ok()?.dict_path.as_ref()
    }

    /// Whether dictionary resolution has completed successfully.
    pub fn is_compression_dict_processed(&self) -> bool {
        self.shared.dict.state() == DictionaryState::Ready
    }

    pub fn dictionary_state(&self) -> DictionaryState {
        self.shared.dict.state()
    }

    /// Resolve the compression dictionary.
    ///
    /// Idempotent and safe to call from many threads at once; only one
    /// caller does the work. A package without a dictionary resolves
    /// trivially.
    pub fn process_compression_dict(&self) -> Result<()> {
        self.shared.loaded()?;
        self.shared.dict.resolve(|| self.load_dictionary())
    }

    fn load_dictionary(&self) -> Result<Option<DecompressionDict>> {
        let Some(path) = self.compression_dict_path() else {
            return Ok(None);
        };
        let size = self.file_size(path).unwrap_or(0);
        if size == 0 || size > MAX_READ_SIZE {
            return Err(Error::InvalidDictionary(format!(
                "{path} has invalid size {size}"
            )));
        }

        let bytes = self
            .read_file(path)
            .map_err(|e| Error::InvalidDictionary(format!("{path}: {e}")))?;
        debug!(path = %path, size = bytes.len(), "read compression dictionary");
        DecompressionDict::new(&bytes).map(Some)
    }

    /// Dictionary to decode `path` with. The dictionary file itself never
    /// uses one.
    pub(crate) fn dictionary_for(&self, path: &GamePath) -> Option<&DecompressionDict> {
        if self.compression_dict_path() == Some(path) {
            return None;
        }
        self.shared.dict.get()
    }

    /// Write `data` at an absolute position in the archive.
    pub fn commit_change(&self, data: &[u8], position: u64) -> Result<()> {
        let mut io = self.shared.io.lock();
        if !io.source().can_write() {
            return Err(Error::NotWritable);
        }
        io.write_at(position, data).map_err(|e| {
            warn!(package = %self.name(), position, len = data.len(), error = %e, "raw write failed");
            Error::from(e)
        })
    }

    /// Flush committed changes to disk.
    pub fn flush_changes(&self) -> Result<()> {
        let mut io = self.shared.io.lock();
        if !io.source().can_write() {
            return Err(Error::NotWritable);
        }
        io.flush().map_err(Error::from)
    }

    /// Read raw archive bytes at an absolute offset. No de-obfuscation.
    pub fn read_raw(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.shared.io.lock().read_raw(offset, buf).map_err(|e| {
            warn!(package = %self.name(), offset, len = buf.len(), error = %e, "raw read failed");
            Error::from(e)
        })
    }

    /// Number of files currently open from this package.
    pub fn active_file_count(&self) -> usize {
        self.shared.active_files.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PackageFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageFileSystem")
            .field("name", &self.name())
            .field("ok", &self.is_ok())
            .field("entries", &self.entry_count())
            .finish_non_exhaustive()
    }
}

/// Compare the first `prefix.len()` bytes of `path` with `prefix`, ignoring
/// ASCII case. Shorter paths order before the prefix.
fn compare_prefix(path: &str, prefix: &str) -> std::cmp::Ordering {
    let head = &path.as_bytes()[..path.len().min(prefix.len())];
    head.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(prefix.bytes().map(|b| b.to_ascii_lowercase()))
}
