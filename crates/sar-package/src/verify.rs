//! CRC32 verification of package contents.
//!
//! Packages with post-cook checksums are verified against the stored bytes.
//! Neighbouring entries are read in batches so that a full scan touches the
//! disk in a few large sequential reads. Older packages fall back to
//! decoding every file and checking the pre-cook checksum.

use std::cmp::Ordering;

use sar_common::{crc, GamePath};
use tracing::{debug, warn};

use crate::file::OpenMode;
use crate::package::PackageFileSystem;
use crate::table::FileEntry;

/// Preferred size of one batched read.
pub const TARGET_READ_SIZE: u64 = 4096;

/// Largest gap between two entries that still lets them share a read.
pub const MAX_OVERFLOW: u64 = 128;

/// One file in a verification request or report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Crc32Entry {
    pub path: GamePath,
    pub entry: FileEntry,
    pub crc32_ok: bool,
}

impl Crc32Entry {
    /// A request to verify `path`. The entry is filled in by the check.
    pub fn new(path: GamePath) -> Self {
        Self {
            path,
            entry: FileEntry::default(),
            crc32_ok: false,
        }
    }
}

/// On-disk order; zero-size files share offsets, so ties go by name.
fn offset_order(a: &Crc32Entry, b: &Crc32Entry) -> Ordering {
    a.entry
        .offset_to_file
        .cmp(&b.entry.offset_to_file)
        .then_with(|| a.path.relative().cmp(b.path.relative()))
}

/// End (exclusive) of the batch starting at `start`.
fn batch_end(entries: &[Crc32Entry], start: usize) -> usize {
    let first = &entries[start].entry;
    if first.compressed_size > u32::MAX as u64 {
        return start + 1;
    }

    let mut to_read = first.compressed_size;
    let mut previous_end = first.offset_to_file.saturating_add(first.compressed_size);
    let mut end = start + 1;

    while let Some(next) = entries.get(end).map(|e| &e.entry) {
        let Some(overflow) = next.offset_to_file.checked_sub(previous_end) else {
            break;
        };
        if overflow > MAX_OVERFLOW {
            break;
        }
        let extra = next.compressed_size.saturating_add(overflow);
        if to_read.saturating_add(extra) > TARGET_READ_SIZE {
            break;
        }

        to_read += extra;
        previous_end = next.offset_to_file + next.compressed_size;
        end += 1;
    }

    end
}

impl PackageFileSystem {
    /// Every entry of the package, sorted by offset, ready for
    /// [`verify_crc32_entries`](Self::verify_crc32_entries).
    pub fn file_table_entries(&self) -> Vec<Crc32Entry> {
        let Ok(loaded) = self.shared.loaded() else {
            return Vec::new();
        };

        let mut entries: Vec<_> = loaded
            .index
            .table
            .iter()
            .map(|(path, table_entry)| Crc32Entry {
                path: path.clone(),
                entry: table_entry.entry,
                crc32_ok: false,
            })
            .collect();
        entries.sort_unstable_by(offset_order);
        entries
    }

    /// Check every file and stop at the first failure.
    pub fn verify_crc32(&self) -> bool {
        if !self.is_ok() {
            return false;
        }
        let mut entries = self.file_table_entries();
        self.check_entries(&mut entries, false)
    }

    /// Check files and report a result for each one.
    ///
    /// An empty `entries` is replaced by the whole table. Otherwise only the
    /// listed paths are checked; paths the package does not contain are
    /// dropped from the list. Always completes the full pass and returns
    /// true only if every remaining entry passed.
    pub fn verify_crc32_entries(&self, entries: &mut Vec<Crc32Entry>) -> bool {
        let Ok(loaded) = self.shared.loaded() else {
            for e in entries.iter_mut() {
                e.entry = FileEntry::default();
                e.crc32_ok = false;
            }
            return false;
        };

        if entries.is_empty() {
            *entries = self.file_table_entries();
        } else {
            entries.retain_mut(|e| match loaded.index.table.get(&e.path) {
                Some(table_entry) => {
                    e.entry = table_entry.entry;
                    e.crc32_ok = false;
                    true
                }
                None => {
                    debug!(path = %e.path, "dropping unknown path from CRC32 check");
                    false
                }
            });
            entries.sort_unstable_by(offset_order);
        }

        if entries.is_empty() {
            return true;
        }
        self.check_entries(entries, true)
    }

    /// Check a single file.
    pub fn verify_file_crc32(&self, path: &GamePath) -> bool {
        let Ok(loaded) = self.shared.loaded() else {
            return false;
        };
        let Some(table_entry) = loaded.index.table.get(path) else {
            return false;
        };

        let entry = table_entry.entry;
        if entry.compressed_size > u32::MAX as u64 || entry.uncompressed_size > u32::MAX as u64 {
            return false;
        }
        if entry.compressed_size == 0 {
            return true;
        }

        let mut single = [Crc32Entry {
            path: path.clone(),
            entry,
            crc32_ok: false,
        }];
        self.check_entries(&mut single, false)
    }

    fn check_entries(&self, entries: &mut [Crc32Entry], report: bool) -> bool {
        if self.has_post_crc32() {
            self.check_post_crc32(entries, report)
        } else {
            self.check_pre_crc32(entries, report)
        }
    }

    /// Batched check of the stored bytes against the post-cook CRC32.
    ///
    /// Holds the IO lock for the whole scan.
    fn check_post_crc32(&self, entries: &mut [Crc32Entry], report: bool) -> bool {
        let mut io = self.shared.io.lock();
        let mut buffer = Vec::with_capacity(TARGET_READ_SIZE as usize);
        let mut all_ok = true;
        let mut start = 0;

        while start < entries.len() {
            let end = batch_end(entries, start);
            let first = entries[start].entry;

            if first.compressed_size > u32::MAX as u64 {
                warn!(path = %entries[start].path, size = first.compressed_size, "entry too large for CRC32 check");
                entries[start].crc32_ok = false;
                all_ok = false;
                if !report {
                    return false;
                }
                start = end;
                continue;
            }

            let last = entries[end - 1].entry;
            let span = (last.offset_to_file + last.compressed_size - first.offset_to_file) as usize;
            buffer.resize(span, 0);

            if let Err(err) = io.read_exact_at(first.offset_to_file, &mut buffer) {
                warn!(offset = first.offset_to_file, len = span, error = %err, "CRC32 batch read failed");
                for e in &mut entries[start..] {
                    e.crc32_ok = false;
                }
                return false;
            }

            for e in &mut entries[start..end] {
                let size = e.entry.compressed_size as usize;
                e.crc32_ok = size == 0 || {
                    let at = (e.entry.offset_to_file - first.offset_to_file) as usize;
                    crc::hash_bytes(&buffer[at..at + size]) == e.entry.crc32_post
                };

                if !e.crc32_ok {
                    warn!(path = %e.path, expected = e.entry.crc32_post, "CRC32 mismatch");
                    all_ok = false;
                    if !report {
                        return false;
                    }
                }
            }

            start = end;
        }

        all_ok
    }

    /// Decode each file and compare against the pre-cook CRC32 and size.
    fn check_pre_crc32(&self, entries: &mut [Crc32Entry], report: bool) -> bool {
        let mut all_ok = true;

        for e in entries.iter_mut() {
            if e.entry.compressed_size == 0 {
                e.crc32_ok = true;
                continue;
            }

            e.crc32_ok = match self.open(&e.path, OpenMode::Read).and_then(|mut f| f.read_all()) {
                Ok(data) => {
                    data.len() as u64 == e.entry.uncompressed_size
                        && crc::hash_bytes(&data) == e.entry.crc32_pre
                }
                Err(err) => {
                    warn!(path = %e.path, error = %err, "failed to read file for CRC32 check");
                    false
                }
            };

            if !e.crc32_ok {
                warn!(path = %e.path, expected = e.entry.crc32_pre, "CRC32 mismatch");
                all_ok = false;
                if !report {
                    return false;
                }
            }
        }

        all_ok
    }
}
