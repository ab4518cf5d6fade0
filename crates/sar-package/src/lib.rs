//! Read-only file system over SAR packages.
//!
//! A SAR package bundles many game files into one archive: a 48-byte
//! header, the file bytes, and a file table indexing them. Files may be
//! obfuscated with a position-dependent XOR stream and compressed with LZ4
//! (version 16) or Zstandard, optionally with a shared dictionary stored in
//! the package itself.
//!
//! - [`PackageFileSystem`] - Loads a package and serves lookups, reads and listings
//! - [`VirtualFile`] - `Read + Seek` handle to one file in a package
//! - [`PackageHeader`] - Version-normalized header
//! - [`Crc32Entry`] - Per-file result of CRC32 verification
//!
//! # Example
//!
//! ```no_run
//! use sar_package::{GameDirectory, GamePath, OpenMode, PackageFileSystem, PackageOptions};
//!
//! let package = PackageFileSystem::new("content.sar", PackageOptions::default());
//! if let Some(reason) = package.load_error() {
//!     eprintln!("failed to load: {reason}");
//!     return Ok(());
//! }
//!
//! let path = GamePath::new(GameDirectory::Content, "UI/Main.json");
//! let mut file = package.open(&path, OpenMode::Read)?;
//! let data = file.read_all()?;
//! println!("{} bytes", data.len());
//!
//! for entry in package.directory_listing(&GamePath::new(GameDirectory::Content, "UI"), true, Some("json"))? {
//!     println!("{entry}");
//! }
//! # Ok::<(), sar_package::Error>(())
//! ```

mod decompress;
mod dict;
mod error;
mod file;
mod obfuscation;
mod options;
mod package;
mod source;
mod table;
mod verify;

pub mod header;

pub use decompress::{Codec, DecompressionDict, MAX_READ_SIZE, PREAMBLE_SIZE};
pub use dict::DictionaryState;
pub use error::{Error, ErrorCategory, Result};
pub use file::{CompressedFile, OpenMode, StoredFile, VirtualFile};
pub use header::{PackageHeader, HEADER_SIZE, PACKAGE_SIGNATURE, PACKAGE_VERSION};
pub use obfuscation::{file_table_key, obfuscate, obfuscation_key, OBFUSCATION_SEED};
pub use options::PackageOptions;
pub use package::PackageFileSystem;
pub use table::{FileEntry, RawFileEntry, TableEntry};
pub use verify::{Crc32Entry, MAX_OVERFLOW, TARGET_READ_SIZE};

pub use sar_common::{FileType, GameDirectory, GamePath, Platform};
