//! SAR - read-only access to SAR game packages.
//!
//! This crate provides a unified interface to the SAR library crates.
//!
//! # Crates
//!
//! - [`sar_common`] - Common utilities (binary reading, game paths, CRC32)
//! - [`sar_package`] - Package file system (headers, file table, obfuscation, LZ4/Zstd)
//!
//! # Example
//!
//! ```no_run
//! use sar::prelude::*;
//!
//! let package = PackageFileSystem::new("content.sar", PackageOptions::default());
//! if package.is_ok() {
//!     for (path, entry) in package.file_table() {
//!         println!("{path}: {} bytes", entry.entry.uncompressed_size);
//!     }
//!     println!("CRC32 ok: {}", package.verify_crc32());
//! }
//! ```

pub use sar_common as common;
pub use sar_package as package;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sar_common::{crc, FileType, GameDirectory, GamePath, Platform};
    pub use sar_package::{
        Crc32Entry, DictionaryState, Error, ErrorCategory, FileEntry, OpenMode, PackageFileSystem,
        PackageHeader, PackageOptions, TableEntry, VirtualFile,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
