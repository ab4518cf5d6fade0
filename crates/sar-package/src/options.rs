//! Load options for a package.

use crate::{Error, Result};

/// How a package is opened and loaded.
///
/// ```
/// use sar_package::PackageOptions;
///
/// let options = PackageOptions::new().load_into_memory(true).defer_dictionary(true);
/// assert!(options.is_load_into_memory());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageOptions {
    load_into_memory: bool,
    memory_mapped: bool,
    writable: bool,
    defer_dictionary: bool,
}

impl PackageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the whole archive into a heap buffer at load.
    pub fn load_into_memory(mut self, enabled: bool) -> Self {
        self.load_into_memory = enabled;
        self
    }

    /// Memory-map the archive instead of reading through a file handle.
    pub fn memory_mapped(mut self, enabled: bool) -> Self {
        self.memory_mapped = enabled;
        self
    }

    /// Open the archive read-write so raw changes can be committed.
    pub fn writable(mut self, enabled: bool) -> Self {
        self.writable = enabled;
        self
    }

    /// Skip dictionary resolution at load. It then happens on the first
    /// explicit [`process_compression_dict`](crate::PackageFileSystem::process_compression_dict) call.
    pub fn defer_dictionary(mut self, enabled: bool) -> Self {
        self.defer_dictionary = enabled;
        self
    }

    pub fn is_load_into_memory(&self) -> bool {
        self.load_into_memory
    }

    pub fn is_memory_mapped(&self) -> bool {
        self.memory_mapped
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_dictionary_deferred(&self) -> bool {
        self.defer_dictionary
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.load_into_memory && self.memory_mapped {
            return Err(Error::InvalidOptions(
                "load_into_memory and memory_mapped are mutually exclusive",
            ));
        }
        if self.writable && (self.load_into_memory || self.memory_mapped) {
            return Err(Error::InvalidOptions(
                "a writable package must be read through a file handle",
            ));
        }
        Ok(())
    }
}
