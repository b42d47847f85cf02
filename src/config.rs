//! Configuration options for the block cache and the hash index.

use crate::cache::BLOCK_SIZE;
use crate::index::{BUCKET_HEADER_SIZE, ENTRY_TRAILER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration options for a [`BlockCache`](crate::cache::BlockCache).
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of resident 4KB blocks.
    /// Default: 1024 (4MB)
    pub capacity: usize,

    /// Write every resident block back when the cache is dropped.
    /// Default: true
    pub flush_on_drop: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { capacity: 1024, flush_on_drop: true }
    }
}

impl CacheOptions {
    /// Creates a new CacheOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of resident blocks.
    pub fn capacity(mut self, blocks: usize) -> Self {
        self.capacity = blocks;
        self
    }

    /// Sets whether dropping the cache flushes it.
    pub fn flush_on_drop(mut self, value: bool) -> Self {
        self.flush_on_drop = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.capacity == 0 {
            return Err(crate::Error::invalid_argument("cache capacity must be > 0"));
        }
        Ok(())
    }
}

/// How keys are laid out inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMode {
    /// Every key occupies exactly this many bytes.
    Fixed(usize),
    /// Keys carry a 2-byte length prefix.
    Variable,
}

/// Configuration options for opening a [`HashIndex`](crate::index::HashIndex).
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Number of home buckets. Block numbers `0..bucket_count` are home slots.
    pub bucket_count: u32,

    /// Key layout, fixed for the lifetime of the index file.
    pub key_mode: KeyMode,

    /// Path of the index file holding the buckets.
    pub index_file: PathBuf,

    /// Data files, addressed by position (`fileId`).
    pub data_files: Vec<PathBuf>,
}

impl IndexOptions {
    /// Creates options for an index at `index_file` with variable-size keys.
    pub fn new<P: AsRef<Path>>(index_file: P, bucket_count: u32) -> Self {
        Self {
            bucket_count,
            key_mode: KeyMode::Variable,
            index_file: index_file.as_ref().to_path_buf(),
            data_files: Vec::new(),
        }
    }

    /// Sets the key layout.
    pub fn key_mode(mut self, mode: KeyMode) -> Self {
        self.key_mode = mode;
        self
    }

    /// Sets the ordered data file list.
    pub fn data_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.data_files = files.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bucket_count == 0 {
            return Err(crate::Error::invalid_argument("bucket_count must be > 0"));
        }
        if let KeyMode::Fixed(size) = self.key_mode {
            if size == 0 {
                return Err(crate::Error::invalid_argument("fixed key size must be > 0"));
            }
            if size + ENTRY_TRAILER_SIZE > BLOCK_SIZE - BUCKET_HEADER_SIZE {
                return Err(crate::Error::invalid_argument(format!(
                    "fixed key size {} does not fit in a bucket",
                    size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_options() {
        let opts = CacheOptions::default();
        assert_eq!(opts.capacity, 1024);
        assert!(opts.flush_on_drop);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_cache_options_builder() {
        let opts = CacheOptions::new().capacity(10).flush_on_drop(false);
        assert_eq!(opts.capacity, 10);
        assert!(!opts.flush_on_drop);

        assert!(CacheOptions::new().capacity(0).validate().is_err());
    }

    #[test]
    fn test_index_options_builder() {
        let opts = IndexOptions::new("index.db", 64)
            .key_mode(KeyMode::Fixed(8))
            .data_files(["a.dat", "b.dat"]);

        assert_eq!(opts.bucket_count, 64);
        assert_eq!(opts.key_mode, KeyMode::Fixed(8));
        assert_eq!(opts.data_files, vec![PathBuf::from("a.dat"), PathBuf::from("b.dat")]);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_index_options_validation() {
        assert!(IndexOptions::new("i", 0).validate().is_err());
        assert!(IndexOptions::new("i", 4).key_mode(KeyMode::Fixed(0)).validate().is_err());

        // 4096 - 8 header - 12 trailer is the largest key that fits
        assert!(IndexOptions::new("i", 4).key_mode(KeyMode::Fixed(4076)).validate().is_ok());
        assert!(IndexOptions::new("i", 4).key_mode(KeyMode::Fixed(4077)).validate().is_err());
    }
}
