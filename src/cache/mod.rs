//! Block cache shared by every file the index touches.
//!
//! Provides a write-back LRU cache of 4KB blocks across any number of named
//! files, with whole-block and arbitrary byte-range access.

mod block_cache;
mod lru;

use std::path::{Path, PathBuf};

pub use block_cache::{BlockCache, CacheStats};

/// Size of a block, the unit of caching and file I/O.
pub const BLOCK_SIZE: usize = 4096;

/// A unique identifier for a cached block.
///
/// Two ids are equal iff both the file and the block number match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    /// File the block belongs to
    pub file: PathBuf,
    /// Block number within the file
    pub block: u64,
}

impl BlockId {
    /// Highest block number whose byte offset fits in a `u64`.
    pub const MAX_BLOCK: u64 = u64::MAX / BLOCK_SIZE as u64;

    /// Create a new block id
    pub fn new<P: AsRef<Path>>(file: P, block: u64) -> Self {
        Self { file: file.as_ref().to_path_buf(), block }
    }

    /// Byte offset of the first byte of this block in its file.
    ///
    /// The block number must not exceed [`MAX_BLOCK`](Self::MAX_BLOCK).
    pub fn byte_offset(&self) -> u64 {
        debug_assert!(self.block <= Self::MAX_BLOCK);
        self.block * BLOCK_SIZE as u64
    }
}
