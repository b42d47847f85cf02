//! # chainidx - A Disk-Resident Chained Hash Index
//!
//! chainidx maps byte-string keys to record locations (a data file plus a
//! byte offset) through an on-disk hash table. It is the storage layer under
//! key-matching pipelines that scan large data files once and then look
//! records up by key.
//!
//! ## Architecture
//!
//! The engine consists of two layers:
//!
//! - **Block Cache**: a bounded, file-agnostic LRU cache of 4KB blocks with
//!   write-back eviction. All index I/O goes through it.
//! - **Hash Index**: a chained-bucket hash table whose buckets are blocks of
//!   one index file. Full buckets grow overflow chains; nothing is ever
//!   deleted or rehashed.
//!
//! The cache is constructed explicitly and shared with `Arc`, so several
//! indexes (or other file users) can draw from one memory budget.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use chainidx::cache::BlockCache;
//! use chainidx::{HashIndex, IndexOptions, KeyMode};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), chainidx::Error> {
//! let cache = Arc::new(BlockCache::new(1024));
//! let options = IndexOptions::new("./order.idx", 1 << 16)
//!     .key_mode(KeyMode::Fixed(8))
//!     .data_files(["./order.0", "./order.1"]);
//! let index = HashIndex::open(options, Arc::clone(&cache))?;
//!
//! // Record where keys live
//! index.add(b"00000042", 0, 0)?;
//! index.add(b"00000043", 1, 512)?;
//!
//! // Look them up
//! if let Some(location) = index.get(b"00000043")? {
//!     println!("{:?} at {}", location.file, location.offset);
//! }
//!
//! // Persist cached blocks and index metadata
//! index.flush()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;

// Re-exports
pub use cache::BlockCache;
pub use config::{CacheOptions, IndexOptions, KeyMode};
pub use error::{Error, Result};
pub use index::{HashIndex, Location};
