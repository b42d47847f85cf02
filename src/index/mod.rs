//! Disk-resident chained-bucket hash index.
//!
//! Maps byte-string keys to `(data file, offset)` locations. Buckets are
//! 4KB blocks of a single index file, read and written only through a shared
//! [`BlockCache`]. Block numbers `0..bucket_count` are the home buckets; a
//! full bucket is extended by an overflow bucket allocated past them, forming
//! a forward chain that only ever grows.

mod bucket;
mod meta;

pub use bucket::{BUCKET_HEADER_SIZE, ENTRY_TRAILER_SIZE, MAX_VARIABLE_KEY_SIZE};
pub use meta::IndexMeta;

use crate::cache::{BlockCache, BLOCK_SIZE};
use crate::config::{IndexOptions, KeyMode};
use crate::error::{Error, Result};
use bucket::Bucket;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Where a record lives: a data file and a byte offset inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Data file holding the record
    pub file: PathBuf,
    /// Byte offset of the record in `file`
    pub offset: u64,
}

/// Home bucket of `key` among `bucket_count` buckets.
///
/// `h = 31 * h + b` over the key bytes taken as signed, with wrapping 32-bit
/// arithmetic. The absolute value is taken as unsigned so `i32::MIN` maps to
/// `2^31` instead of staying negative.
pub fn bucket_for(key: &[u8], bucket_count: u32) -> u32 {
    let h = key
        .iter()
        .fold(0i32, |h, &b| h.wrapping_mul(31).wrapping_add(b as i8 as i32));
    h.unsigned_abs() % bucket_count
}

/// Persistent key → location map over a [`BlockCache`].
///
/// # Concurrency
///
/// `add` and `get` are sequences of independent single-block cache calls
/// with no lock spanning them. Overflow block numbers come from an atomic
/// counter, so concurrent `add`s never share a bucket, but two `add`s racing
/// on the same chain can both see a full tail and both extend it, orphaning
/// one entry. Callers adding concurrently must serialise per home bucket
/// (see [`bucket_of`](Self::bucket_of)). Concurrent `get`s are always safe.
#[derive(Debug)]
pub struct HashIndex {
    cache: Arc<BlockCache>,
    index_file: PathBuf,
    bucket_count: u32,
    key_mode: KeyMode,
    data_files: Vec<PathBuf>,
    next_block: AtomicU32,
}

impl HashIndex {
    /// Opens the index described by `options` on top of `cache`.
    ///
    /// A missing index file is created empty. For an existing one, the
    /// overflow counter resumes past every block already allocated, and a
    /// metadata sidecar left by [`flush`](Self::flush) must agree with the
    /// options' bucket count and key mode.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use chainidx::cache::BlockCache;
    /// use chainidx::{HashIndex, IndexOptions, KeyMode};
    /// use std::sync::Arc;
    ///
    /// # fn main() -> Result<(), chainidx::Error> {
    /// let cache = Arc::new(BlockCache::new(1024));
    /// let options = IndexOptions::new("./buyer.idx", 4096)
    ///     .key_mode(KeyMode::Variable)
    ///     .data_files(["./orders.0", "./orders.1"]);
    /// let index = HashIndex::open(options, cache)?;
    ///
    /// index.add(b"buyer-42", 1, 8192)?;
    /// if let Some(loc) = index.get(b"buyer-42")? {
    ///     println!("{:?} @ {}", loc.file, loc.offset);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(options: IndexOptions, cache: Arc<BlockCache>) -> Result<Self> {
        options.validate()?;

        let mut next_block = options.bucket_count;
        if let Some(meta) = IndexMeta::load(&options.index_file)? {
            if meta.bucket_count != options.bucket_count || meta.key_mode != options.key_mode {
                return Err(Error::invalid_argument(format!(
                    "index {:?} was built with {} buckets and {:?}, opened with {} and {:?}",
                    options.index_file,
                    meta.bucket_count,
                    meta.key_mode,
                    options.bucket_count,
                    options.key_mode
                )));
            }
            next_block = next_block.max(meta.next_block);
        }

        let allocated = cache.block_count(&options.index_file)?;
        let allocated = u32::try_from(allocated).map_err(|_| {
            Error::corruption(format!("index {:?} spans {} blocks", options.index_file, allocated))
        })?;
        next_block = next_block.max(allocated);

        log::info!(
            "Opened index {:?}: {} buckets, {:?} keys, next overflow block {}",
            options.index_file,
            options.bucket_count,
            options.key_mode,
            next_block
        );

        Ok(Self {
            cache,
            index_file: options.index_file,
            bucket_count: options.bucket_count,
            key_mode: options.key_mode,
            data_files: options.data_files,
            next_block: AtomicU32::new(next_block),
        })
    }

    /// Record that `key` lives at `offset` of data file `file_id`.
    ///
    /// Entries are append-only: adding an existing key stores a second entry,
    /// and [`get`](Self::get) keeps returning the first.
    pub fn add(&self, key: &[u8], file_id: u32, offset: u64) -> Result<()> {
        let key = self.normalize_key(key)?;
        if file_id as usize >= self.data_files.len() {
            return Err(Error::invalid_argument(format!(
                "file id {} out of range, {} data files",
                file_id,
                self.data_files.len()
            )));
        }

        let mut tail = self.load_bucket(bucket_for(&key, self.bucket_count))?;
        while let Some(next) = self.load_next(&tail)? {
            tail = next;
        }
        // Drop a pointer to an overflow bucket that never reached the file
        tail.set_next(0);

        let entry_size = self.key_mode.entry_size(key.len());
        if !tail.fits(entry_size) {
            let overflow = self.allocate_block()?;
            tail.set_next(overflow);
            self.store_bucket(&tail)?;
            log::debug!("Bucket {} full, chained overflow bucket {}", tail.number(), overflow);
            tail = Bucket::empty(overflow);
        }

        tail.append(self.key_mode, &key, file_id, offset);
        self.store_bucket(&tail)
    }

    /// Location of the earliest entry added for `key`, or `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Location>> {
        let mut found = None;
        self.scan(key, |file_id, offset| {
            found = Some((file_id, offset));
            false
        })?;
        found.map(|(file_id, offset)| self.locate(file_id, offset)).transpose()
    }

    /// Every location added for `key`, earliest first.
    pub fn get_all(&self, key: &[u8]) -> Result<Vec<Location>> {
        let mut found = Vec::new();
        self.scan(key, |file_id, offset| {
            found.push((file_id, offset));
            true
        })?;
        found.into_iter().map(|(file_id, offset)| self.locate(file_id, offset)).collect()
    }

    /// Whether any entry exists for `key`.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let mut found = false;
        self.scan(key, |_, _| {
            found = true;
            false
        })?;
        Ok(found)
    }

    /// Block numbers of the chain starting at home bucket `bucket`.
    pub fn chain(&self, bucket: u32) -> Result<Vec<u32>> {
        if bucket >= self.bucket_count {
            return Err(Error::invalid_argument(format!(
                "bucket {} out of range, {} buckets",
                bucket, self.bucket_count
            )));
        }

        let mut current = self.load_bucket(bucket)?;
        let mut chain = vec![bucket];
        while let Some(next) = self.load_next(&current)? {
            chain.push(next.number());
            current = next;
        }
        Ok(chain)
    }

    /// Write every cached block back and record the index metadata.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush()?;
        let meta = IndexMeta {
            bucket_count: self.bucket_count,
            key_mode: self.key_mode,
            next_block: self.next_block(),
        };
        meta.store(&self.index_file)?;
        log::info!("Flushed index {:?}, next overflow block {}", self.index_file, meta.next_block);
        Ok(())
    }

    /// Home bucket of `key` in this index.
    pub fn bucket_of(&self, key: &[u8]) -> Result<u32> {
        let key = self.normalize_key(key)?;
        Ok(bucket_for(&key, self.bucket_count))
    }

    /// Number of home buckets.
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Block number the next overflow bucket will get.
    pub fn next_block(&self) -> u32 {
        self.next_block.load(Ordering::SeqCst)
    }

    /// Key layout of this index.
    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    /// Path of the index file.
    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// Data files, addressed by file id.
    pub fn data_files(&self) -> &[PathBuf] {
        &self.data_files
    }

    /// Walk the chain of `key`, calling `visit` with each matching entry in
    /// order until it returns false.
    fn scan<F>(&self, key: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(u32, u64) -> bool,
    {
        let key = self.normalize_key(key)?;
        let mut bucket = self.load_bucket(bucket_for(&key, self.bucket_count))?;
        loop {
            for entry in bucket.entries(self.key_mode) {
                let entry = entry?;
                if entry.key == &*key && !visit(entry.file_id, entry.offset) {
                    return Ok(());
                }
            }
            match self.load_next(&bucket)? {
                Some(next) => bucket = next,
                None => return Ok(()),
            }
        }
    }

    /// Validate `key` and bring it to the stored width.
    ///
    /// Fixed-size keys shorter than the key size are zero-padded.
    fn normalize_key<'a>(&self, key: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self.key_mode {
            KeyMode::Fixed(size) if key.len() > size => Err(Error::invalid_argument(format!(
                "key of {} bytes exceeds fixed key size {}",
                key.len(),
                size
            ))),
            KeyMode::Fixed(size) if key.len() < size => {
                let mut padded = key.to_vec();
                padded.resize(size, 0);
                Ok(Cow::Owned(padded))
            }
            KeyMode::Variable if key.len() > MAX_VARIABLE_KEY_SIZE => {
                Err(Error::invalid_argument(format!(
                    "key of {} bytes exceeds maximum {}",
                    key.len(),
                    MAX_VARIABLE_KEY_SIZE
                )))
            }
            _ => Ok(Cow::Borrowed(key)),
        }
    }

    fn locate(&self, file_id: u32, offset: u64) -> Result<Location> {
        let file = self.data_files.get(file_id as usize).ok_or_else(|| {
            Error::corruption(format!(
                "stored file id {} out of range, {} data files",
                file_id,
                self.data_files.len()
            ))
        })?;
        Ok(Location { file: file.clone(), offset })
    }

    fn allocate_block(&self) -> Result<u32> {
        self.next_block
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| Error::invalid_argument("index file exhausted the 32-bit block space"))
    }

    fn load_bucket(&self, number: u32) -> Result<Bucket> {
        let mut data = vec![0u8; BLOCK_SIZE];
        self.cache.read_block(&self.index_file, number as u64, &mut data)?;
        Bucket::from_block(number, data)
    }

    /// Follow the overflow pointer of `bucket`, or `None` at the end of its chain.
    ///
    /// Overflow buckets are allocated in increasing order after their
    /// predecessor, so a pointer that does not move forward past the home
    /// buckets is corrupt. This also rules out cycles.
    ///
    /// A pointer at or past the allocation counter is only valid when the
    /// block it names was never written back: the predecessor reached the
    /// file but the overflow bucket was lost with the cache. Such a chain
    /// ends at the predecessor.
    fn load_next(&self, bucket: &Bucket) -> Result<Option<Bucket>> {
        let next = bucket.next();
        if next == 0 {
            return Ok(None);
        }
        if next <= bucket.number() || next < self.bucket_count {
            return Err(Error::corruption(format!(
                "bucket {} points to invalid overflow bucket {}",
                bucket.number(),
                next
            )));
        }
        if next < self.next_block() {
            return self.load_bucket(next).map(Some);
        }

        if u64::from(next) < self.cache.block_count(&self.index_file)? {
            return Err(Error::corruption(format!(
                "bucket {} points to overflow bucket {} past allocation counter {}",
                bucket.number(),
                next,
                self.next_block()
            )));
        }
        log::warn!(
            "Bucket {} points to unwritten overflow bucket {}, ending chain",
            bucket.number(),
            next
        );
        Ok(None)
    }

    fn store_bucket(&self, bucket: &Bucket) -> Result<()> {
        self.cache.write_block(&self.index_file, bucket.number() as u64, bucket.as_bytes())
    }
}
