//! Write-back LRU cache of fixed-size file blocks.

use super::lru::LruList;
use super::{BlockId, BLOCK_SIZE};
use crate::config::CacheOptions;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of single-block lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of blocks made resident
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Number of blocks written to their file
    pub writebacks: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A resident block and the identity it was loaded from.
#[derive(Debug)]
struct CachedBlock {
    id: BlockId,
    data: Box<[u8]>,
}

#[derive(Debug)]
struct FileHandle {
    file: File,
    read_only: bool,
}

/// How a missing block is materialised on a miss.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// Load the current file content.
    Load,
    /// The caller overwrites every byte; skip the read.
    Overwrite,
}

#[derive(Debug)]
struct Inner {
    resident: HashMap<BlockId, usize>,
    lru: LruList<CachedBlock>,
    files: HashMap<PathBuf, FileHandle>,
    stats: CacheStats,
}

/// Thread-safe block cache shared by every file it touches.
///
/// Blocks are 4KB units of any number of files, kept in least-recently-used
/// order. A miss reads the block from its file (zero-filling past EOF); when
/// the cache is full the least recently used block is written back to its
/// file and dropped. Writes stay in memory until eviction, [`flush`], or drop.
///
/// # Thread Safety
///
/// Every single-block step (lookup, reorder, eviction, insertion and the
/// file I/O they need) runs under one cache-wide lock. The byte-range
/// [`read`] and [`write`] take that lock once per covered block, so a range
/// spanning several blocks is not atomic: a concurrent writer can interleave
/// between blocks. Callers needing range atomicity must serialise themselves.
///
/// File handles are opened lazily on first use, shared by every caller, and
/// kept open until the cache is dropped.
///
/// [`flush`]: BlockCache::flush
/// [`read`]: BlockCache::read
/// [`write`]: BlockCache::write
#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    flush_on_drop: bool,
    inner: Mutex<Inner>,
}

impl BlockCache {
    /// Create a cache holding at most `capacity` blocks.
    ///
    /// A capacity of 0 is treated as 1: a block must be resident while it is
    /// being read or written.
    ///
    /// # Examples
    ///
    /// ```
    /// use chainidx::cache::BlockCache;
    ///
    /// // 256 blocks, 1MB of block data
    /// let cache = BlockCache::new(256);
    /// assert_eq!(cache.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self::from_parts(capacity, CacheOptions::default().flush_on_drop)
    }

    /// Create a cache from validated options.
    pub fn with_options(options: &CacheOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::from_parts(options.capacity, options.flush_on_drop))
    }

    fn from_parts(capacity: usize, flush_on_drop: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            flush_on_drop,
            inner: Mutex::new(Inner {
                resident: HashMap::with_capacity(capacity),
                lru: LruList::with_capacity(capacity),
                files: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Open `path` ahead of first use with the given access mode.
    ///
    /// Registering a file that already has a handle is a no-op. Blocks of a
    /// read-only file can be read but not written.
    pub fn register_file<P: AsRef<Path>>(&self, path: P, read_only: bool) -> Result<()> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        if inner.files.contains_key(path) {
            log::debug!("File {:?} already registered", path);
            return Ok(());
        }
        let file = if read_only {
            File::open(path)?
        } else {
            open_writable(path)?
        };
        inner.files.insert(path.to_path_buf(), FileHandle { file, read_only });
        Ok(())
    }

    /// Copy block `block` of `path` into `buf`, which must be exactly one block long.
    pub fn read_block<P: AsRef<Path>>(&self, path: P, block: u64, buf: &mut [u8]) -> Result<()> {
        check_block_buffer(buf.len())?;
        check_block_number(block)?;
        self.read_in_block(&BlockId::new(path, block), 0, buf)
    }

    /// Replace block `block` of `path` with `buf`, which must be exactly one block long.
    pub fn write_block<P: AsRef<Path>>(&self, path: P, block: u64, buf: &[u8]) -> Result<()> {
        check_block_buffer(buf.len())?;
        check_block_number(block)?;
        self.write_in_block(&BlockId::new(path, block), 0, buf)
    }

    /// Copy `buf.len()` bytes starting at byte `offset` of `path` into `buf`.
    ///
    /// The range is split into the blocks covering it and each block is
    /// fetched independently. Bytes past the end of the file read as zero.
    pub fn read<P: AsRef<Path>>(&self, path: P, offset: u64, buf: &mut [u8]) -> Result<()> {
        let path = path.as_ref();
        for (block, block_offset, range) in spans(offset, buf.len())? {
            self.read_in_block(&BlockId::new(path, block), block_offset, &mut buf[range])?;
        }
        Ok(())
    }

    /// Write `buf` at byte `offset` of `path`.
    ///
    /// Blocks only partially covered by the range are read first and then
    /// patched. See the type docs for the atomicity contract.
    pub fn write<P: AsRef<Path>>(&self, path: P, offset: u64, buf: &[u8]) -> Result<()> {
        let path = path.as_ref();
        for (block, block_offset, range) in spans(offset, buf.len())? {
            self.write_in_block(&BlockId::new(path, block), block_offset, &buf[range])?;
        }
        Ok(())
    }

    /// Write every resident block back to its file and sync writable files.
    ///
    /// Blocks stay resident afterwards.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { lru, files, stats, .. } = &mut *inner;

        let mut written = 0u64;
        for block in lru.iter() {
            if persist(files, block)? {
                written += 1;
            }
        }
        for handle in files.values().filter(|h| !h.read_only) {
            handle.file.sync_all()?;
        }
        stats.writebacks += written;

        log::info!("Flushed {} cached blocks", written);
        Ok(())
    }

    /// Number of blocks `path` spans, counting resident blocks past the
    /// on-disk end of the file.
    pub fn block_count<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        let len = handle(&mut inner.files, path)?.file.metadata()?.len();
        let on_disk = len.div_ceil(BLOCK_SIZE as u64);

        let resident = inner
            .resident
            .keys()
            .filter(|id| id.file == path)
            .map(|id| id.block + 1)
            .max()
            .unwrap_or(0);

        Ok(on_disk.max(resident))
    }

    /// Whether block `block` of `path` is currently resident.
    pub fn contains<P: AsRef<Path>>(&self, path: P, block: u64) -> bool {
        self.inner.lock().resident.contains_key(&BlockId::new(path, block))
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.inner.lock().stats.reset();
    }

    /// Maximum number of resident blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check if no block is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_in_block(&self, id: &BlockId, offset: usize, dst: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = self.fetch(&mut inner, id, Fill::Load)?;
        let block = inner.lru.get(idx).ok_or_else(|| vacant(id))?;
        dst.copy_from_slice(&block.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_in_block(&self, id: &BlockId, offset: usize, src: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if handle(&mut inner.files, &id.file)?.read_only {
            return Err(Error::invalid_argument(format!(
                "cannot write to read-only file {:?}",
                id.file
            )));
        }

        let fill = if offset == 0 && src.len() == BLOCK_SIZE {
            Fill::Overwrite
        } else {
            Fill::Load
        };
        let idx = self.fetch(&mut inner, id, fill)?;
        let block = inner.lru.get_mut(idx).ok_or_else(|| vacant(id))?;
        block.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Make `id` resident and most recently used, returning its arena index.
    fn fetch(&self, inner: &mut Inner, id: &BlockId, fill: Fill) -> Result<usize> {
        inner.stats.lookups += 1;

        if let Some(&idx) = inner.resident.get(id) {
            inner.stats.hits += 1;
            inner.lru.move_to_front(idx);
            return Ok(idx);
        }
        inner.stats.misses += 1;

        let mut data = vec![0u8; BLOCK_SIZE].into_boxed_slice();
        if fill == Fill::Load {
            let handle = handle(&mut inner.files, &id.file)?;
            read_at(&mut handle.file, id.byte_offset(), &mut data)?;
        }

        if inner.lru.len() >= self.capacity {
            Self::evict_one(inner)?;
        }

        let idx = inner.lru.push_front(CachedBlock { id: id.clone(), data });
        inner.resident.insert(id.clone(), idx);
        inner.stats.insertions += 1;
        Ok(idx)
    }

    /// Write the least recently used block back and drop it.
    ///
    /// The block stays resident if the write-back fails.
    fn evict_one(inner: &mut Inner) -> Result<()> {
        let Some(tail) = inner.lru.tail() else {
            return Ok(());
        };
        let block = inner.lru.get(tail).ok_or_else(|| Error::corruption("vacant LRU tail"))?;
        if persist(&mut inner.files, block)? {
            inner.stats.writebacks += 1;
        }
        log::debug!("Evicted block {} of {:?}", block.id.block, block.id.file);

        if let Some(block) = inner.lru.remove(tail) {
            inner.resident.remove(&block.id);
        }
        inner.stats.evictions += 1;
        Ok(())
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        if self.flush_on_drop {
            if let Err(e) = self.flush() {
                log::warn!("Failed to flush block cache on drop: {}", e);
            }
        }
    }
}

/// Split the byte range `[offset, offset + len)` into per-block pieces of
/// `(block number, offset within block, range within the caller's buffer)`.
fn spans(
    offset: u64,
    len: usize,
) -> Result<impl Iterator<Item = (u64, usize, std::ops::Range<usize>)>> {
    offset
        .checked_add(len as u64)
        .ok_or_else(|| Error::invalid_argument("byte range overflows u64"))?;

    let block_size = BLOCK_SIZE as u64;
    let mut pos = 0usize;
    Ok(std::iter::from_fn(move || {
        if pos >= len {
            return None;
        }
        let abs = offset + pos as u64;
        let block_offset = (abs % block_size) as usize;
        let n = (BLOCK_SIZE - block_offset).min(len - pos);
        let piece = (abs / block_size, block_offset, pos..pos + n);
        pos += n;
        Some(piece)
    }))
}

fn check_block_number(block: u64) -> Result<()> {
    if block > BlockId::MAX_BLOCK {
        return Err(Error::invalid_argument(format!(
            "block {} lies beyond the addressable range of a file",
            block
        )));
    }
    Ok(())
}

fn check_block_buffer(len: usize) -> Result<()> {
    if len != BLOCK_SIZE {
        return Err(Error::invalid_argument(format!(
            "block buffer must be {} bytes, got {}",
            BLOCK_SIZE, len
        )));
    }
    Ok(())
}

fn vacant(id: &BlockId) -> Error {
    Error::corruption(format!("resident block {} of {:?} has no slot", id.block, id.file))
}

fn open_writable(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)
}

/// Look up the handle for `path`, opening it read-write on first use.
fn handle<'a>(
    files: &'a mut HashMap<PathBuf, FileHandle>,
    path: &Path,
) -> Result<&'a mut FileHandle> {
    if !files.contains_key(path) {
        let file = open_writable(path)?;
        files.insert(path.to_path_buf(), FileHandle { file, read_only: false });
    }
    files
        .get_mut(path)
        .ok_or_else(|| Error::corruption(format!("handle for {:?} vanished", path)))
}

/// Write a block to its file. Returns false for read-only files, whose
/// blocks can never have been modified.
fn persist(files: &mut HashMap<PathBuf, FileHandle>, block: &CachedBlock) -> Result<bool> {
    let handle = handle(files, &block.id.file)?;
    if handle.read_only {
        return Ok(false);
    }
    handle.file.seek(SeekFrom::Start(block.id.byte_offset()))?;
    handle.file.write_all(&block.data)?;
    Ok(true)
}

/// Fill `buf` from `pos`, leaving whatever lies past EOF untouched.
fn read_at(file: &mut File, pos: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
