// Block Cache Tests for chainidx
// These tests verify range composition, LRU eviction and write-back persistence

use chainidx::cache::{BlockCache, BLOCK_SIZE};
use chainidx::{CacheOptions, Error};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Test range round trip within a single block
#[test]
fn test_range_within_one_block() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    let cache = BlockCache::new(4);

    let data = pattern(100, 1);
    cache.write(&path, 1000, &data).unwrap();

    let mut out = vec![0u8; 100];
    cache.read(&path, 1000, &mut out).unwrap();
    assert_eq!(out, data);
}

/// Test range round trip across one block boundary
#[test]
fn test_range_across_one_boundary() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    let cache = BlockCache::new(4);

    let data = pattern(20, 2);
    cache.write(&path, 4090, &data).unwrap();

    let mut out = vec![0u8; 20];
    cache.read(&path, 4090, &mut out).unwrap();
    assert_eq!(out, data);

    // Bytes around the range are still zero
    let mut around = vec![0xFFu8; 30];
    cache.read(&path, 4085, &mut around).unwrap();
    assert_eq!(&around[..5], &[0u8; 5]);
    assert_eq!(&around[5..25], data.as_slice());
    assert_eq!(&around[25..], &[0u8; 5]);
}

/// Test range round trip spanning interior blocks
#[test]
fn test_range_across_many_boundaries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    // Smaller than the range, so the write evicts its own head blocks
    let cache = BlockCache::new(2);

    let data = pattern(3 * BLOCK_SIZE + 500, 3);
    cache.write(&path, 4000, &data).unwrap();

    let mut out = vec![0u8; data.len()];
    cache.read(&path, 4000, &mut out).unwrap();
    assert_eq!(out, data);
}

/// Test that partial writes preserve the rest of the block
#[test]
fn test_partial_write_is_read_modify_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    std::fs::write(&path, vec![0x11u8; BLOCK_SIZE]).unwrap();

    let cache = BlockCache::new(4);
    cache.write(&path, 100, b"patch").unwrap();

    let mut block = vec![0u8; BLOCK_SIZE];
    cache.read_block(&path, 0, &mut block).unwrap();
    assert_eq!(&block[100..105], b"patch");
    assert!(block[..100].iter().all(|&b| b == 0x11));
    assert!(block[105..].iter().all(|&b| b == 0x11));
}

/// Test that touching N+1 blocks evicts exactly the first
#[test]
fn test_lru_evicts_exactly_oldest() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    let n = 8;
    let cache = BlockCache::new(n);

    for b in 0..=n as u64 {
        cache.write_block(&path, b, &vec![b as u8 + 1; BLOCK_SIZE]).unwrap();
    }

    assert_eq!(cache.len(), n);
    assert!(!cache.contains(&path, 0));
    for b in 1..=n as u64 {
        assert!(cache.contains(&path, b), "block {} should be resident", b);
    }

    // Block 0 comes back with the content written before eviction
    let mut out = vec![0u8; BLOCK_SIZE];
    cache.read_block(&path, 0, &mut out).unwrap();
    assert_eq!(out, vec![1u8; BLOCK_SIZE]);

    // Which in turn evicted block 1
    assert!(!cache.contains(&path, 1));
    cache.read_block(&path, 1, &mut out).unwrap();
    assert_eq!(out, vec![2u8; BLOCK_SIZE]);
}

/// Test that one cache serves several files with one budget
#[test]
fn test_blocks_of_many_files_share_capacity() {
    let dir = TempDir::new().unwrap();
    let cache = BlockCache::new(3);
    let files: Vec<_> = (0..5).map(|i| dir.path().join(format!("f{}", i))).collect();

    for (i, f) in files.iter().enumerate() {
        cache.write(f, 0, format!("file-{}", i).as_bytes()).unwrap();
    }
    assert_eq!(cache.len(), 3);

    for (i, f) in files.iter().enumerate() {
        let expected = format!("file-{}", i);
        let mut out = vec![0u8; expected.len()];
        cache.read(f, 0, &mut out).unwrap();
        assert_eq!(out, expected.as_bytes());
    }
}

/// Test that data written through one cache is visible to a fresh one after flush
#[test]
fn test_flush_then_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    let data = pattern(10_000, 4);

    {
        let opts = CacheOptions::new().capacity(64).flush_on_drop(false);
        let cache = BlockCache::with_options(&opts).unwrap();
        cache.write(&path, 123, &data).unwrap();
        cache.flush().unwrap();
    }

    let cache = BlockCache::new(1);
    let mut out = vec![0u8; data.len()];
    cache.read(&path, 123, &mut out).unwrap();
    assert_eq!(out, data);
}

/// Test that zero-length ranges do nothing
#[test]
fn test_empty_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data");
    let cache = BlockCache::new(2);

    cache.write(&path, 1 << 40, &[]).unwrap();
    cache.read(&path, 1 << 40, &mut []).unwrap();
    assert!(cache.is_empty());
}

/// Test that invalid cache options are rejected
#[test]
fn test_invalid_options() {
    let opts = CacheOptions::new().capacity(0);
    assert!(matches!(BlockCache::with_options(&opts), Err(Error::InvalidArgument(_))));
}

/// Test that opening a directory as a block file fails with an I/O error
#[test]
fn test_io_error_propagates() {
    let dir = TempDir::new().unwrap();
    let cache = BlockCache::new(2);
    let mut out = vec![0u8; 16];

    let err = cache.read(dir.path(), 0, &mut out).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

/// Test concurrent single-block access on a shared cache
#[test]
fn test_concurrent_disjoint_ranges() {
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("data"));
    let cache = Arc::new(BlockCache::new(4));
    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));
    let mut handles = vec![];

    for t in 0..num_threads {
        let cache = Arc::clone(&cache);
        let path = Arc::clone(&path);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            // Each thread owns a 1000-byte slot straddling block boundaries
            let offset = 3000 + t as u64 * 1000;
            let data = pattern(1000, t as u8);
            for _ in 0..20 {
                cache.write(path.as_path(), offset, &data).unwrap();
                let mut out = vec![0u8; 1000];
                cache.read(path.as_path(), offset, &mut out).unwrap();
                assert_eq!(out, data, "thread {} read back a torn slot", t);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cache.len() <= cache.capacity());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any range written to a fresh file reads back unchanged, even with a
    /// cache too small to hold it.
    #[test]
    fn prop_range_write_read(
        offset in 0u64..(3 * BLOCK_SIZE as u64),
        data in proptest::collection::vec(any::<u8>(), 1..(3 * BLOCK_SIZE + 10)),
        capacity in 1usize..4,
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let cache = BlockCache::new(capacity);

        cache.write(&path, offset, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        cache.read(&path, offset, &mut out).unwrap();
        prop_assert_eq!(out, data);
    }
}
