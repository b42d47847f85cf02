//! Basic usage example for chainidx
//!
//! This example demonstrates the fundamental operations:
//! - Building a shared block cache
//! - Opening a hash index over it
//! - Recording and looking up record locations
//! - Flushing and reopening

use anyhow::Context;
use chainidx::{BlockCache, CacheOptions, HashIndex, IndexOptions, KeyMode};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let dir = std::env::temp_dir().join("chainidx_example");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).context("creating example directory")?;
    let index_file = dir.join("buyer.idx");
    let options = IndexOptions::new(&index_file, 128)
        .key_mode(KeyMode::Variable)
        .data_files([dir.join("order.0"), dir.join("order.1")]);

    {
        let cache = Arc::new(BlockCache::with_options(&CacheOptions::new().capacity(64))?);
        let index = HashIndex::open(options.clone(), cache)?;
        println!("Index opened at {:?}", index_file);

        // Pretend each data file holds 100-byte records
        println!("Recording locations...");
        for i in 0..1000u64 {
            let key = format!("buyer-{}", i);
            index.add(key.as_bytes(), (i % 2) as u32, (i / 2) * 100)?;
        }

        index.flush().context("flushing index")?;
        println!("Flushed; next overflow block {}", index.next_block());
    }

    // Reopen with a fresh cache and look a few keys up
    let cache = Arc::new(BlockCache::new(64));
    let index = HashIndex::open(options, Arc::clone(&cache))?;
    for key in ["buyer-7", "buyer-512", "buyer-4242"] {
        match index.get(key.as_bytes())? {
            Some(location) => println!("{} => {:?} @ {}", key, location.file, location.offset),
            None => println!("{} => not found", key),
        }
    }

    let stats = cache.stats();
    println!("Cache: {} lookups, hit rate {:.2}", stats.lookups, stats.hit_rate());

    Ok(())
}
