//! Bucket layout inside an index block.
//!
//! Format:
//! ```text
//! [next: u32]        // Block number of the overflow bucket, 0 = end of chain
//! [used: u32]        // Offset of the first free byte, at least 8
//! [Entry 1]
//! ...
//! [Entry N]          // Entries fill bytes [8, used)
//! [free space]
//! ```
//!
//! Each entry, fixed-size keys:
//! ```text
//! [key: key_size bytes][file_id: u32][offset: u64]
//! ```
//!
//! Each entry, variable-size keys:
//! ```text
//! [key_len: u16][key: key_len bytes][file_id: u32][offset: u64]
//! ```
//!
//! All integers are little-endian.

use crate::cache::BLOCK_SIZE;
use crate::codec;
use crate::config::KeyMode;
use crate::error::{Error, Result};

/// Size of the bucket header (next pointer + used size).
pub const BUCKET_HEADER_SIZE: usize = 8;

/// Size of the fields following the key in every entry (file id + offset).
pub const ENTRY_TRAILER_SIZE: usize = 12;

const LEN_PREFIX_SIZE: usize = 2;

/// Largest key accepted in variable mode: one entry must fit an empty bucket.
pub const MAX_VARIABLE_KEY_SIZE: usize =
    BLOCK_SIZE - BUCKET_HEADER_SIZE - LEN_PREFIX_SIZE - ENTRY_TRAILER_SIZE;

/// An entry decoded in place from a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryRef<'a> {
    pub key: &'a [u8],
    pub file_id: u32,
    pub offset: u64,
}

impl KeyMode {
    /// Bytes one entry for a key of `key_len` bytes occupies.
    pub(crate) fn entry_size(&self, key_len: usize) -> usize {
        match self {
            KeyMode::Fixed(size) => size + ENTRY_TRAILER_SIZE,
            KeyMode::Variable => LEN_PREFIX_SIZE + key_len + ENTRY_TRAILER_SIZE,
        }
    }
}

/// One index block viewed as a bucket.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    number: u32,
    data: Vec<u8>,
}

impl Bucket {
    /// A freshly allocated, empty bucket.
    pub(crate) fn empty(number: u32) -> Self {
        let mut data = vec![0u8; BLOCK_SIZE];
        codec::put_u32(&mut data, 4, BUCKET_HEADER_SIZE as u32);
        Self { number, data }
    }

    /// Interpret a block read from the index file.
    ///
    /// A never-written block has `used == 0` and is treated as empty.
    pub(crate) fn from_block(number: u32, mut data: Vec<u8>) -> Result<Self> {
        debug_assert_eq!(data.len(), BLOCK_SIZE);

        let used = codec::get_u32(&data, 4) as usize;
        if used == 0 {
            codec::put_u32(&mut data, 4, BUCKET_HEADER_SIZE as u32);
        } else if !(BUCKET_HEADER_SIZE..=BLOCK_SIZE).contains(&used) {
            return Err(Error::corruption(format!(
                "bucket {} used size {} outside [{}, {}]",
                number, used, BUCKET_HEADER_SIZE, BLOCK_SIZE
            )));
        }
        Ok(Self { number, data })
    }

    pub(crate) fn number(&self) -> u32 {
        self.number
    }

    /// Overflow bucket number, 0 at the end of the chain.
    pub(crate) fn next(&self) -> u32 {
        codec::get_u32(&self.data, 0)
    }

    pub(crate) fn set_next(&mut self, next: u32) {
        codec::put_u32(&mut self.data, 0, next);
    }

    pub(crate) fn used(&self) -> usize {
        codec::get_u32(&self.data, 4) as usize
    }

    pub(crate) fn fits(&self, entry_size: usize) -> bool {
        self.used() + entry_size <= BLOCK_SIZE
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Append an entry at the end of the used region.
    ///
    /// The caller has checked [`fits`](Self::fits) and normalised the key to
    /// the layout's key size.
    pub(crate) fn append(&mut self, mode: KeyMode, key: &[u8], file_id: u32, offset: u64) {
        let mut pos = self.used();
        debug_assert!(self.fits(mode.entry_size(key.len())));

        if mode == KeyMode::Variable {
            codec::put_u16(&mut self.data, pos, key.len() as u16);
            pos += LEN_PREFIX_SIZE;
        }
        self.data[pos..pos + key.len()].copy_from_slice(key);
        pos += key.len();
        codec::put_u32(&mut self.data, pos, file_id);
        pos += 4;
        codec::put_u64(&mut self.data, pos, offset);
        pos += 8;

        codec::put_u32(&mut self.data, 4, pos as u32);
    }

    /// Iterate entries in append order, never reading past `used`.
    pub(crate) fn entries(&self, mode: KeyMode) -> Entries<'_> {
        Entries { bucket: self, mode, pos: BUCKET_HEADER_SIZE }
    }
}

/// Iterator over the entries of a [`Bucket`].
pub(crate) struct Entries<'a> {
    bucket: &'a Bucket,
    mode: KeyMode,
    pos: usize,
}

impl<'a> Entries<'a> {
    fn truncated(&self) -> Error {
        Error::corruption(format!(
            "bucket {} entry at {} crosses used size {}",
            self.bucket.number,
            self.pos,
            self.bucket.used()
        ))
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<EntryRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let bucket: &'a Bucket = self.bucket;
        let data = bucket.as_bytes();
        let used = bucket.used();
        if self.pos >= used {
            return None;
        }

        let (key_start, key_len) = match self.mode {
            KeyMode::Fixed(size) => (self.pos, size),
            KeyMode::Variable => {
                if self.pos + LEN_PREFIX_SIZE > used {
                    let err = self.truncated();
                    self.pos = used;
                    return Some(Err(err));
                }
                (self.pos + LEN_PREFIX_SIZE, codec::get_u16(data, self.pos) as usize)
            }
        };

        let end = key_start + key_len + ENTRY_TRAILER_SIZE;
        if end > used {
            let err = self.truncated();
            self.pos = used;
            return Some(Err(err));
        }

        let key_end = key_start + key_len;
        let entry = EntryRef {
            key: &data[key_start..key_end],
            file_id: codec::get_u32(data, key_end),
            offset: codec::get_u64(data, key_end + 4),
        };
        self.pos = end;
        Some(Ok(entry))
    }
}
