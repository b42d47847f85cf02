//! Fixed-width little-endian field encoding.
//!
//! Every on-disk integer in the index is stored little-endian at a known byte
//! offset inside a block. Each function touches exactly the width of its type;
//! the caller guarantees `offset + width <= buf.len()`.

use bytes::{Buf, BufMut};

/// Reads a 16-bit field at `offset`.
#[inline]
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    (&buf[offset..offset + 2]).get_u16_le()
}

/// Writes a 16-bit field at `offset`.
#[inline]
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    (&mut buf[offset..offset + 2]).put_u16_le(value);
}

/// Reads a 32-bit field at `offset`.
#[inline]
pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    (&buf[offset..offset + 4]).get_u32_le()
}

/// Writes a 32-bit field at `offset`.
#[inline]
pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    (&mut buf[offset..offset + 4]).put_u32_le(value);
}

/// Reads a 64-bit field at `offset`.
#[inline]
pub fn get_u64(buf: &[u8], offset: usize) -> u64 {
    (&buf[offset..offset + 8]).get_u64_le()
}

/// Writes a 64-bit field at `offset`.
#[inline]
pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    (&mut buf[offset..offset + 8]).put_u64_le(value);
}
