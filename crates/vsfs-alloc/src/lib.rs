#![forbid(unsafe_code)]
//! Allocation bitmap helpers.
//!
//! A bitmap is one block of bytes; bit `i` lives in byte `i / 8` at position
//! `7 - i % 8`, so the first entry is the most significant bit of byte 0.
//! Indices past the end of the buffer read as clear and ignore writes.

use std::fmt::Write;

#[inline]
fn locate(idx: u32) -> (usize, u8) {
    ((idx / 8) as usize, 0x80 >> (idx % 8))
}

/// Get bit `idx` from a bitmap byte slice.
#[must_use]
pub fn bitmap_get(bitmap: &[u8], idx: u32) -> bool {
    let (byte_idx, mask) = locate(idx);
    bitmap.get(byte_idx).is_some_and(|byte| byte & mask != 0)
}

/// Set bit `idx` in a bitmap byte slice.
pub fn bitmap_set(bitmap: &mut [u8], idx: u32) {
    let (byte_idx, mask) = locate(idx);
    if let Some(byte) = bitmap.get_mut(byte_idx) {
        *byte |= mask;
    }
}

/// Clear bit `idx` in a bitmap byte slice.
pub fn bitmap_clear(bitmap: &mut [u8], idx: u32) {
    let (byte_idx, mask) = locate(idx);
    if let Some(byte) = bitmap.get_mut(byte_idx) {
        *byte &= !mask;
    }
}

/// Force bit `idx` to `used`. Returns true when the bit changed.
pub fn bitmap_assign(bitmap: &mut [u8], idx: u32, used: bool) -> bool {
    if bitmap_get(bitmap, idx) == used {
        return false;
    }
    if used {
        bitmap_set(bitmap, idx);
    } else {
        bitmap_clear(bitmap, idx);
    }
    true
}

/// Find the lowest clear bit in `start..end`.
#[must_use]
pub fn bitmap_find_free(bitmap: &[u8], start: u32, end: u32) -> Option<u32> {
    (start..end).find(|&idx| !bitmap_get(bitmap, idx))
}

/// Count set bits in `start..end`.
#[must_use]
pub fn bitmap_count_used(bitmap: &[u8], start: u32, end: u32) -> u32 {
    let mut used = 0;
    for idx in start..end {
        if bitmap_get(bitmap, idx) {
            used += 1;
        }
    }
    used
}

/// Bytes needed to hold `bits` bits.
#[must_use]
pub fn bitmap_bytes(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

/// Render the first `bits` bits, eight per group, MSB first.
///
/// Whole bytes are printed, so a trailing partial byte shows all eight bits.
#[must_use]
pub fn format_bitmap(bitmap: &[u8], bits: u32) -> String {
    let len = bitmap_bytes(bits).min(bitmap.len());
    let mut out = String::with_capacity(len * 9);
    for (i, byte) in bitmap[..len].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:08b}");
    }
    out
}
