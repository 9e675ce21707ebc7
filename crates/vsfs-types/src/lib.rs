#![forbid(unsafe_code)]
//! Shared vocabulary for the VSFS image format.
//!
//! Holds the compiled-in geometry constants, the immutable [`Geometry`] value
//! every checker stage receives, block/inode newtypes, and the little-endian
//! byte helpers used by the on-disk codecs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

pub const VSFS_MAGIC: u16 = 0xD34D;

pub const BLOCK_SIZE: u32 = 4096;
pub const TOTAL_BLOCKS: u32 = 64;
pub const INODE_SIZE: u32 = 256;

pub const INODE_BITMAP_BLOCK: u32 = 1;
pub const DATA_BITMAP_BLOCK: u32 = 2;
pub const INODE_TABLE_START: u32 = 3;
pub const FIRST_DATA_BLOCK: u32 = 8;

/// Byte offset of the superblock record inside block 0.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Length of the superblock record.
pub const SUPERBLOCK_SIZE: usize = 1024;

/// Byte offset of the duplicate magic number at the very start of the image.
pub const MAGIC_OFFSET: u64 = 0;

/// Bytes of an inode record that carry named fields. The rest is reserved.
pub const INODE_FIELDS_SIZE: usize = 0x38;

/// Data-block index (also used for metadata blocks).
///
/// Pointer value 0 means "no block".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(pub u32);

impl BlockNumber {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// 0-based index into the inode table. Inode 0 is the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InodeNumber(pub u32);

impl InodeNumber {
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Geometry ────────────────────────────────────────────────────────────────

/// Layout of a VSFS image.
///
/// One value is built up front and passed by copy to every stage. The
/// superblock on disk is compared against it, never the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_size: u32,
    pub inode_bitmap_block: u32,
    pub data_bitmap_block: u32,
    pub inode_table_start: u32,
    pub first_data_block: u32,
}

impl Geometry {
    /// The geometry every VSFS image is checked against.
    pub const VSFS: Self = Self {
        block_size: BLOCK_SIZE,
        total_blocks: TOTAL_BLOCKS,
        inode_size: INODE_SIZE,
        inode_bitmap_block: INODE_BITMAP_BLOCK,
        data_bitmap_block: DATA_BITMAP_BLOCK,
        inode_table_start: INODE_TABLE_START,
        first_data_block: FIRST_DATA_BLOCK,
    };

    /// Build and validate a custom geometry.
    pub fn new(
        block_size: u32,
        total_blocks: u32,
        inode_size: u32,
        inode_bitmap_block: u32,
        data_bitmap_block: u32,
        inode_table_start: u32,
        first_data_block: u32,
    ) -> Result<Self, ParseError> {
        let geo = Self {
            block_size,
            total_blocks,
            inode_size,
            inode_bitmap_block,
            data_bitmap_block,
            inode_table_start,
            first_data_block,
        };
        geo.validate()?;
        Ok(geo)
    }

    fn validate(&self) -> Result<(), ParseError> {
        let superblock_end = SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE as u64;
        if !self.block_size.is_power_of_two() || u64::from(self.block_size) < superblock_end {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be a power of two holding the superblock in block 0",
            });
        }
        if (self.inode_size as usize) < INODE_FIELDS_SIZE
            || self.block_size % self.inode_size != 0
        {
            return Err(ParseError::InvalidField {
                field: "inode_size",
                reason: "must divide block_size and hold the inode fields",
            });
        }
        if !(0 < self.inode_bitmap_block
            && self.inode_bitmap_block < self.inode_table_start
            && self.data_bitmap_block < self.inode_table_start
            && self.inode_bitmap_block != self.data_bitmap_block
            && self.data_bitmap_block > 0)
        {
            return Err(ParseError::InvalidField {
                field: "bitmap_blocks",
                reason: "bitmaps must be distinct blocks between block 0 and the inode table",
            });
        }
        if !(self.inode_table_start < self.first_data_block
            && self.first_data_block < self.total_blocks)
        {
            return Err(ParseError::InvalidField {
                field: "first_data_block",
                reason: "must follow the inode table and precede total_blocks",
            });
        }
        let bits = u64::from(self.block_size) * 8;
        if u64::from(self.total_blocks) > bits || u64::from(self.inode_count()) > bits {
            return Err(ParseError::InvalidField {
                field: "total_blocks",
                reason: "bitmap block too small to cover every block and inode",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn inodes_per_block(&self) -> u32 {
        self.block_size / self.inode_size
    }

    #[must_use]
    pub fn inode_table_blocks(&self) -> u32 {
        self.first_data_block - self.inode_table_start
    }

    #[must_use]
    pub fn inode_count(&self) -> u32 {
        self.inode_table_blocks() * self.inodes_per_block()
    }

    /// Exact length the backing image must have.
    #[must_use]
    pub fn image_len(&self) -> u64 {
        u64::from(self.total_blocks) * u64::from(self.block_size)
    }

    #[must_use]
    pub fn block_offset(&self, block: BlockNumber) -> u64 {
        u64::from(block.0) * u64::from(self.block_size)
    }

    #[must_use]
    pub fn inode_offset(&self, ino: InodeNumber) -> u64 {
        self.block_offset(BlockNumber(self.inode_table_start))
            + u64::from(ino.0) * u64::from(self.inode_size)
    }

    /// Indices a data-block pointer may legally take.
    #[must_use]
    pub fn data_blocks(&self) -> Range<u32> {
        self.first_data_block..self.total_blocks
    }

    #[must_use]
    pub fn inodes(&self) -> Range<u32> {
        0..self.inode_count()
    }

    #[must_use]
    pub fn is_data_block(&self, block: BlockNumber) -> bool {
        self.data_blocks().contains(&block.0)
    }

    /// Non-zero pointer outside the data region.
    #[must_use]
    pub fn is_bad_pointer(&self, block: BlockNumber) -> bool {
        !block.is_none() && !self.is_data_block(block)
    }

    #[must_use]
    pub fn block_size_usize(&self) -> usize {
        self.block_size as usize
    }

    #[must_use]
    pub fn inode_size_usize(&self) -> usize {
        self.inode_size as usize
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::VSFS
    }
}

// ── Byte helpers ────────────────────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
fn ensure_slice_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8], ParseError> {
    let actual = data.len().saturating_sub(offset);
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&mut data[offset..end]),
        Some(_) => Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual,
        }),
        None => Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        }),
    }
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn write_le_u16(data: &mut [u8], offset: usize, value: u16) -> Result<(), ParseError> {
    ensure_slice_mut(data, offset, 2)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[inline]
pub fn write_le_u32(data: &mut [u8], offset: usize, value: u32) -> Result<(), ParseError> {
    ensure_slice_mut(data, offset, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsfs_geometry_derived_values() {
        let geo = Geometry::VSFS;
        assert_eq!(geo.inodes_per_block(), 16);
        assert_eq!(geo.inode_table_blocks(), 5);
        assert_eq!(geo.inode_count(), 80);
        assert_eq!(geo.image_len(), 64 * 4096);
        assert_eq!(geo.inode_offset(InodeNumber(0)), 3 * 4096);
        assert_eq!(geo.inode_offset(InodeNumber(17)), 3 * 4096 + 17 * 256);
        assert_eq!(Geometry::default(), geo);
    }

    #[test]
    fn vsfs_geometry_passes_validation() {
        let geo = Geometry::VSFS;
        let rebuilt = Geometry::new(
            geo.block_size,
            geo.total_blocks,
            geo.inode_size,
            geo.inode_bitmap_block,
            geo.data_bitmap_block,
            geo.inode_table_start,
            geo.first_data_block,
        )
        .unwrap();
        assert_eq!(rebuilt, geo);
    }

    #[test]
    fn pointer_range_checks() {
        let geo = Geometry::VSFS;
        assert!(!geo.is_data_block(BlockNumber(7)));
        assert!(geo.is_data_block(BlockNumber(8)));
        assert!(geo.is_data_block(BlockNumber(63)));
        assert!(!geo.is_data_block(BlockNumber(64)));

        assert!(!geo.is_bad_pointer(BlockNumber::NONE));
        assert!(geo.is_bad_pointer(BlockNumber(3)));
        assert!(geo.is_bad_pointer(BlockNumber(69)));
        assert!(!geo.is_bad_pointer(BlockNumber(10)));
    }

    #[test]
    fn geometry_rejects_bad_layouts() {
        let err = Geometry::new(3000, 64, 256, 1, 2, 3, 8).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "block_size",
                ..
            }
        ));

        let err = Geometry::new(4096, 64, 48, 1, 2, 3, 8).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "inode_size",
                ..
            }
        ));

        let err = Geometry::new(4096, 64, 256, 1, 1, 3, 8).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "bitmap_blocks",
                ..
            }
        ));

        let err = Geometry::new(4096, 8, 256, 1, 2, 3, 8).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "first_data_block",
                ..
            }
        ));

        // 2048-byte bitmaps cover 16384 bits; ask for more blocks than that.
        let err = Geometry::new(2048, 20_000, 128, 1, 2, 3, 8).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "total_blocks",
                ..
            }
        ));
    }

    #[test]
    fn le_helpers_read_back_what_they_write() {
        let mut buf = [0_u8; 8];
        write_le_u32(&mut buf, 2, 0xDEAD_BEEF).unwrap();
        write_le_u16(&mut buf, 6, 0xD34D).unwrap();
        assert_eq!(buf, [0, 0, 0xEF, 0xBE, 0xAD, 0xDE, 0x4D, 0xD3]);
        assert_eq!(read_le_u32(&buf, 2).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_le_u16(&buf, 6).unwrap(), VSFS_MAGIC);
    }

    #[test]
    fn le_helpers_report_short_buffers() {
        let mut buf = [0_u8; 3];
        assert_eq!(
            read_le_u32(&buf, 0).unwrap_err(),
            ParseError::InsufficientData {
                needed: 4,
                offset: 0,
                actual: 3
            }
        );
        assert!(write_le_u16(&mut buf, 2, 1).is_err());
        assert!(read_le_u16(&buf, usize::MAX).is_err());
    }

    #[test]
    fn newtype_display() {
        assert_eq!(BlockNumber(42).to_string(), "42");
        assert_eq!(InodeNumber::ROOT.to_string(), "0");
        assert!(BlockNumber::NONE.is_none());
    }
}
