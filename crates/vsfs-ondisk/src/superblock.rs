//! Superblock record.
//!
//! Layout (little-endian, 1024 bytes at image offset 1024):
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0x00 | inode_count |
//! | 0x04 | inode_bitmap_block |
//! | 0x08 | data_bitmap_block |
//! | 0x0C | first_data_block |
//! | 0x10 | magic (u16, followed by 2 pad bytes) |
//! | 0x14 | block_size |
//! | 0x18 | total_blocks |
//! | 0x1C | inode_table_start |
//! | 0x20 | inode_size |
//!
//! Everything else is reserved and carried through unchanged.

use serde::Serialize;
use std::fmt;
use vsfs_types::{
    Geometry, ParseError, SUPERBLOCK_SIZE, VSFS_MAGIC, read_le_u16, read_le_u32, write_le_u16,
    write_le_u32,
};

const OFF_INODE_COUNT: usize = 0x00;
const OFF_INODE_BITMAP: usize = 0x04;
const OFF_DATA_BITMAP: usize = 0x08;
const OFF_FIRST_DATA: usize = 0x0C;
const OFF_MAGIC: usize = 0x10;
const OFF_BLOCK_SIZE: usize = 0x14;
const OFF_TOTAL_BLOCKS: usize = 0x18;
const OFF_INODE_TABLE: usize = 0x1C;
const OFF_INODE_SIZE: usize = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub inode_count: u32,
    pub inode_bitmap_block: u32,
    pub data_bitmap_block: u32,
    pub first_data_block: u32,
    pub magic: u16,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_table_start: u32,
    pub inode_size: u32,
    /// The full record as read, so reserved bytes survive a rewrite.
    raw: Vec<u8>,
}

/// Superblock fields that must match the compiled-in geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutField {
    InodeBitmapBlock,
    DataBitmapBlock,
    InodeTableStart,
    FirstDataBlock,
    InodeSize,
    InodeCount,
    TotalBlocks,
    BlockSize,
    Magic,
}

impl LayoutField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InodeBitmapBlock => "inode_bitmap_block",
            Self::DataBitmapBlock => "data_bitmap_block",
            Self::InodeTableStart => "inode_table_start",
            Self::FirstDataBlock => "first_data_block",
            Self::InodeSize => "inode_size",
            Self::InodeCount => "inode_count",
            Self::TotalBlocks => "total_blocks",
            Self::BlockSize => "block_size",
            Self::Magic => "magic",
        }
    }
}

impl fmt::Display for LayoutField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One superblock field that disagrees with the expected layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDeviation {
    pub field: LayoutField,
    pub found: u32,
    pub expected: u32,
}

impl Superblock {
    /// Parse a superblock from its 1024-byte region.
    ///
    /// No field is validated here: the checker needs to see a broken
    /// superblock to repair it.
    pub fn parse_from_bytes(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        Ok(Self {
            inode_count: read_le_u32(region, OFF_INODE_COUNT)?,
            inode_bitmap_block: read_le_u32(region, OFF_INODE_BITMAP)?,
            data_bitmap_block: read_le_u32(region, OFF_DATA_BITMAP)?,
            first_data_block: read_le_u32(region, OFF_FIRST_DATA)?,
            magic: read_le_u16(region, OFF_MAGIC)?,
            block_size: read_le_u32(region, OFF_BLOCK_SIZE)?,
            total_blocks: read_le_u32(region, OFF_TOTAL_BLOCKS)?,
            inode_table_start: read_le_u32(region, OFF_INODE_TABLE)?,
            inode_size: read_le_u32(region, OFF_INODE_SIZE)?,
            raw: region[..SUPERBLOCK_SIZE].to_vec(),
        })
    }

    /// A freshly laid out superblock for `geo`, reserved area zeroed.
    #[must_use]
    pub fn canonical(geo: &Geometry) -> Self {
        let mut sb = Self {
            inode_count: 0,
            inode_bitmap_block: 0,
            data_bitmap_block: 0,
            first_data_block: 0,
            magic: 0,
            block_size: 0,
            total_blocks: 0,
            inode_table_start: 0,
            inode_size: 0,
            raw: vec![0_u8; SUPERBLOCK_SIZE],
        };
        sb.canonicalize(geo);
        sb
    }

    /// Overwrite every layout field with the value `geo` prescribes.
    pub fn canonicalize(&mut self, geo: &Geometry) {
        self.inode_bitmap_block = geo.inode_bitmap_block;
        self.data_bitmap_block = geo.data_bitmap_block;
        self.inode_table_start = geo.inode_table_start;
        self.first_data_block = geo.first_data_block;
        self.inode_size = geo.inode_size;
        self.inode_count = geo.inode_count();
        self.total_blocks = geo.total_blocks;
        self.block_size = geo.block_size;
        self.magic = VSFS_MAGIC;
    }

    /// Fields that differ from the layout `geo` prescribes, in check order.
    #[must_use]
    pub fn deviations(&self, geo: &Geometry) -> Vec<FieldDeviation> {
        let checks = [
            (
                LayoutField::InodeBitmapBlock,
                self.inode_bitmap_block,
                geo.inode_bitmap_block,
            ),
            (
                LayoutField::DataBitmapBlock,
                self.data_bitmap_block,
                geo.data_bitmap_block,
            ),
            (
                LayoutField::InodeTableStart,
                self.inode_table_start,
                geo.inode_table_start,
            ),
            (
                LayoutField::FirstDataBlock,
                self.first_data_block,
                geo.first_data_block,
            ),
            (LayoutField::InodeSize, self.inode_size, geo.inode_size),
            (LayoutField::InodeCount, self.inode_count, geo.inode_count()),
            (LayoutField::TotalBlocks, self.total_blocks, geo.total_blocks),
            (LayoutField::BlockSize, self.block_size, geo.block_size),
            (
                LayoutField::Magic,
                u32::from(self.magic),
                u32::from(VSFS_MAGIC),
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, found, expected)| found != expected)
            .map(|(field, found, expected)| FieldDeviation {
                field,
                found,
                expected,
            })
            .collect()
    }

    /// Encode back into a 1024-byte region.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = self.raw.clone();
        out.resize(SUPERBLOCK_SIZE, 0);
        write_le_u32(&mut out, OFF_INODE_COUNT, self.inode_count)?;
        write_le_u32(&mut out, OFF_INODE_BITMAP, self.inode_bitmap_block)?;
        write_le_u32(&mut out, OFF_DATA_BITMAP, self.data_bitmap_block)?;
        write_le_u32(&mut out, OFF_FIRST_DATA, self.first_data_block)?;
        write_le_u16(&mut out, OFF_MAGIC, self.magic)?;
        write_le_u32(&mut out, OFF_BLOCK_SIZE, self.block_size)?;
        write_le_u32(&mut out, OFF_TOTAL_BLOCKS, self.total_blocks)?;
        write_le_u32(&mut out, OFF_INODE_TABLE, self.inode_table_start)?;
        write_le_u32(&mut out, OFF_INODE_SIZE, self.inode_size)?;
        Ok(out)
    }
}
