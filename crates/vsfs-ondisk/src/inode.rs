//! Inode record.
//!
//! Fourteen little-endian u32 fields followed by a reserved area that runs to
//! the end of the record. Only the direct pointer is ever dereferenced; the
//! three indirect pointers are range-checked and otherwise carried along.

use serde::Serialize;
use std::fmt;
use vsfs_types::{BlockNumber, Geometry, INODE_FIELDS_SIZE, ParseError, read_le_u32, write_le_u32};

const OFF_MODE: usize = 0x00;
const OFF_UID: usize = 0x04;
const OFF_GID: usize = 0x08;
const OFF_SIZE: usize = 0x0C;
const OFF_ATIME: usize = 0x10;
const OFF_CTIME: usize = 0x14;
const OFF_MTIME: usize = 0x18;
const OFF_DTIME: usize = 0x1C;
const OFF_LINKS: usize = 0x20;
const OFF_DATA_BLOCKS: usize = 0x24;
const OFF_DIRECT: usize = 0x28;
const OFF_SINGLE: usize = 0x2C;
const OFF_DOUBLE: usize = 0x30;
const OFF_TRIPLE: usize = 0x34;

// Fixed contents of a reset root inode.
const ROOT_MODE: u32 = 0x1FF;
const ROOT_OWNER: u32 = 1000;
const ROOT_ATIME: u32 = 1_680_000_000;
const ROOT_CTIME: u32 = 1_670_000_000;
const ROOT_MTIME: u32 = 1_690_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: u32,
    pub user_id: u32,
    pub group_id: u32,
    pub file_size: u32,
    pub last_access_time: u32,
    pub creation_time: u32,
    pub last_modification_time: u32,
    pub deletion_time: u32,
    pub hard_links: u32,
    pub data_blocks: u32,
    pub direct: BlockNumber,
    pub single_indirect: BlockNumber,
    pub double_indirect: BlockNumber,
    pub triple_indirect: BlockNumber,
    /// Bytes after the named fields, up to the record size.
    pub reserved: Vec<u8>,
}

/// One of the four block-pointer fields of an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerSlot {
    Direct,
    SingleIndirect,
    DoubleIndirect,
    TripleIndirect,
}

impl PointerSlot {
    pub const ALL: [Self; 4] = [
        Self::Direct,
        Self::SingleIndirect,
        Self::DoubleIndirect,
        Self::TripleIndirect,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SingleIndirect => "single_indirect",
            Self::DoubleIndirect => "double_indirect",
            Self::TripleIndirect => "triple_indirect",
        }
    }
}

impl fmt::Display for PointerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Inode {
    /// Parse one inode record. `bytes` is the whole record.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < INODE_FIELDS_SIZE {
            return Err(ParseError::InsufficientData {
                needed: INODE_FIELDS_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            mode: read_le_u32(bytes, OFF_MODE)?,
            user_id: read_le_u32(bytes, OFF_UID)?,
            group_id: read_le_u32(bytes, OFF_GID)?,
            file_size: read_le_u32(bytes, OFF_SIZE)?,
            last_access_time: read_le_u32(bytes, OFF_ATIME)?,
            creation_time: read_le_u32(bytes, OFF_CTIME)?,
            last_modification_time: read_le_u32(bytes, OFF_MTIME)?,
            deletion_time: read_le_u32(bytes, OFF_DTIME)?,
            hard_links: read_le_u32(bytes, OFF_LINKS)?,
            data_blocks: read_le_u32(bytes, OFF_DATA_BLOCKS)?,
            direct: BlockNumber(read_le_u32(bytes, OFF_DIRECT)?),
            single_indirect: BlockNumber(read_le_u32(bytes, OFF_SINGLE)?),
            double_indirect: BlockNumber(read_le_u32(bytes, OFF_DOUBLE)?),
            triple_indirect: BlockNumber(read_le_u32(bytes, OFF_TRIPLE)?),
            reserved: bytes[INODE_FIELDS_SIZE..].to_vec(),
        })
    }

    /// Encode into a record of exactly `inode_size` bytes.
    ///
    /// The reserved area is truncated or zero-padded to fit.
    pub fn to_bytes(&self, inode_size: usize) -> Result<Vec<u8>, ParseError> {
        if inode_size < INODE_FIELDS_SIZE {
            return Err(ParseError::InvalidField {
                field: "inode_size",
                reason: "smaller than the inode field area",
            });
        }
        let mut out = vec![0_u8; inode_size];
        write_le_u32(&mut out, OFF_MODE, self.mode)?;
        write_le_u32(&mut out, OFF_UID, self.user_id)?;
        write_le_u32(&mut out, OFF_GID, self.group_id)?;
        write_le_u32(&mut out, OFF_SIZE, self.file_size)?;
        write_le_u32(&mut out, OFF_ATIME, self.last_access_time)?;
        write_le_u32(&mut out, OFF_CTIME, self.creation_time)?;
        write_le_u32(&mut out, OFF_MTIME, self.last_modification_time)?;
        write_le_u32(&mut out, OFF_DTIME, self.deletion_time)?;
        write_le_u32(&mut out, OFF_LINKS, self.hard_links)?;
        write_le_u32(&mut out, OFF_DATA_BLOCKS, self.data_blocks)?;
        write_le_u32(&mut out, OFF_DIRECT, self.direct.0)?;
        write_le_u32(&mut out, OFF_SINGLE, self.single_indirect.0)?;
        write_le_u32(&mut out, OFF_DOUBLE, self.double_indirect.0)?;
        write_le_u32(&mut out, OFF_TRIPLE, self.triple_indirect.0)?;

        let tail = &mut out[INODE_FIELDS_SIZE..];
        let n = tail.len().min(self.reserved.len());
        tail[..n].copy_from_slice(&self.reserved[..n]);
        Ok(out)
    }

    /// An inode with every field zero: unused, not live.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            mode: 0,
            user_id: 0,
            group_id: 0,
            file_size: 0,
            last_access_time: 0,
            creation_time: 0,
            last_modification_time: 0,
            deletion_time: 0,
            hard_links: 0,
            data_blocks: 0,
            direct: BlockNumber::NONE,
            single_indirect: BlockNumber::NONE,
            double_indirect: BlockNumber::NONE,
            triple_indirect: BlockNumber::NONE,
            reserved: Vec::new(),
        }
    }

    /// The minimal valid root inode: one block at the start of the data region.
    #[must_use]
    pub fn root(geo: &Geometry) -> Self {
        Self {
            mode: ROOT_MODE,
            user_id: ROOT_OWNER,
            group_id: ROOT_OWNER,
            file_size: geo.block_size,
            last_access_time: ROOT_ATIME,
            creation_time: ROOT_CTIME,
            last_modification_time: ROOT_MTIME,
            hard_links: 1,
            data_blocks: 1,
            direct: BlockNumber(geo.first_data_block),
            ..Self::zeroed()
        }
    }

    /// Live inodes are the only ones allowed to own bitmap bits and blocks.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.hard_links > 0 && self.deletion_time == 0
    }

    #[must_use]
    pub fn pointer(&self, slot: PointerSlot) -> BlockNumber {
        match slot {
            PointerSlot::Direct => self.direct,
            PointerSlot::SingleIndirect => self.single_indirect,
            PointerSlot::DoubleIndirect => self.double_indirect,
            PointerSlot::TripleIndirect => self.triple_indirect,
        }
    }

    pub fn set_pointer(&mut self, slot: PointerSlot, block: BlockNumber) {
        match slot {
            PointerSlot::Direct => self.direct = block,
            PointerSlot::SingleIndirect => self.single_indirect = block,
            PointerSlot::DoubleIndirect => self.double_indirect = block,
            PointerSlot::TripleIndirect => self.triple_indirect = block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Inode {
        Inode {
            mode: 0o100_644,
            user_id: 1,
            group_id: 2,
            file_size: 3,
            last_access_time: 4,
            creation_time: 5,
            last_modification_time: 6,
            deletion_time: 0,
            hard_links: 2,
            data_blocks: 1,
            direct: BlockNumber(9),
            single_indirect: BlockNumber(10),
            double_indirect: BlockNumber(11),
            triple_indirect: BlockNumber(12),
            reserved: vec![0xEE; 256 - INODE_FIELDS_SIZE],
        }
    }

    #[test]
    fn field_offsets_are_fixed() {
        let bytes = sample().to_bytes(256).unwrap();
        assert_eq!(bytes.len(), 256);
        assert_eq!(read_le_u32(&bytes, 0x00).unwrap(), 0o100_644);
        assert_eq!(read_le_u32(&bytes, 0x20).unwrap(), 2);
        assert_eq!(read_le_u32(&bytes, 0x28).unwrap(), 9);
        assert_eq!(read_le_u32(&bytes, 0x34).unwrap(), 12);
        assert_eq!(bytes[0x38], 0xEE);
        assert_eq!(bytes[255], 0xEE);
    }

    #[test]
    fn parse_keeps_reserved_area() {
        let inode = sample();
        let parsed = Inode::parse_from_bytes(&inode.to_bytes(256).unwrap()).unwrap();
        assert_eq!(parsed, inode);
    }

    #[test]
    fn reserved_area_is_fitted_to_record_size() {
        let mut inode = sample();
        inode.reserved = vec![1, 2, 3];
        let bytes = inode.to_bytes(128).unwrap();
        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[0x38..0x3C], &[1, 2, 3, 0]);

        inode.reserved = vec![7; 500];
        assert_eq!(inode.to_bytes(64).unwrap()[63], 7);
    }

    #[test]
    fn liveness_needs_links_and_no_deletion_time() {
        let mut inode = sample();
        assert!(inode.is_live());

        inode.deletion_time = 1_700_000_000;
        assert!(!inode.is_live());

        inode.deletion_time = 0;
        inode.hard_links = 0;
        assert!(!inode.is_live());

        assert!(!Inode::zeroed().is_live());
    }

    #[test]
    fn root_inode_is_live_and_points_at_first_data_block() {
        let geo = Geometry::VSFS;
        let root = Inode::root(&geo);
        assert!(root.is_live());
        assert_eq!(root.direct, BlockNumber(8));
        assert_eq!(root.file_size, 4096);
        assert_eq!(root.mode, 0x1FF);
        assert_eq!((root.user_id, root.group_id), (1000, 1000));
        assert_eq!(root.last_access_time, 1_680_000_000);
        assert_eq!(root.creation_time, 1_670_000_000);
        assert_eq!(root.last_modification_time, 1_690_000_000);
        for slot in &PointerSlot::ALL[1..] {
            assert!(root.pointer(*slot).is_none());
        }
        assert!(root.to_bytes(256).unwrap()[0x38..].iter().all(|b| *b == 0));
    }

    #[test]
    fn pointer_slots_address_each_field() {
        let mut inode = Inode::zeroed();
        for (i, slot) in PointerSlot::ALL.into_iter().enumerate() {
            inode.set_pointer(slot, BlockNumber(20 + u32::try_from(i).unwrap()));
        }
        assert_eq!(inode.direct, BlockNumber(20));
        assert_eq!(inode.single_indirect, BlockNumber(21));
        assert_eq!(inode.double_indirect, BlockNumber(22));
        assert_eq!(inode.triple_indirect, BlockNumber(23));
        assert_eq!(inode.pointer(PointerSlot::DoubleIndirect), BlockNumber(22));
        assert_eq!(PointerSlot::TripleIndirect.to_string(), "triple_indirect");
    }

    #[test]
    fn short_record_is_rejected() {
        assert!(matches!(
            Inode::parse_from_bytes(&[0_u8; 40]),
            Err(ParseError::InsufficientData { needed: 0x38, .. })
        ));
        assert!(Inode::zeroed().to_bytes(16).is_err());
    }
}
