//! Inode and data bitmap reconciliation.
//!
//! Both bitmaps are a pure function of the inode table: the inode bitmap
//! mirrors liveness, the data bitmap mirrors the set of blocks that some live
//! inode points at directly. One pass over the table computes the expected
//! bits, one pass over the bitmap fixes what disagrees.

use std::ops::Range;

use tracing::{debug, info};
use vsfs_alloc::{bitmap_assign, bitmap_get};
use vsfs_block::{BlockDevice, ByteBlockDevice, ByteDevice};
use vsfs_error::Result;
use vsfs_inode::InodeTable;
use vsfs_types::{BlockNumber, Geometry, InodeNumber};

use crate::report::{BitmapSnapshot, Finding, Stage, StageReport};

/// Which bitmap a reconciliation pass works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapRole {
    Inode,
    Data,
}

impl BitmapRole {
    #[must_use]
    pub fn stage(self) -> Stage {
        match self {
            Self::Inode => Stage::InodeBitmap,
            Self::Data => Stage::DataBitmap,
        }
    }

    /// Block holding this bitmap.
    #[must_use]
    pub fn block(self, geo: &Geometry) -> BlockNumber {
        match self {
            Self::Inode => BlockNumber(geo.inode_bitmap_block),
            Self::Data => BlockNumber(geo.data_bitmap_block),
        }
    }

    /// Bit indices the pass compares. Data bits below the first data block
    /// belong to metadata and are never touched.
    #[must_use]
    pub fn range(self, geo: &Geometry) -> Range<u32> {
        match self {
            Self::Inode => geo.inodes(),
            Self::Data => geo.data_blocks(),
        }
    }

    fn finding(self, idx: u32, used: bool) -> Finding {
        match (self, used) {
            (Self::Inode, true) => Finding::InodeBitSet {
                inode: InodeNumber(idx),
            },
            (Self::Inode, false) => Finding::InodeBitCleared {
                inode: InodeNumber(idx),
            },
            (Self::Data, true) => Finding::DataBitSet {
                block: BlockNumber(idx),
            },
            (Self::Data, false) => Finding::DataBitCleared {
                block: BlockNumber(idx),
            },
        }
    }
}

/// Expected state of every bit in `role.range(geo)`, indexed from 0.
fn expected_bits<D: ByteDevice + ?Sized>(
    dev: &D,
    geo: &Geometry,
    role: BitmapRole,
) -> Result<Vec<bool>> {
    let table = InodeTable::new(dev, *geo);
    let range = role.range(geo);
    let mut expected = vec![false; range.end as usize];

    for entry in table.iter() {
        let (ino, inode) = entry?;
        if !inode.is_live() {
            continue;
        }
        match role {
            BitmapRole::Inode => expected[ino.0 as usize] = true,
            BitmapRole::Data => {
                // Duplicates collapse to one bit here; the duplicate stage
                // splits them later.
                if geo.is_data_block(inode.direct) {
                    expected[inode.direct.0 as usize] = true;
                }
            }
        }
    }
    Ok(expected)
}

/// Make the `role` bitmap agree with the inode table.
///
/// The bitmap block is written back once, and only if a bit changed.
pub fn reconcile_bitmap<D: ByteDevice + ?Sized>(
    dev: &D,
    geo: &Geometry,
    role: BitmapRole,
) -> Result<StageReport> {
    let mut report = StageReport::new(role.stage());
    let blocks = ByteBlockDevice::new(dev, geo.block_size)?;
    let block = role.block(geo);

    let mut bitmap = blocks.read_block(block)?.into_inner();
    let expected = expected_bits(dev, geo, role)?;
    let range = role.range(geo);
    debug!(
        target: "vsfs::repair::bitmap",
        role = ?role,
        block = block.0,
        bits = range.end,
        "bitmap_scan"
    );

    for idx in range.clone() {
        let used = expected[idx as usize];
        if bitmap_assign(&mut bitmap, idx, used) {
            debug_assert_eq!(bitmap_get(&bitmap, idx), used);
            report.push(role.finding(idx, used));
        }
    }

    if !report.is_clean() {
        blocks.write_block(block, &bitmap)?;
        blocks.sync()?;
        info!(
            target: "vsfs::repair::bitmap",
            role = ?role,
            changed = report.findings.len(),
            "bitmap_rewritten"
        );
        report.bitmap = Some(BitmapSnapshot::capture(&bitmap, range.end));
    }
    Ok(report)
}
