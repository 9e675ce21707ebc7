//! Duplicate data-block repair.
//!
//! A data block may be the direct pointer of at most one live inode. Inodes
//! are visited in index order; the first claimant of a shared block keeps it
//! and every later claimant is moved to a free block.

use tracing::{debug, info, warn};
use vsfs_alloc::{bitmap_find_free, bitmap_set};
use vsfs_block::{BlockDevice, ByteBlockDevice, ByteDevice};
use vsfs_error::Result;
use vsfs_inode::InodeTable;
use vsfs_types::{BlockNumber, Geometry};

use crate::report::{BitmapSnapshot, Finding, Stage, StageReport};

/// Lowest data block that is clear in the bitmap and not claimed by any live
/// inode. The second condition matters when the bitmap has not been
/// reconciled yet.
fn find_free_block(bitmap: &[u8], counts: &[u32], geo: &Geometry) -> Option<BlockNumber> {
    let mut start = geo.first_data_block;
    while let Some(b) = bitmap_find_free(bitmap, start, geo.total_blocks) {
        if counts[b as usize] == 0 {
            return Some(BlockNumber(b));
        }
        start = b + 1;
    }
    None
}

/// Give every live inode sharing a direct block a block of its own.
///
/// Each moved inode is flushed immediately; the data bitmap is written once at
/// the end. When no free block is left the inode keeps its shared pointer and
/// a warning finding is recorded.
pub fn repair_duplicate_blocks<D: ByteDevice + ?Sized>(
    dev: &D,
    geo: &Geometry,
) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::DuplicateBlocks);
    let blocks = ByteBlockDevice::new(dev, geo.block_size)?;
    let bitmap_block = BlockNumber(geo.data_bitmap_block);
    let mut bitmap = blocks.read_block(bitmap_block)?.into_inner();
    let table = InodeTable::new(dev, *geo);

    let mut counts = vec![0_u32; geo.total_blocks as usize];
    for entry in table.iter() {
        let (_, inode) = entry?;
        if inode.is_live() && geo.is_data_block(inode.direct) {
            counts[inode.direct.0 as usize] += 1;
        }
    }
    let shared = counts.iter().filter(|c| **c > 1).count();
    debug!(target: "vsfs::repair::duplicates", shared, "reference_counts");
    if shared == 0 {
        return Ok(report);
    }

    let mut kept = vec![false; counts.len()];
    let mut moved = false;
    for entry in table.iter() {
        let (ino, mut inode) = entry?;
        if !inode.is_live() || !geo.is_data_block(inode.direct) {
            continue;
        }
        let old = inode.direct;
        if !kept[old.0 as usize] {
            kept[old.0 as usize] = true;
            continue;
        }
        if counts[old.0 as usize] <= 1 {
            continue;
        }

        let Some(new) = find_free_block(&bitmap, &counts, geo) else {
            warn!(
                target: "vsfs::repair::duplicates",
                ino = ino.0,
                block = old.0,
                "no_free_block"
            );
            report.push(Finding::DuplicateUnrepairable {
                inode: ino,
                block: old,
            });
            continue;
        };

        inode.direct = new;
        bitmap_set(&mut bitmap, new.0);
        counts[old.0 as usize] -= 1;
        counts[new.0 as usize] += 1;
        kept[new.0 as usize] = true;
        table.write(ino, &inode)?;
        moved = true;
        info!(
            target: "vsfs::repair::duplicates",
            ino = ino.0,
            from = old.0,
            to = new.0,
            "duplicate_reallocated"
        );
        report.push(Finding::DuplicateReallocated {
            inode: ino,
            from: old,
            to: new,
        });
    }

    if moved {
        blocks.write_block(bitmap_block, &bitmap)?;
        blocks.sync()?;
        report.bitmap = Some(BitmapSnapshot::capture(&bitmap, geo.total_blocks));
    }
    Ok(report)
}
