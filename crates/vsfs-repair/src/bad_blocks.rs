//! Out-of-range block pointer repair.

use tracing::info;
use vsfs_block::ByteDevice;
use vsfs_error::Result;
use vsfs_inode::InodeTable;
use vsfs_ondisk::PointerSlot;
use vsfs_types::{BlockNumber, Geometry};

use crate::report::{Finding, Stage, StageReport};

/// Zero every pointer of a live inode that falls outside the data region.
///
/// All four pointer slots are range-checked, indirect ones included. An
/// inode with several bad pointers is rewritten once with all of them
/// cleared. Dead inodes are skipped.
pub fn repair_bad_blocks<D: ByteDevice + ?Sized>(dev: &D, geo: &Geometry) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::BadBlocks);
    let table = InodeTable::new(dev, *geo);

    for entry in table.iter() {
        let (ino, mut inode) = entry?;
        if !inode.is_live() {
            continue;
        }

        let mut dirty = false;
        for slot in PointerSlot::ALL {
            let block = inode.pointer(slot);
            if geo.is_bad_pointer(block) {
                inode.set_pointer(slot, BlockNumber::NONE);
                info!(
                    target: "vsfs::repair::bad_blocks",
                    ino = ino.0,
                    slot = slot.as_str(),
                    block = block.0,
                    "bad_pointer_cleared"
                );
                report.push(Finding::BadPointerCleared {
                    inode: ino,
                    slot,
                    block,
                });
                dirty = true;
            }
        }
        if dirty {
            table.write(ino, &inode)?;
        }
    }
    Ok(report)
}
