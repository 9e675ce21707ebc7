//! Root inode repair.

use tracing::info;
use vsfs_block::ByteDevice;
use vsfs_error::Result;
use vsfs_inode::InodeTable;
use vsfs_ondisk::Inode;
use vsfs_types::{Geometry, InodeNumber};

use crate::report::{Finding, Stage, StageReport};

/// Reset inode 0 to the canonical root if it is not live.
///
/// Prior contents are discarded, including reserved bytes. A live root is
/// left alone even if its other fields look odd.
pub fn repair_root_inode<D: ByteDevice + ?Sized>(dev: &D, geo: &Geometry) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::RootInode);
    let table = InodeTable::new(dev, *geo);

    let current = table.read(InodeNumber::ROOT)?;
    if current.is_live() {
        return Ok(report);
    }

    table.write(InodeNumber::ROOT, &Inode::root(geo))?;
    info!(
        target: "vsfs::repair::root",
        hard_links = current.hard_links,
        deletion_time = current.deletion_time,
        "root_inode_reset"
    );
    report.push(Finding::RootInodeReset {
        hard_links: current.hard_links,
        deletion_time: current.deletion_time,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{formatted, get_inode, live_inode, put_inode};

    #[test]
    fn unlinked_root_is_reset() {
        let (dev, geo) = formatted();
        let mut root = get_inode(&dev, &geo, 0);
        root.hard_links = 0;
        root.direct = vsfs_types::BlockNumber(40);
        root.reserved = vec![0x5A; 200];
        put_inode(&dev, &geo, 0, &root);

        let report = repair_root_inode(&dev, &geo).unwrap();
        assert_eq!(
            report.findings,
            vec![Finding::RootInodeReset {
                hard_links: 0,
                deletion_time: 0
            }]
        );

        let fixed = get_inode(&dev, &geo, 0);
        assert!(fixed.is_live());
        assert_eq!(fixed.direct.0, geo.first_data_block);
        assert_eq!(fixed.file_size, geo.block_size);
        assert_eq!(fixed.mode, 0x1FF);
        assert!(fixed.reserved.iter().all(|b| *b == 0));
    }

    #[test]
    fn deleted_root_is_reset() {
        let (dev, geo) = formatted();
        let mut root = get_inode(&dev, &geo, 0);
        root.deletion_time = 1_700_000_000;
        put_inode(&dev, &geo, 0, &root);

        let report = repair_root_inode(&dev, &geo).unwrap();
        assert!(matches!(
            report.findings[0],
            Finding::RootInodeReset {
                hard_links: 1,
                deletion_time: 1_700_000_000
            }
        ));
        assert_eq!(get_inode(&dev, &geo, 0).deletion_time, 0);
    }

    #[test]
    fn live_root_is_left_alone() {
        let (dev, geo) = formatted();
        put_inode(&dev, &geo, 0, &live_inode(33));
        let writes = dev.write_count();

        let report = repair_root_inode(&dev, &geo).unwrap();
        assert!(report.is_clean());
        assert_eq!(dev.write_count(), writes);
        assert_eq!(get_inode(&dev, &geo, 0).direct.0, 33);
    }

    #[test]
    fn reset_is_idempotent() {
        let (dev, geo) = formatted();
        put_inode(&dev, &geo, 0, &Inode::zeroed());
        repair_root_inode(&dev, &geo).unwrap();
        let bytes = dev.snapshot();
        assert!(repair_root_inode(&dev, &geo).unwrap().is_clean());
        assert_eq!(dev.snapshot(), bytes);
    }
}
