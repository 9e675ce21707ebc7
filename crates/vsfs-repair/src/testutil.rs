//! In-memory images for stage tests.

use crate::format::format_image;
use vsfs_alloc::{bitmap_assign, bitmap_get};
use vsfs_block::{ByteDevice, MemByteDevice};
use vsfs_inode::InodeTable;
use vsfs_ondisk::Inode;
use vsfs_types::{BlockNumber, Geometry, InodeNumber};

/// A freshly formatted image: canonical superblock, live root inode at the
/// first data block, bitmaps marking exactly the root.
pub(crate) fn formatted() -> (MemByteDevice, Geometry) {
    let geo = Geometry::VSFS;
    let dev = MemByteDevice::default();
    format_image(&dev, &geo).unwrap();
    (dev, geo)
}

pub(crate) fn live_inode(direct: u32) -> Inode {
    Inode {
        hard_links: 1,
        data_blocks: 1,
        direct: BlockNumber(direct),
        ..Inode::zeroed()
    }
}

pub(crate) fn put_inode(dev: &MemByteDevice, geo: &Geometry, ino: u32, inode: &Inode) {
    InodeTable::new(dev, *geo)
        .write(InodeNumber(ino), inode)
        .unwrap();
}

pub(crate) fn get_inode(dev: &MemByteDevice, geo: &Geometry, ino: u32) -> Inode {
    InodeTable::new(dev, *geo).read(InodeNumber(ino)).unwrap()
}

pub(crate) fn read_bitmap(dev: &MemByteDevice, geo: &Geometry, block: u32) -> Vec<u8> {
    let mut buf = vec![0_u8; geo.block_size_usize()];
    dev.read_exact_at(geo.block_offset(BlockNumber(block)), &mut buf)
        .unwrap();
    buf
}

pub(crate) fn set_bit(dev: &MemByteDevice, geo: &Geometry, block: u32, idx: u32, used: bool) {
    let mut bm = read_bitmap(dev, geo, block);
    bitmap_assign(&mut bm, idx, used);
    dev.write_all_at(geo.block_offset(BlockNumber(block)), &bm)
        .unwrap();
}

pub(crate) fn bit(dev: &MemByteDevice, geo: &Geometry, block: u32, idx: u32) -> bool {
    bitmap_get(&read_bitmap(dev, geo, block), idx)
}
