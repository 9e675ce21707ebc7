#![forbid(unsafe_code)]
//! Inode table I/O.
//!
//! [`InodeTable`] reads and writes whole inode records at their fixed
//! offsets. [`InodeTable::iter`] yields records one at a time in index order
//! and can be called again for another pass; every checker stage that walks
//! the table goes through it.

use tracing::trace;
use vsfs_block::ByteDevice;
use vsfs_error::{FsckError, Result};
use vsfs_ondisk::Inode;
use vsfs_types::{Geometry, InodeNumber, ParseError};

/// Surface a decoding failure as a runtime error.
#[must_use]
pub fn parse_error(err: ParseError) -> FsckError {
    FsckError::Parse(err.to_string())
}

/// The inode table of one opened image.
#[derive(Debug)]
pub struct InodeTable<'a, D: ByteDevice + ?Sized> {
    dev: &'a D,
    geo: Geometry,
}

impl<'a, D: ByteDevice + ?Sized> InodeTable<'a, D> {
    #[must_use]
    pub fn new(dev: &'a D, geo: Geometry) -> Self {
        Self { dev, geo }
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.geo.inode_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_index(&self, ino: InodeNumber) -> Result<()> {
        if ino.0 >= self.len() {
            return Err(FsckError::OutOfBounds {
                offset: self.geo.inode_offset(ino),
                len: u64::from(self.geo.inode_size),
                device_len: self.dev.len_bytes(),
            });
        }
        Ok(())
    }

    /// Read and decode inode `ino`.
    pub fn read(&self, ino: InodeNumber) -> Result<Inode> {
        self.check_index(ino)?;
        let mut buf = vec![0_u8; self.geo.inode_size_usize()];
        self.dev.read_exact_at(self.geo.inode_offset(ino), &mut buf)?;
        Inode::parse_from_bytes(&buf).map_err(parse_error)
    }

    /// Rewrite inode `ino` as one whole record and flush it.
    pub fn write(&self, ino: InodeNumber, inode: &Inode) -> Result<()> {
        self.check_index(ino)?;
        let bytes = inode
            .to_bytes(self.geo.inode_size_usize())
            .map_err(parse_error)?;
        self.dev.write_all_at(self.geo.inode_offset(ino), &bytes)?;
        self.dev.sync()?;
        trace!(target: "vsfs::inode", ino = ino.0, "inode_written");
        Ok(())
    }

    /// Walk the table from inode 0.
    #[must_use]
    pub fn iter(&self) -> InodeIter<'_, 'a, D> {
        InodeIter {
            table: self,
            next: 0,
            failed: false,
        }
    }
}

/// Lazy pass over an [`InodeTable`].
///
/// Stops after the first read or decode failure, which it yields.
#[derive(Debug)]
pub struct InodeIter<'t, 'a, D: ByteDevice + ?Sized> {
    table: &'t InodeTable<'a, D>,
    next: u32,
    failed: bool,
}

impl<D: ByteDevice + ?Sized> Iterator for InodeIter<'_, '_, D> {
    type Item = Result<(InodeNumber, Inode)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.table.len() {
            return None;
        }
        let ino = InodeNumber(self.next);
        self.next += 1;
        match self.table.read(ino) {
            Ok(inode) => Some(Ok((ino, inode))),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let left = (self.table.len() - self.next) as usize;
        (0, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsfs_block::MemByteDevice;
    use vsfs_types::BlockNumber;

    fn image() -> (MemByteDevice, Geometry) {
        let geo = Geometry::VSFS;
        let len = usize::try_from(geo.image_len()).unwrap();
        (MemByteDevice::new(len), geo)
    }

    #[test]
    fn write_then_read_lands_at_record_offset() {
        let (dev, geo) = image();
        let table = InodeTable::new(&dev, geo);
        let mut inode = Inode::root(&geo);
        inode.direct = BlockNumber(33);
        table.write(InodeNumber(5), &inode).unwrap();

        let raw = dev.snapshot();
        let off = usize::try_from(geo.inode_offset(InodeNumber(5))).unwrap();
        assert_eq!(&raw[off + 0x28..off + 0x2C], &33_u32.to_le_bytes());

        let back = table.read(InodeNumber(5)).unwrap();
        assert_eq!(back.direct, BlockNumber(33));
        assert_eq!(back.reserved.len(), 256 - 0x38);
    }

    #[test]
    fn iter_visits_every_inode_in_order_and_restarts() {
        let (dev, geo) = image();
        let table = InodeTable::new(&dev, geo);
        table.write(InodeNumber(79), &Inode::root(&geo)).unwrap();

        let first: Vec<_> = table.iter().map(|r| r.unwrap()).collect();
        assert_eq!(first.len(), 80);
        assert_eq!(first[0].0, InodeNumber(0));
        assert!(first[79].1.is_live());
        assert!(!first[78].1.is_live());

        assert_eq!(table.iter().count(), 80);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let (dev, geo) = image();
        let table = InodeTable::new(&dev, geo);
        assert!(matches!(
            table.read(InodeNumber(80)),
            Err(FsckError::OutOfBounds { .. })
        ));
        assert!(table.write(InodeNumber(80), &Inode::zeroed()).is_err());
    }

    #[test]
    fn iter_stops_after_short_image() {
        let geo = Geometry::VSFS;
        // Inode table starts at 12288; leave room for two whole records only.
        let dev = MemByteDevice::new(3 * 4096 + 2 * 256 + 10);
        let table = InodeTable::new(&dev, geo);

        let results: Vec<_> = table.iter().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(FsckError::OutOfBounds { .. })));
    }

    #[test]
    fn parse_errors_become_fsck_errors() {
        let short = Inode::parse_from_bytes(&[0_u8; 8]).unwrap_err();
        assert!(matches!(short, ParseError::InsufficientData { actual: 8, .. }));
        let err = parse_error(short);
        assert!(matches!(err, FsckError::Parse(msg) if msg.starts_with("insufficient data")));
    }
}
