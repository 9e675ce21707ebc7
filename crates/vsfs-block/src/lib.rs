#![forbid(unsafe_code)]
//! Image I/O for the checker.
//!
//! Provides the `ByteDevice` trait (pread/pwrite semantics plus resize), a
//! file-backed and an in-memory implementation, and a `BlockDevice` view that
//! moves whole blocks at a time.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use vsfs_error::{FsckError, Result};
use vsfs_types::BlockNumber;

fn check_range(offset: u64, len: usize, device_len: u64) -> Result<()> {
    let len = u64::try_from(len).map_err(|_| FsckError::OutOfBounds {
        offset,
        len: u64::MAX,
        device_len,
    })?;
    match offset.checked_add(len) {
        Some(end) if end <= device_len => Ok(()),
        _ => Err(FsckError::OutOfBounds {
            offset,
            len,
            device_len,
        }),
    }
}

/// Owned block buffer.
///
/// Invariant: length == block size of the device it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Byte-addressed device for fixed-offset I/O.
pub trait ByteDevice: Send + Sync {
    /// Current length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`. Never grows the device.
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Truncate or extend to `len` bytes. New bytes read as zero.
    fn set_len(&self, len: u64) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

impl<D: ByteDevice + ?Sized> ByteDevice for &D {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        (**self).set_len(len)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

/// File-backed byte device.
///
/// Uses `std::os::unix::fs::FileExt`, so reads and writes never touch a
/// shared seek position.
#[derive(Debug)]
pub struct FileByteDevice {
    file: File,
    len: AtomicU64,
    writable: bool,
}

impl FileByteDevice {
    /// Open read-write, falling back to read-only when the image is not writable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len: AtomicU64::new(len),
            writable,
        })
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len_bytes())?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(FsckError::ReadOnly);
        }
        check_range(offset, buf.len(), self.len_bytes())?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        if !self.writable {
            return Err(FsckError::ReadOnly);
        }
        self.file.set_len(len)?;
        self.len.store(len, Ordering::Release);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemImage {
    bytes: Vec<u8>,
    writes: u64,
}

/// In-memory image shared between clones.
///
/// Every clone sees the same bytes, which lets a caller "reopen" the image
/// per stage the way a file path would be reopened.
#[derive(Debug, Clone, Default)]
pub struct MemByteDevice {
    image: Arc<Mutex<MemImage>>,
}

impl MemByteDevice {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self::from_bytes(vec![0_u8; len])
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            image: Arc::new(Mutex::new(MemImage { bytes, writes: 0 })),
        }
    }

    /// Copy of the current image contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.image.lock().bytes.clone()
    }

    /// Number of mutating calls (`write_all_at`, `set_len`) seen so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.image.lock().writes
    }
}

impl ByteDevice for MemByteDevice {
    fn len_bytes(&self) -> u64 {
        self.image.lock().bytes.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let image = self.image.lock();
        check_range(offset, buf.len(), image.bytes.len() as u64)?;
        let start = usize::try_from(offset).map_err(|_| FsckError::OutOfBounds {
            offset,
            len: buf.len() as u64,
            device_len: image.bytes.len() as u64,
        })?;
        buf.copy_from_slice(&image.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut image = self.image.lock();
        check_range(offset, buf.len(), image.bytes.len() as u64)?;
        let start = usize::try_from(offset).map_err(|_| FsckError::OutOfBounds {
            offset,
            len: buf.len() as u64,
            device_len: image.bytes.len() as u64,
        })?;
        image.bytes[start..start + buf.len()].copy_from_slice(buf);
        image.writes += 1;
        Ok(())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        let len = usize::try_from(len).map_err(|_| FsckError::OutOfBounds {
            offset: 0,
            len,
            device_len: self.len_bytes(),
        })?;
        let mut image = self.image.lock();
        image.bytes.resize(len, 0);
        image.writes += 1;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Block-addressed I/O interface.
pub trait BlockDevice: Send + Sync {
    /// Read a block by number.
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf>;

    /// Write a block by number. `data.len()` MUST equal the device block size.
    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()>;

    /// Number of whole blocks currently backed by the device.
    fn block_count(&self) -> u64;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

/// Whole-block view over a `ByteDevice`.
///
/// Does not require the image length to be block-aligned: the checker runs
/// block I/O on images whose length it has only just repaired.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_size: u32,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(FsckError::InvalidGeometry(format!(
                "invalid block_size={block_size} (must be power of two)"
            )));
        }
        Ok(Self { inner, block_size })
    }

    fn offset_of(&self, block: BlockNumber) -> u64 {
        u64::from(block.0) * u64::from(self.block_size)
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf> {
        let mut buf = vec![0_u8; self.block_size as usize];
        self.inner.read_exact_at(self.offset_of(block), &mut buf)?;
        Ok(BlockBuf::new(buf))
    }

    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size as usize {
            return Err(FsckError::OutOfBounds {
                offset: self.offset_of(block),
                len: data.len() as u64,
                device_len: self.inner.len_bytes(),
            });
        }
        self.inner.write_all_at(self.offset_of(block), data)
    }

    fn block_count(&self) -> u64 {
        self.inner.len_bytes() / u64::from(self.block_size)
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}
