//! Superblock repair: image length, duplicate magic, layout fields.
//!
//! Runs first. Every later stage computes offsets from the geometry this stage
//! enforces, so it has to leave the image at exactly `total_blocks *
//! block_size` bytes with a canonical superblock.

use tracing::{debug, info};
use vsfs_block::ByteDevice;
use vsfs_error::Result;
use vsfs_inode::parse_error;
use vsfs_ondisk::Superblock;
use vsfs_types::{Geometry, MAGIC_OFFSET, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE, VSFS_MAGIC};

use crate::report::{Finding, Stage, StageReport};

/// Bring the image length, magic and superblock in line with `geo`.
///
/// Steps run in order and each is flushed before the next: resize, then the
/// duplicate magic at byte 0, then the superblock record. Truncation zeroes
/// block 0, which the two later steps then rebuild within the same call.
/// On a canonical image nothing is written.
pub fn repair_superblock<D: ByteDevice + ?Sized>(dev: &D, geo: &Geometry) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Superblock);

    let target = geo.image_len();
    let current = dev.len_bytes();
    debug!(target: "vsfs::repair::superblock", current, target, "image_length");
    if current < target {
        dev.set_len(target)?;
        dev.sync()?;
        info!(target: "vsfs::repair::superblock", from = current, to = target, "image_extended");
        report.push(Finding::ImageExtended {
            from_len: current,
            to_len: target,
        });
    } else if current > target {
        dev.set_len(target)?;
        dev.write_all_at(0, &vec![0_u8; geo.block_size_usize()])?;
        dev.sync()?;
        info!(target: "vsfs::repair::superblock", from = current, to = target, "image_truncated");
        report.push(Finding::ImageTruncated {
            from_len: current,
            to_len: target,
        });
    }

    let mut magic = [0_u8; 2];
    dev.read_exact_at(MAGIC_OFFSET, &mut magic)?;
    let found = u16::from_le_bytes(magic);
    if found != VSFS_MAGIC {
        dev.write_all_at(MAGIC_OFFSET, &VSFS_MAGIC.to_le_bytes())?;
        dev.sync()?;
        info!(target: "vsfs::repair::superblock", found, "magic_rewritten");
        report.push(Finding::MagicRewritten {
            found,
            expected: VSFS_MAGIC,
        });
    }

    let mut region = vec![0_u8; SUPERBLOCK_SIZE];
    dev.read_exact_at(SUPERBLOCK_OFFSET, &mut region)?;
    let mut sb = Superblock::parse_from_bytes(&region).map_err(parse_error)?;
    let deviations = sb.deviations(geo);
    if !deviations.is_empty() {
        sb.canonicalize(geo);
        let bytes = sb.to_bytes().map_err(parse_error)?;
        dev.write_all_at(SUPERBLOCK_OFFSET, &bytes)?;
        dev.sync()?;
        for deviation in deviations {
            info!(
                target: "vsfs::repair::superblock",
                field = deviation.field.as_str(),
                found = deviation.found,
                expected = deviation.expected,
                "superblock_field_corrected"
            );
            report.push(Finding::SuperblockField(deviation));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::formatted;
    use vsfs_block::MemByteDevice;
    use vsfs_ondisk::LayoutField;
    use vsfs_types::{read_le_u32, write_le_u32};

    #[test]
    fn canonical_image_is_untouched() {
        let (dev, geo) = formatted();
        let before = dev.write_count();
        let report = repair_superblock(&dev, &geo).unwrap();
        assert!(report.is_clean());
        assert_eq!(dev.write_count(), before);
    }

    #[test]
    fn short_image_is_zero_extended() {
        let geo = Geometry::VSFS;
        let dev = MemByteDevice::from_bytes(vec![0x11; 5000]);
        let report = repair_superblock(&dev, &geo).unwrap();

        let bytes = dev.snapshot();
        assert_eq!(bytes.len() as u64, geo.image_len());
        assert!(bytes[5000..].iter().all(|b| *b == 0));
        assert_eq!(
            report.findings[0],
            Finding::ImageExtended {
                from_len: 5000,
                to_len: geo.image_len()
            }
        );
        // 0x1111 is not the magic, and the superblock is garbage.
        assert!(matches!(report.findings[1], Finding::MagicRewritten { found: 0x1111, .. }));
        assert_eq!(&bytes[..2], &VSFS_MAGIC.to_le_bytes());
    }

    #[test]
    fn long_image_is_truncated_and_block_zero_rebuilt() {
        let (dev, geo) = formatted();
        let len = geo.image_len();
        dev.set_len(len + 4096).unwrap();
        dev.write_all_at(200, &[0xEE; 8]).unwrap();

        let report = repair_superblock(&dev, &geo).unwrap();
        let bytes = dev.snapshot();
        assert_eq!(bytes.len() as u64, len);
        assert_eq!(bytes[200], 0);
        assert_eq!(&bytes[..2], &VSFS_MAGIC.to_le_bytes());

        let sb = Superblock::parse_from_bytes(&bytes[1024..2048]).unwrap();
        assert!(sb.deviations(&geo).is_empty());

        assert!(matches!(report.findings[0], Finding::ImageTruncated { .. }));
        assert!(matches!(report.findings[1], Finding::MagicRewritten { found: 0, .. }));
        // Zeroed record: all eight layout fields plus the record magic.
        assert_eq!(report.findings.len(), 2 + 9);

        assert!(repair_superblock(&dev, &geo).unwrap().is_clean());
    }

    #[test]
    fn each_perturbed_field_is_restored() {
        let offsets = [0x00, 0x04, 0x08, 0x0C, 0x14, 0x18, 0x1C, 0x20];
        for off in offsets {
            let (dev, geo) = formatted();
            let at = SUPERBLOCK_OFFSET + off as u64;
            dev.write_all_at(at, &7777_u32.to_le_bytes()).unwrap();

            let report = repair_superblock(&dev, &geo).unwrap();
            assert_eq!(report.findings.len(), 1, "offset {off:#x}");
            assert!(matches!(
                report.findings[0],
                Finding::SuperblockField(d) if d.found == 7777
            ));

            let bytes = dev.snapshot();
            let sb = Superblock::parse_from_bytes(&bytes[1024..2048]).unwrap();
            assert!(sb.deviations(&geo).is_empty(), "offset {off:#x}");
        }
    }

    #[test]
    fn rewrite_preserves_reserved_bytes() {
        let (dev, geo) = formatted();
        let mut region = dev.snapshot()[1024..2048].to_vec();
        region[0x200] = 0x42;
        write_le_u32(&mut region, 0x0C, 3).unwrap();
        dev.write_all_at(SUPERBLOCK_OFFSET, &region).unwrap();

        let report = repair_superblock(&dev, &geo).unwrap();
        assert_eq!(
            report.findings,
            vec![Finding::SuperblockField(vsfs_ondisk::FieldDeviation {
                field: LayoutField::FirstDataBlock,
                found: 3,
                expected: 8,
            })]
        );
        let bytes = dev.snapshot();
        assert_eq!(bytes[1024 + 0x200], 0x42);
        assert_eq!(read_le_u32(&bytes, 1024 + 0x0C).unwrap(), 8);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let geo = Geometry::VSFS;
        let dev = MemByteDevice::new(123);
        assert!(!repair_superblock(&dev, &geo).unwrap().is_clean());
        let after_first = dev.snapshot();
        let writes = dev.write_count();

        assert!(repair_superblock(&dev, &geo).unwrap().is_clean());
        assert_eq!(dev.snapshot(), after_first);
        assert_eq!(dev.write_count(), writes);
    }
}
