//! Stage sequencing.
//!
//! [`Checker`] runs the six stages in fixed order against a device it opens
//! afresh for each stage. A stage that fails is recorded and the run moves on;
//! later stages then work on whatever the image looks like at that point.

use std::time::Instant;

use tracing::{info, info_span, warn};
use vsfs_block::ByteDevice;
use vsfs_error::Result;
use vsfs_types::Geometry;

use crate::bad_blocks::repair_bad_blocks;
use crate::bitmap::{BitmapRole, reconcile_bitmap};
use crate::duplicates::repair_duplicate_blocks;
use crate::report::{FsckReport, Stage, StageOutcome, StageReport};
use crate::root::repair_root_inode;
use crate::superblock::repair_superblock;

/// Runs checker stages against images of one fixed geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checker {
    geo: Geometry,
}

impl Checker {
    #[must_use]
    pub fn new(geo: Geometry) -> Self {
        Self { geo }
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    /// Run a single stage on an already-open device.
    pub fn run_stage<D: ByteDevice + ?Sized>(&self, stage: Stage, dev: &D) -> Result<StageReport> {
        match stage {
            Stage::Superblock => repair_superblock(dev, &self.geo),
            Stage::RootInode => repair_root_inode(dev, &self.geo),
            Stage::InodeBitmap => reconcile_bitmap(dev, &self.geo, BitmapRole::Inode),
            Stage::DataBitmap => reconcile_bitmap(dev, &self.geo, BitmapRole::Data),
            Stage::BadBlocks => repair_bad_blocks(dev, &self.geo),
            Stage::DuplicateBlocks => repair_duplicate_blocks(dev, &self.geo),
        }
    }

    /// Run every stage in order.
    ///
    /// `open` is called once per stage and the device is dropped when the
    /// stage returns. Open failures count as failures of that stage.
    pub fn run<D, F>(&self, mut open: F) -> FsckReport
    where
        D: ByteDevice,
        F: FnMut() -> Result<D>,
    {
        let mut report = FsckReport::new(self.geo);
        let started = Instant::now();

        for stage in Stage::ALL {
            let span = info_span!(target: "vsfs::repair::pipeline", "stage", stage = stage.as_str());
            let _guard = span.enter();

            let result = open().and_then(|dev| self.run_stage(stage, &dev));
            match result {
                Ok(stage_report) => {
                    info!(
                        target: "vsfs::repair::pipeline",
                        findings = stage_report.findings.len(),
                        warnings = stage_report.warnings(),
                        "stage_complete"
                    );
                    report.stages.push(StageOutcome::Completed(stage_report));
                }
                Err(err) => {
                    warn!(
                        target: "vsfs::repair::pipeline",
                        error = %err,
                        "stage_failed"
                    );
                    report.stages.push(StageOutcome::Failed {
                        stage,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            target: "vsfs::repair::pipeline",
            findings = report.findings_count(),
            failed = report.failed_stages().len(),
            duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            "run_complete"
        );
        report
    }
}
