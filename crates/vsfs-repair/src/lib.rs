#![forbid(unsafe_code)]
//! Consistency checking and repair for VSFS images.
//!
//! Each stage opens its own view of the image, reads the metadata it needs,
//! repairs what it finds in place and flushes every repaired record before
//! moving on. Stages share nothing in memory, so any prefix of the pipeline
//! leaves the image consistent with the repairs it completed.
//!
//! # Flow
//!
//! ```text
//! superblock → root inode → inode bitmap → data bitmap → bad blocks → duplicates
//! ```

pub mod bad_blocks;
pub mod bitmap;
pub mod duplicates;
pub mod format;
pub mod pipeline;
pub mod report;
pub mod root;
pub mod superblock;

pub use bad_blocks::repair_bad_blocks;
pub use bitmap::{BitmapRole, reconcile_bitmap};
pub use duplicates::repair_duplicate_blocks;
pub use format::format_image;
pub use pipeline::Checker;
pub use report::{BitmapSnapshot, Finding, FsckReport, Severity, Stage, StageOutcome, StageReport};
pub use root::repair_root_inode;
pub use superblock::repair_superblock;

#[cfg(test)]
pub(crate) mod testutil;
