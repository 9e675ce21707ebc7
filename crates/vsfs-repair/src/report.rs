//! Findings and reports produced by the checker stages.

use serde::Serialize;
use std::fmt;
use vsfs_alloc::format_bitmap;
use vsfs_ondisk::{FieldDeviation, PointerSlot};
use vsfs_types::{BlockNumber, Geometry, InodeNumber};

// ── Stages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Superblock,
    RootInode,
    InodeBitmap,
    DataBitmap,
    BadBlocks,
    DuplicateBlocks,
}

impl Stage {
    /// Pipeline order. Later stages rely on the geometry the first one fixes.
    pub const ALL: [Self; 6] = [
        Self::Superblock,
        Self::RootInode,
        Self::InodeBitmap,
        Self::DataBitmap,
        Self::BadBlocks,
        Self::DuplicateBlocks,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superblock => "superblock",
            Self::RootInode => "root_inode",
            Self::InodeBitmap => "inode_bitmap",
            Self::DataBitmap => "data_bitmap",
            Self::BadBlocks => "bad_blocks",
            Self::DuplicateBlocks => "duplicate_blocks",
        }
    }

    /// Banner shown above the stage's findings.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Superblock => "SUPERBLOCK VALIDATOR",
            Self::RootInode => "ROOT INODE CHECKER",
            Self::InodeBitmap => "INODE BITMAP CONSISTENCY CHECKER",
            Self::DataBitmap => "DATA BITMAP CONSISTENCY CHECKER",
            Self::BadBlocks => "BAD BLOCK CHECKER",
            Self::DuplicateBlocks => "DUPLICATE BLOCK CHECKER",
        }
    }

    /// Line printed when the stage found nothing.
    #[must_use]
    pub fn clean_message(self) -> &'static str {
        match self {
            Self::Superblock => "No superblock errors found.",
            Self::RootInode => "Inode 0 is already valid. No root inode errors found.",
            Self::InodeBitmap => "No inode bitmap errors found.",
            Self::DataBitmap => "No data bitmap errors found.",
            Self::BadBlocks => "No bad blocks found.",
            Self::DuplicateBlocks => "No duplicate blocks found.",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Findings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Inconsistency found and corrected on disk.
    Repaired,
    /// Inconsistency found and left in place.
    Warning,
}

/// One inconsistency and what was done about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    ImageExtended {
        from_len: u64,
        to_len: u64,
    },
    ImageTruncated {
        from_len: u64,
        to_len: u64,
    },
    MagicRewritten {
        found: u16,
        expected: u16,
    },
    SuperblockField(FieldDeviation),
    RootInodeReset {
        hard_links: u32,
        deletion_time: u32,
    },
    InodeBitSet {
        inode: InodeNumber,
    },
    InodeBitCleared {
        inode: InodeNumber,
    },
    DataBitSet {
        block: BlockNumber,
    },
    DataBitCleared {
        block: BlockNumber,
    },
    BadPointerCleared {
        inode: InodeNumber,
        slot: PointerSlot,
        block: BlockNumber,
    },
    DuplicateReallocated {
        inode: InodeNumber,
        from: BlockNumber,
        to: BlockNumber,
    },
    DuplicateUnrepairable {
        inode: InodeNumber,
        block: BlockNumber,
    },
}

impl Finding {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateUnrepairable { .. } => Severity::Warning,
            _ => Severity::Repaired,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageExtended { from_len, to_len } => {
                write!(f, "Image is {from_len} bytes; extended to {to_len} bytes.")
            }
            Self::ImageTruncated { from_len, to_len } => write!(
                f,
                "Image is {from_len} bytes; truncated to {to_len} bytes and block 0 cleared."
            ),
            Self::MagicRewritten { found, expected } => write!(
                f,
                "Magic number {found:#06X} does not match; updated to {expected:#06X}."
            ),
            Self::SuperblockField(dev) => write!(
                f,
                "Superblock {} is {}, expected {}. Corrected.",
                dev.field, dev.found, dev.expected
            ),
            Self::RootInodeReset {
                hard_links,
                deletion_time,
            } => write!(
                f,
                "Inode 0 is invalid (hard_links={hard_links}, deletion_time={deletion_time}). \
                 Reset to a valid root inode."
            ),
            Self::InodeBitSet { inode } => write!(f, "Inode {inode} valid but unmarked. Marking."),
            Self::InodeBitCleared { inode } => {
                write!(f, "Inode {inode} invalid but marked. Clearing.")
            }
            Self::DataBitSet { block } => {
                write!(f, "Data block {block} referenced but not marked. Marking it.")
            }
            Self::DataBitCleared { block } => write!(
                f,
                "Data block {block} marked used but not referenced. Clearing bit."
            ),
            Self::BadPointerCleared { inode, slot, block } => write!(
                f,
                "Inode {inode} references bad block {block} via {slot} pointer. Cleared."
            ),
            Self::DuplicateReallocated { inode, from, to } => {
                write!(f, "Inode {inode}: reallocating block {from} to {to}.")
            }
            Self::DuplicateUnrepairable { inode, block } => write!(
                f,
                "Inode {inode}: block {block} is shared but no free block is left. Not fixed."
            ),
        }
    }
}

// ── Stage report ────────────────────────────────────────────────────────────

/// A bitmap block as written back by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitmapSnapshot {
    /// Number of meaningful bits (inode count or total blocks).
    pub bits: u32,
    /// MSB-first rendering, eight bits per group.
    pub rendered: String,
}

impl BitmapSnapshot {
    #[must_use]
    pub fn capture(bitmap: &[u8], bits: u32) -> Self {
        Self {
            bits,
            rendered: format_bitmap(bitmap, bits),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<BitmapSnapshot>,
}

impl StageReport {
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            findings: Vec::new(),
            bitmap: None,
        }
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    #[must_use]
    pub fn warnings(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity() == Severity::Warning)
            .count()
    }
}

/// What happened to one stage of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed(StageReport),
    Failed { stage: Stage, error: String },
}

impl StageOutcome {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Completed(report) => report.stage,
            Self::Failed { stage, .. } => *stage,
        }
    }
}

/// Aggregated results of one full checker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsckReport {
    pub geometry: Geometry,
    pub stages: Vec<StageOutcome>,
}

impl FsckReport {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            stages: Vec::new(),
        }
    }

    /// Every stage completed and none found anything.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(|outcome| match outcome {
            StageOutcome::Completed(report) => report.is_clean(),
            StageOutcome::Failed { .. } => false,
        })
    }

    #[must_use]
    pub fn findings_count(&self) -> usize {
        self.completed().map(|r| r.findings.len()).sum()
    }

    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.completed().map(StageReport::warnings).sum()
    }

    #[must_use]
    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|o| matches!(o, StageOutcome::Failed { .. }))
            .map(StageOutcome::stage)
            .collect()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed_stages().is_empty()
    }

    /// Reports of the stages that ran to completion, in pipeline order.
    pub fn completed(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter_map(|o| match o {
            StageOutcome::Completed(report) => Some(report),
            StageOutcome::Failed { .. } => None,
        })
    }
}
