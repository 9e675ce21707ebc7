#![forbid(unsafe_code)]
//! Error types for the VSFS checker.
//!
//! # Error Taxonomy
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `vsfs-types` | Byte-level decoding failures (short buffers, bad offsets) |
//! | Runtime | `FsckError` | `vsfs-error` (this crate) | Failures that abort a checker stage |
//!
//! Structural inconsistencies (bad magic, stale bitmap bits, out-of-range
//! pointers, duplicate blocks) are *not* errors: they are what the checker
//! repairs, and they surface as findings in the stage report. An `FsckError`
//! means the stage could not do its job at all, almost always because the
//! backing image could not be opened, read, written or resized.
//!
//! `vsfs-error` does not depend on `vsfs-types`; `ParseError` is converted into
//! [`FsckError::Parse`] by `vsfs_inode::parse_error`, which sees both.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsckError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An access would reach past the end of the backing image.
    #[error("access out of bounds: offset={offset} len={len} device_len={device_len}")]
    OutOfBounds {
        offset: u64,
        len: u64,
        device_len: u64,
    },

    /// A fixed-size record could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Geometry values that cannot describe a VSFS image.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The image was opened without write access and a repair needed to write.
    #[error("image is read-only")]
    ReadOnly,
}

/// Result alias using `FsckError`.
pub type Result<T> = std::result::Result<T, FsckError>;
