#![forbid(unsafe_code)]
//! On-disk format parsing for VSFS structures.
//!
//! Pure parsing crate: no I/O, no side effects. Decodes byte slices into the
//! superblock and inode records and encodes them back, byte-exact, keeping
//! reserved areas intact.

pub mod inode;
pub mod superblock;

pub use inode::{Inode, PointerSlot};
pub use superblock::{FieldDeviation, LayoutField, Superblock};
