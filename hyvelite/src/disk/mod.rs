//! Disk image operations.
//!
//! - `DiskImage` - Raw backing disk handed to the hypervisor's block device
//! - `AllocationMode` - Sparse or zero-filled allocation

pub mod constants;
mod image;

pub use image::{AllocationMode, DiskImage};
