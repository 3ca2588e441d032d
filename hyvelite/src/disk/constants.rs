//! Disk image constants.

/// Raw backing disk configuration
pub mod raw {
    /// Allocation granularity in bytes (1 MiB, matching `dd bs=1m`)
    pub const BLOCK_SIZE: u64 = 1024 * 1024;
}
