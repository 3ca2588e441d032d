//! Shared constants between host and guest
//!
//! These constants must be identical on both sides of the host-guest boundary.

/// Credential bundle (`userdata.tar`) contract.
///
/// The guest automount script scans the archive sequentially, so entry
/// names and their order are part of the contract.
pub mod userdata {
    /// Sentinel entry name (and content). Its presence tells the guest to
    /// format and initialize the persistent data volume.
    pub const MAGIC: &str = "boot2docker, this is xhyve speaking";

    /// Directory holding the authorized keys inside the archive
    pub const SSH_DIR: &str = ".ssh";

    /// Primary authorized keys entry
    pub const AUTHORIZED_KEYS: &str = ".ssh/authorized_keys";

    /// Legacy alias of the authorized keys entry
    pub const AUTHORIZED_KEYS2: &str = ".ssh/authorized_keys2";

    /// Mode of the `.ssh` directory entry (owner rwx only)
    pub const SSH_DIR_MODE: u32 = 0o700;

    /// Mode of regular file entries
    pub const FILE_MODE: u32 = 0o644;
}

/// Network constants
pub mod network {
    /// Docker daemon TLS port exposed by the guest
    pub const DOCKER_PORT: u16 = 2376;

    /// SSH port exposed by the guest
    pub const SSH_PORT: u16 = 22;
}

/// Guest account constants
pub mod guest {
    /// Login user baked into the boot image
    pub const SSH_USER: &str = "docker";
}
