//! Layout of the boot image volume.
//!
//! The boot image ships its kernel and initial ramdisk at fixed locations
//! relative to the volume root. The host copies them out before first boot.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths inside the boot image volume.
pub mod paths {
    /// Kernel image, relative to the volume root
    pub const KERNEL: &str = "boot/vmlinuz64";

    /// Initial ramdisk, relative to the volume root
    pub const INITRD: &str = "boot/initrd.img";
}

/// Location of the boot payloads inside a mounted boot image.
///
/// Defaults to the boot2docker layout; images with a different layout can
/// override either path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootVolumeLayout {
    /// Kernel path relative to the volume root
    pub kernel: PathBuf,
    /// Initrd path relative to the volume root
    pub initrd: PathBuf,
}

impl BootVolumeLayout {
    /// Kernel path under the given mount point.
    pub fn kernel_in(&self, mount_point: &Path) -> PathBuf {
        mount_point.join(&self.kernel)
    }

    /// Initrd path under the given mount point.
    pub fn initrd_in(&self, mount_point: &Path) -> PathBuf {
        mount_point.join(&self.initrd)
    }
}

impl Default for BootVolumeLayout {
    fn default() -> Self {
        Self {
            kernel: PathBuf::from(paths::KERNEL),
            initrd: PathBuf::from(paths::INITRD),
        }
    }
}
