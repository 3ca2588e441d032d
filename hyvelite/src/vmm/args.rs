//! Hypervisor argument construction.
//!
//! The argument vector is the wire contract with the xhyve binary. Order and
//! spelling are fixed:
//!
//! ```text
//! -A -s 0:0,hostbridge -s 31,lpc -l com1 -s 2:0,virtio-net
//! -m <memory>M
//! -s 3,ahci-cd,<boot image>
//! -s 4,virtio-blk,<disk image>
//! -U <uuid>
//! -f kexec,<kernel>,<initrd>,<boot cmd>
//! ```

use std::path::{Path, PathBuf};

use crate::runtime::{MachineConfig, MachineLayout};

/// Fixed platform devices: ACPI tables, host bridge, LPC, serial console, NIC.
const PLATFORM_ARGS: &[&str] = &[
    "-A",
    "-s",
    "0:0,hostbridge",
    "-s",
    "31,lpc",
    "-l",
    "com1",
    "-s",
    "2:0,virtio-net",
];

const CDROM_SLOT: &str = "3,ahci-cd";
const BLOCK_SLOT: &str = "4,virtio-blk";

/// Everything the hypervisor needs to boot one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub memory_mb: u32,
    pub boot_image: PathBuf,
    pub disk_image: PathBuf,
    pub uuid: String,
    pub kernel: PathBuf,
    pub initrd: PathBuf,
    pub boot_cmd: String,
}

impl LaunchSpec {
    /// Build the launch spec for a machine's artifacts.
    pub fn new(config: &MachineConfig, layout: &MachineLayout, uuid: impl Into<String>) -> Self {
        Self {
            memory_mb: config.memory_mb,
            boot_image: layout.boot_image_path(),
            disk_image: layout.disk_image_path(),
            uuid: uuid.into(),
            kernel: layout.kernel_path(),
            initrd: layout.initrd_path(),
            boot_cmd: config.boot_cmd.clone(),
        }
    }

    /// Argument vector passed to the hypervisor binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = PLATFORM_ARGS.iter().map(|s| s.to_string()).collect();
        args.extend([
            "-m".to_string(),
            format!("{}M", self.memory_mb),
            "-s".to_string(),
            format!("{},{}", CDROM_SLOT, display(&self.boot_image)),
            "-s".to_string(),
            format!("{},{}", BLOCK_SLOT, display(&self.disk_image)),
            "-U".to_string(),
            self.uuid.clone(),
            "-f".to_string(),
            format!(
                "kexec,{},{},{}",
                display(&self.kernel),
                display(&self.initrd),
                self.boot_cmd
            ),
        ]);
        args
    }

    /// Arguments joined with spaces, for logging.
    pub fn command_line(&self) -> String {
        self.to_args().join(" ")
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
