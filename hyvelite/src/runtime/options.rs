//! Configuration for hyvelite machines.

use crate::runtime::constants::{envs, hypervisor, lease, polling, vm_defaults};
use crate::runtime::layout::{FilesystemLayout, MachineLayout, dirs as const_dirs};
use hyvelite_shared::BootVolumeLayout;
use hyvelite_shared::errors::{HyveliteError, HyveliteResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Bytes per MB for memory and disk sizes (binary megabytes).
pub const MB: u64 = 1024 * 1024;

// ============================================================================
// Machine Configuration
// ============================================================================

/// Immutable per-creation inputs for a machine.
///
/// Validated once by [`MachineConfig::validate`] when the machine is created.
/// Every path the driver touches is derived from this record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Unique machine name; also names the artifact directory and disk image.
    pub machine_name: String,

    /// Root under which `<machine_name>/` holds the artifacts.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,

    /// Number of CPUs. `-1` uses every CPU the host has.
    #[serde(default = "default_cpus")]
    pub cpus: i32,

    /// Guest memory in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    /// Backing disk size in MB.
    #[serde(default = "default_disk_size_mb")]
    pub disk_size_mb: u64,

    /// Kernel command line passed through the kexec directive.
    #[serde(default = "default_boot_cmd")]
    pub boot_cmd: String,

    /// Where to acquire the boot image from (URL or local path).
    #[serde(default = "default_boot_image_url")]
    pub boot_image_url: String,

    /// Host DHCP lease table.
    #[serde(default = "default_lease_file")]
    pub lease_file: PathBuf,

    /// Hypervisor binary. `None` resolves `HYVELITE_HYPERVISOR`, then `xhyve` on PATH.
    #[serde(default)]
    pub hypervisor_binary: Option<PathBuf>,

    /// Hardware address the guest NIC is known to lease with.
    ///
    /// When unset, the most recent lease in the table is taken as the
    /// machine's lease.
    #[serde(default)]
    pub mac_address: Option<String>,

    /// Kernel and initrd locations inside the boot image.
    #[serde(default)]
    pub boot_volume: BootVolumeLayout,
}

fn default_artifact_root() -> PathBuf {
    std::env::var(envs::HYVELITE_HOME)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push(const_dirs::HYVELITE_DIR);
            path.push(const_dirs::MACHINES_DIR);
            path
        })
}

fn default_cpus() -> i32 {
    vm_defaults::DEFAULT_CPUS
}

fn default_memory_mb() -> u32 {
    vm_defaults::DEFAULT_MEMORY_MB
}

fn default_disk_size_mb() -> u64 {
    vm_defaults::DEFAULT_DISK_SIZE_MB
}

fn default_boot_cmd() -> String {
    vm_defaults::DEFAULT_BOOT_CMD.to_string()
}

fn default_boot_image_url() -> String {
    vm_defaults::DEFAULT_BOOT_IMAGE_URL.to_string()
}

fn default_lease_file() -> PathBuf {
    PathBuf::from(lease::DEFAULT_LEASE_FILE)
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            machine_name: vm_defaults::DEFAULT_MACHINE_NAME.to_string(),
            artifact_root: default_artifact_root(),
            cpus: default_cpus(),
            memory_mb: default_memory_mb(),
            disk_size_mb: default_disk_size_mb(),
            boot_cmd: default_boot_cmd(),
            boot_image_url: default_boot_image_url(),
            lease_file: default_lease_file(),
            hypervisor_binary: None,
            mac_address: None,
            boot_volume: BootVolumeLayout::default(),
        }
    }
}

impl MachineConfig {
    /// Config with defaults for everything but the name and artifact root.
    pub fn new(machine_name: impl Into<String>, artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            artifact_root: artifact_root.into(),
            ..Default::default()
        }
    }

    /// Fill in the fallback machine name when none was supplied.
    pub(crate) fn with_default_name(mut self) -> Self {
        if self.machine_name.is_empty() {
            self.machine_name = vm_defaults::DEFAULT_MACHINE_NAME.to_string();
        }
        self
    }

    /// Validate the configuration.
    ///
    /// Runs once before any artifact is written.
    pub fn validate(&self) -> HyveliteResult<()> {
        if self.machine_name.is_empty() {
            return Err(HyveliteError::Config("machine name is empty".into()));
        }
        // Leading alphanumeric keeps "." and ".." from escaping the artifact root
        let starts_alphanumeric = self
            .machine_name
            .starts_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_alphanumeric
            || !self
                .machine_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(HyveliteError::Config(format!(
                "machine name '{}' must start with [A-Za-z0-9] and contain only [A-Za-z0-9._-]",
                self.machine_name
            )));
        }
        if self.cpus != vm_defaults::ALL_HOST_CPUS && self.cpus < 1 {
            return Err(HyveliteError::Config(format!(
                "cpu count must be -1 or at least 1, got {}",
                self.cpus
            )));
        }
        if self.memory_mb == 0 {
            return Err(HyveliteError::Config("memory size must be positive".into()));
        }
        if self.disk_size_mb == 0 {
            return Err(HyveliteError::Config("disk size must be positive".into()));
        }
        self.disk_size_bytes()?;
        if self.boot_cmd.trim().is_empty() {
            return Err(HyveliteError::Config("boot command line is empty".into()));
        }
        if self.boot_image_url.trim().is_empty() {
            return Err(HyveliteError::Config("boot image URL is empty".into()));
        }
        Ok(())
    }

    /// CPU count with `-1` resolved against the host.
    pub fn effective_cpus(&self) -> u32 {
        if self.cpus == vm_defaults::ALL_HOST_CPUS {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1)
        } else {
            self.cpus.max(1) as u32
        }
    }

    /// Disk size in bytes, as handed to the hypervisor's block device.
    pub fn disk_size_bytes(&self) -> HyveliteResult<u64> {
        self.disk_size_mb.checked_mul(MB).ok_or_else(|| {
            HyveliteError::Config(format!(
                "disk size of {} MB does not fit in 64 bits of bytes",
                self.disk_size_mb
            ))
        })
    }

    /// Per-machine artifact layout.
    pub fn layout(&self) -> MachineLayout {
        FilesystemLayout::new(self.artifact_root.clone()).machine_layout(&self.machine_name)
    }

    /// Configured hypervisor binary name or path, before PATH resolution.
    pub fn hypervisor_binary_name(&self) -> PathBuf {
        self.hypervisor_binary.clone().unwrap_or_else(|| {
            std::env::var(envs::HYVELITE_HYPERVISOR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(hypervisor::DEFAULT_BINARY))
        })
    }
}

// ============================================================================
// Polling Options
// ============================================================================

/// Timing budgets for boot address discovery and shutdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Lease table lookups before boot fails.
    pub boot_poll_attempts: u32,
    /// Spacing between lease table lookups.
    pub boot_poll_interval: Duration,
    /// Spacing between process status checks while stopping.
    pub stop_poll_interval: Duration,
    /// Upper bound on a graceful stop before `ShutdownTimeout`.
    pub stop_timeout: Duration,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            boot_poll_attempts: polling::BOOT_POLL_ATTEMPTS,
            boot_poll_interval: polling::BOOT_POLL_INTERVAL,
            stop_poll_interval: polling::STOP_POLL_INTERVAL,
            stop_timeout: polling::STOP_TIMEOUT,
        }
    }
}
