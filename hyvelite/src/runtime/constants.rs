//! Constants for the hyvelite driver
//!
//! Centralized location for defaults, file names, and polling budgets.
//! Guest-facing values live in `hyvelite_shared::constants`.

pub use hyvelite_shared::constants::{guest, network, userdata};

pub mod envs {
    /// Overrides the artifact root (default: ~/.hyvelite/machines)
    pub const HYVELITE_HOME: &str = "HYVELITE_HOME";

    /// Overrides the hypervisor binary (default: `xhyve` on PATH)
    pub const HYVELITE_HYPERVISOR: &str = "HYVELITE_HYPERVISOR";
}

/// Virtual machine resource defaults
pub mod vm_defaults {
    /// Default number of CPUs
    pub const DEFAULT_CPUS: i32 = 1;

    /// CPU count meaning "use every CPU the host has"
    pub const ALL_HOST_CPUS: i32 = -1;

    /// Default memory in MB
    pub const DEFAULT_MEMORY_MB: u32 = 1024;

    /// Default disk size in MB
    pub const DEFAULT_DISK_SIZE_MB: u64 = 20000;

    /// Machine name used when none was supplied
    pub const DEFAULT_MACHINE_NAME: &str = "docker-machine-unknown";

    /// Default kexec command line for boot2docker
    pub const DEFAULT_BOOT_CMD: &str = "loglevel=3 user=docker console=ttyS0 console=tty0 noembed nomodeset norestore waitusb=10:LABEL=boot2docker-data base host=boot2docker";

    /// Default boot image location
    pub const DEFAULT_BOOT_IMAGE_URL: &str =
        "https://github.com/boot2docker/boot2docker/releases/latest/download/boot2docker.iso";
}

/// Hypervisor identity
pub mod hypervisor {
    /// Driver name reported to the orchestrator
    pub const DRIVER_NAME: &str = "xhyve";

    /// Binary looked up on PATH when not configured
    pub const DEFAULT_BINARY: &str = "xhyve";
}

/// Host DHCP lease table
pub mod lease {
    /// Lease table written by the host's vmnet DHCP service
    pub const DEFAULT_LEASE_FILE: &str = "/var/db/dhcpd_leases";
}

/// Polling budgets for boot and shutdown
pub mod polling {
    use std::time::Duration;

    /// Lease table lookups before boot is declared failed
    pub const BOOT_POLL_ATTEMPTS: u32 = 60;

    /// Spacing between lease table lookups
    pub const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// Spacing between process status checks while stopping
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Upper bound on a graceful stop
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);
}

/// File naming patterns
pub mod filenames {
    /// Boot image copied into the artifact directory
    pub const BOOT_IMAGE: &str = "boot2docker.iso";

    /// Kernel extracted from the boot image
    pub const KERNEL: &str = "vmlinuz64";

    /// Initial ramdisk extracted from the boot image
    pub const INITRD: &str = "initrd.img";

    /// Credential bundle consumed by the guest at first boot
    pub const USERDATA: &str = "userdata.tar";

    /// SSH private key
    pub const SSH_KEY: &str = "id_rsa";

    /// SSH public key
    pub const SSH_PUBLIC_KEY: &str = "id_rsa.pub";

    /// Hypervisor stdout/stderr capture
    pub const HYPERVISOR_LOG: &str = "xhyve.log";

    /// Persisted machine state
    pub const STATE: &str = "state.json";

    /// Mount point for the boot image while extracting payloads
    pub const BOOT_VOLUME_DIR: &str = "boot-volume";

    /// Backing disk image name for a machine
    pub fn disk_image(machine_name: &str) -> String {
        format!("{}.img", machine_name)
    }
}
