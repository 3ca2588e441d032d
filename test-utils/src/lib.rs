//! Shared fixtures for hyvelite integration tests.
//!
//! Everything lives under a per-test `TempDir`: artifact root, boot image,
//! lease table and a shell-script stand-in for the hypervisor binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hyvelite::images::LocalImageSource;
use hyvelite::vmm::XhyveController;
use hyvelite::{ArtifactBuilder, Machine, MachineConfig, MachineOptions};
use tempfile::TempDir;

pub use hyvelite::testing::{
    DirMounter, STUB_PUBLIC_KEY, StubKeyGenerator, write_image_tree, write_lease_record,
};

/// MAC the guest is configured with; leases for it resolve the machine.
pub const GUEST_MAC: &str = "e2:4:5c:1a:2b:3c";

// ============================================================================
// FAKE HYPERVISOR
// ============================================================================

/// Behavior of the fake hypervisor script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeHypervisor {
    /// Stays up until signalled.
    Sleeping,
    /// Exits with status 1 right away.
    Crashing,
    /// Ignores SIGTERM; only SIGKILL stops it.
    Stubborn,
}

impl FakeHypervisor {
    fn script(self) -> &'static str {
        match self {
            FakeHypervisor::Sleeping => "#!/bin/sh\necho \"xhyve $*\"\nsleep 300\n",
            FakeHypervisor::Crashing => "#!/bin/sh\necho \"xhyve: vm_create failed\" >&2\nexit 1\n",
            FakeHypervisor::Stubborn => {
                "#!/bin/sh\ntrap '' TERM\necho \"xhyve $*\"\nwhile true; do sleep 1; done\n"
            }
        }
    }
}

// ============================================================================
// TEST CONTEXT
// ============================================================================

/// Isolated machine environment with automatic cleanup.
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ctx = Self { temp_dir };

        write_image_tree(&ctx.image_tree()).expect("Failed to write image tree");
        std::fs::write(ctx.boot_image(), b"boot2docker").expect("Failed to write boot image");
        ctx
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn image_tree(&self) -> PathBuf {
        self.path().join("image-tree")
    }

    pub fn boot_image(&self) -> PathBuf {
        self.path().join("boot2docker.iso")
    }

    pub fn lease_file(&self) -> PathBuf {
        self.path().join("dhcpd_leases")
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.path().join("machines")
    }

    /// Machine config pointing every path into the temp dir.
    pub fn config(&self, name: &str) -> MachineConfig {
        let mut config = MachineConfig::new(name, self.artifact_root());
        config.boot_image_url = self.boot_image().display().to_string();
        config.lease_file = self.lease_file();
        config.mac_address = Some(GUEST_MAC.into());
        config.disk_size_mb = 8;
        config
    }

    /// Short poll budgets so failures surface in milliseconds.
    pub fn options(&self) -> MachineOptions {
        MachineOptions {
            boot_poll_attempts: 20,
            boot_poll_interval: Duration::from_millis(50),
            stop_poll_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_secs(2),
        }
    }

    pub fn builder(&self) -> ArtifactBuilder {
        ArtifactBuilder::new(
            Arc::new(LocalImageSource),
            Arc::new(DirMounter::new(self.image_tree())),
            Arc::new(StubKeyGenerator),
        )
    }

    /// Write an executable fake hypervisor and return its path.
    pub fn hypervisor(&self, kind: FakeHypervisor) -> PathBuf {
        let path = self.path().join(format!("xhyve-{:?}", kind).to_lowercase());
        std::fs::write(&path, kind.script()).expect("Failed to write fake hypervisor");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to chmod fake hypervisor");
        }
        path
    }

    pub fn controller(&self, kind: FakeHypervisor) -> Arc<XhyveController> {
        Arc::new(XhyveController::new(&self.hypervisor(kind)).expect("Failed to create controller"))
    }

    /// Machine backed by a fake hypervisor of the given kind.
    pub fn machine(&self, name: &str, kind: FakeHypervisor) -> Machine {
        Machine::with_collaborators(
            self.config(name),
            self.options(),
            self.builder(),
            self.controller(kind),
        )
    }

    /// Append a lease record the way the host's DHCP service writes them.
    pub fn write_lease(&self, name: &str, ip: &str, mac: &str) {
        write_lease_record(&self.lease_file(), name, ip, mac);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a lease record after `delay`, from a background task.
pub fn write_lease_later(path: PathBuf, ip: &'static str, mac: &'static str, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        write_lease_record(&path, "boot2docker", ip, mac);
    });
}
