//! Machine lifecycle: artifact building, phase tracking and orchestration.

mod builder;
mod lifecycle;
mod state;

pub use builder::ArtifactBuilder;
pub use lifecycle::Machine;
pub use state::{MachinePhase, MachineState};

/// In-crate fakes for unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use hyvelite_shared::errors::HyveliteResult;
    use tempfile::TempDir;

    use super::{ArtifactBuilder, Machine};
    use crate::images::LocalImageSource;
    use crate::runtime::{MachineConfig, MachineOptions};
    use crate::testing::{DirMounter, StubKeyGenerator, write_image_tree, write_lease_record};
    use crate::vmm::{HypervisorController, HypervisorHandler, LaunchSpec, ProcessStatus};

    /// MAC the unit-test configs look up in the lease table.
    pub const GUEST_MAC: &str = "a:b:c:d:e:f";

    /// Hypervisor controller whose processes are a shared status cell.
    #[derive(Clone, Default)]
    pub struct FakeController {
        status: Arc<Mutex<Option<ProcessStatus>>>,
        ignore_sigterm: Arc<AtomicBool>,
        exit_on_launch: Arc<AtomicBool>,
        launches: Arc<AtomicU32>,
        attaches: Arc<AtomicU32>,
        last_spec: Arc<Mutex<Option<LaunchSpec>>>,
        lease_on_launch: Arc<Mutex<Option<(PathBuf, String)>>>,
    }

    impl FakeController {
        pub fn status(&self) -> ProcessStatus {
            self.status.lock().unwrap().unwrap_or(ProcessStatus::Exited)
        }

        pub fn set_status(&self, status: ProcessStatus) {
            *self.status.lock().unwrap() = Some(status);
        }

        pub fn ignore_sigterm(&self, ignore: bool) {
            self.ignore_sigterm.store(ignore, Ordering::SeqCst);
        }

        pub fn exit_on_launch(&self, exit: bool) {
            self.exit_on_launch.store(exit, Ordering::SeqCst);
        }

        /// Append a lease for `ip` to `lease_file` on every launch, as a
        /// freshly booted guest would.
        pub fn lease_on_launch(&self, lease_file: &Path, ip: &str) {
            *self.lease_on_launch.lock().unwrap() = Some((lease_file.to_path_buf(), ip.to_string()));
        }

        pub fn launches(&self) -> u32 {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn attaches(&self) -> u32 {
            self.attaches.load(Ordering::SeqCst)
        }

        pub fn last_spec(&self) -> Option<LaunchSpec> {
            self.last_spec.lock().unwrap().clone()
        }

        fn handler(&self, pid: u32) -> Box<dyn HypervisorHandler> {
            Box::new(FakeHandler {
                pid,
                controller: self.clone(),
            })
        }
    }

    impl HypervisorController for FakeController {
        fn launch(
            &self,
            spec: &LaunchSpec,
            _log_path: &Path,
        ) -> HyveliteResult<Box<dyn HypervisorHandler>> {
            let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
            *self.last_spec.lock().unwrap() = Some(spec.clone());
            if let Some((lease_file, ip)) = self.lease_on_launch.lock().unwrap().as_ref() {
                write_lease_record(lease_file, "boot2docker", ip, "7e:1:2:3:4:5");
            }
            if self.exit_on_launch.load(Ordering::SeqCst) {
                self.set_status(ProcessStatus::Exited);
            } else {
                self.set_status(ProcessStatus::Running);
            }
            Ok(self.handler(40000 + n))
        }

        fn attach(&self, pid: u32, _instance_id: &str) -> Box<dyn HypervisorHandler> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            self.handler(pid)
        }
    }

    struct FakeHandler {
        pid: u32,
        controller: FakeController,
    }

    impl HypervisorHandler for FakeHandler {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn status(&mut self) -> ProcessStatus {
            self.controller.status()
        }

        fn shutdown(&mut self) -> HyveliteResult<()> {
            if !self.controller.ignore_sigterm.load(Ordering::SeqCst) {
                self.controller.set_status(ProcessStatus::Exited);
            }
            Ok(())
        }

        fn kill(&mut self) -> HyveliteResult<()> {
            self.controller.set_status(ProcessStatus::Exited);
            Ok(())
        }
    }

    /// Isolated artifact root, boot image and lease table.
    pub struct TestContext {
        pub temp: TempDir,
        pub controller: FakeController,
    }

    impl TestContext {
        pub fn new() -> Self {
            let temp = TempDir::new().unwrap();
            write_image_tree(&temp.path().join("image-tree")).unwrap();
            std::fs::write(temp.path().join("boot2docker.iso"), "iso").unwrap();

            Self {
                temp,
                controller: FakeController::default(),
            }
        }

        pub fn lease_file(&self) -> PathBuf {
            self.temp.path().join("dhcpd_leases")
        }

        pub fn config(&self) -> MachineConfig {
            let mut config = MachineConfig::new("dev", self.temp.path().join("machines"));
            config.boot_image_url = self.temp.path().join("boot2docker.iso").display().to_string();
            config.lease_file = self.lease_file();
            config.mac_address = Some(GUEST_MAC.into());
            config.disk_size_mb = 2;
            config
        }

        pub fn options(&self) -> MachineOptions {
            MachineOptions {
                boot_poll_attempts: 3,
                boot_poll_interval: Duration::from_millis(10),
                stop_poll_interval: Duration::from_millis(10),
                stop_timeout: Duration::from_millis(50),
            }
        }

        pub fn builder(&self) -> ArtifactBuilder {
            ArtifactBuilder::new(
                Arc::new(LocalImageSource),
                Arc::new(DirMounter::new(self.temp.path().join("image-tree"))),
                Arc::new(StubKeyGenerator),
            )
        }

        pub fn machine(&self) -> Machine {
            self.machine_with(self.config())
        }

        pub fn machine_with(&self, config: MachineConfig) -> Machine {
            Machine::with_collaborators(
                config,
                self.options(),
                self.builder(),
                Arc::new(self.controller.clone()),
            )
        }

        /// Append a lease record in the host lease service's format.
        pub fn write_lease(&self, ip: &str, mac: &str) {
            write_lease_record(&self.lease_file(), "boot2docker", ip, mac);
        }
    }
}
