//! Hypervisor process supervision.

use std::path::Path;

use hyvelite_shared::errors::HyveliteResult;

mod args;
pub mod controller;
pub mod host_check;

pub use args::LaunchSpec;
pub use controller::{XhyveController, XhyveHandler};

/// Observed state of the hypervisor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited,
    /// The process could not be queried (e.g. permission denied on signal 0).
    Unknown,
}

/// Runtime operations on a launched hypervisor process.
pub trait HypervisorHandler: Send {
    fn pid(&self) -> u32;

    /// Poll the process without blocking.
    fn status(&mut self) -> ProcessStatus;

    /// Ask the hypervisor to shut down (SIGTERM). Returns without waiting.
    fn shutdown(&mut self) -> HyveliteResult<()>;

    /// Force-terminate the hypervisor (SIGKILL) and reap it when owned.
    fn kill(&mut self) -> HyveliteResult<()>;
}

/// Launches hypervisor processes and re-attaches to existing ones.
pub trait HypervisorController: Send + Sync {
    /// Spawn the hypervisor for `spec`, sending its output to `log_path`.
    fn launch(&self, spec: &LaunchSpec, log_path: &Path)
    -> HyveliteResult<Box<dyn HypervisorHandler>>;

    /// Wrap an already running process recorded in persisted state.
    fn attach(&self, pid: u32, instance_id: &str) -> Box<dyn HypervisorHandler>;
}
