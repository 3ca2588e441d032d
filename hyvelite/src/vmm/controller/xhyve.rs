//! XhyveController and XhyveHandler - process management for the xhyve binary.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Instant;

use hyvelite_shared::errors::{HyveliteResult, ProcessError};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::util::{self, Liveness};
use crate::vmm::{HypervisorController, HypervisorHandler, LaunchSpec, ProcessStatus};

use super::spawn::spawn_subprocess;

// ============================================================================
// XHYVE HANDLER - Runtime operations on a running VM
// ============================================================================

/// Runtime handler for a hypervisor process.
///
/// Works for both freshly spawned processes (owning the `Child`) and
/// processes re-attached by PID after a driver restart.
pub struct XhyveHandler {
    pid: u32,
    /// Child handle when we spawned the process. `try_wait` on it gives an
    /// authoritative exit status; attached processes only have the PID.
    process: Option<Child>,
    /// Instance identifier passed on the command line, used to detect PID reuse.
    instance_id: Option<String>,
}

impl XhyveHandler {
    /// Create a handler for a spawned process with process ownership.
    pub fn from_child(process: Child) -> Self {
        Self {
            pid: process.id(),
            process: Some(process),
            instance_id: None,
        }
    }

    /// Create a handler for an existing process (attach mode).
    pub fn from_pid(pid: u32, instance_id: impl Into<String>) -> Self {
        Self {
            pid,
            process: None,
            instance_id: Some(instance_id.into()),
        }
    }

    fn signal(&self, signal: Signal) -> HyveliteResult<()> {
        let raw = i32::try_from(self.pid).unwrap_or(i32::MAX);
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            // Already gone
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ProcessError::Signal {
                pid: self.pid,
                signal: signal.as_str(),
                source: errno.into(),
            }
            .into()),
        }
    }
}

impl HypervisorHandler for XhyveHandler {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn status(&mut self) -> ProcessStatus {
        if let Some(process) = self.process.as_mut() {
            return match process.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = self.pid, %status, "Hypervisor exited");
                    ProcessStatus::Exited
                }
                Ok(None) => ProcessStatus::Running,
                Err(e) => {
                    tracing::warn!(pid = self.pid, "Failed to query hypervisor status: {}", e);
                    ProcessStatus::Unknown
                }
            };
        }

        match util::process_liveness(self.pid) {
            Liveness::Alive => match &self.instance_id {
                Some(id) if !util::is_same_process(self.pid, id) => ProcessStatus::Exited,
                _ => ProcessStatus::Running,
            },
            Liveness::Gone => ProcessStatus::Exited,
            Liveness::Indeterminate => ProcessStatus::Unknown,
        }
    }

    fn shutdown(&mut self) -> HyveliteResult<()> {
        if self.status() == ProcessStatus::Exited {
            return Ok(());
        }
        tracing::debug!(pid = self.pid, "Sending SIGTERM to hypervisor");
        self.signal(Signal::SIGTERM)
    }

    fn kill(&mut self) -> HyveliteResult<()> {
        // Kill process - prefer Child::kill() if we have the handle
        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.kill() {
                tracing::debug!(pid = self.pid, "Child::kill failed: {}", e);
            }
            process.wait().map_err(|source| ProcessError::Wait {
                pid: self.pid,
                source,
            })?;
            return Ok(());
        }

        if util::process_liveness(self.pid) == Liveness::Gone {
            return Ok(());
        }
        self.signal(Signal::SIGKILL)
    }
}

// ============================================================================
// XHYVE CONTROLLER - Spawning operations
// ============================================================================

/// Controller for spawning xhyve processes.
pub struct XhyveController {
    binary_path: PathBuf,
}

impl XhyveController {
    /// Create a new XhyveController.
    ///
    /// # Arguments
    /// * `binary` - Hypervisor binary path or name on PATH
    ///
    /// # Returns
    /// * `Ok(XhyveController)` - Binary resolved to an executable
    /// * `Err(...)` - Binary not found
    pub fn new(binary: &Path) -> HyveliteResult<Self> {
        let binary_path = util::find_binary(binary)?;
        Ok(Self { binary_path })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl HypervisorController for XhyveController {
    fn launch(
        &self,
        spec: &LaunchSpec,
        log_path: &Path,
    ) -> HyveliteResult<Box<dyn HypervisorHandler>> {
        let args = spec.to_args();
        tracing::debug!(
            binary = %self.binary_path.display(),
            args = %args.join(" "),
            "Launching hypervisor"
        );

        let spawn_start = Instant::now();
        let child = spawn_subprocess(&self.binary_path, &args, log_path)?;

        tracing::info!(
            pid = child.id(),
            uuid = %spec.uuid,
            spawn_duration_ms = spawn_start.elapsed().as_millis(),
            "Hypervisor process spawned"
        );

        Ok(Box::new(XhyveHandler::from_child(child)))
    }

    fn attach(&self, pid: u32, instance_id: &str) -> Box<dyn HypervisorHandler> {
        Box::new(XhyveHandler::from_pid(pid, instance_id))
    }
}
