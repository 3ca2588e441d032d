//! Machine lifecycle phase and state machine.
//!
//! Defines the possible phases of a machine and valid transitions between them.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use chrono::{DateTime, Utc};
use hyvelite_shared::errors::{HyveliteError, HyveliteResult};
use serde::{Deserialize, Serialize};

use crate::runtime::constants::network;

/// Lifecycle phase of a machine.
///
/// State machine:
/// ```text
/// create()  Absent → Provisioning → Booting → Running
/// start()   Stopped → Booting → Running
/// stop()    Running → Stopping → Stopped
/// remove()  any → Removed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachinePhase {
    /// Nothing has been created yet.
    Absent,

    /// Artifacts are being built.
    Provisioning,

    /// Hypervisor launched, waiting for the guest to lease an address.
    Booting,

    /// Hypervisor process is live and the guest has an address.
    Running,

    /// Shutdown requested, waiting for the hypervisor to exit.
    Stopping,

    /// Hypervisor process is gone. Artifacts are preserved.
    Stopped,

    /// Artifacts deleted. Terminal.
    Removed,

    /// The hypervisor process could not be queried.
    Unknown,
}

impl MachinePhase {
    /// Check if this phase has a hypervisor process that should be alive.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MachinePhase::Booting | MachinePhase::Running | MachinePhase::Stopping
        )
    }

    /// Check if start() can be called from this phase.
    pub fn can_start(&self) -> bool {
        matches!(self, MachinePhase::Booting | MachinePhase::Stopped)
    }

    /// Check if transition to target phase is valid.
    pub fn can_transition_to(&self, target: MachinePhase) -> bool {
        use MachinePhase::*;
        // Removed is terminal: no arm starts from it
        matches!(
            (self, target),
            // Unknown can transition to any settled state (recovery)
            (Unknown, Running) |
            (Unknown, Stopping) |
            (Unknown, Stopped) |
            (Unknown, Removed) |
            // Absent → Provisioning (create)
            (Absent, Provisioning) |
            // Provisioning → Booting (build done) or Removed
            (Provisioning, Booting) |
            (Provisioning, Removed) |
            // Booting → Running (address found) or Stopped (process gone)
            (Booting, Running) |
            (Booting, Stopped) |
            (Booting, Unknown) |
            (Booting, Removed) |
            // Running → Stopping (graceful) or Stopped (crash / kill)
            (Running, Stopping) |
            (Running, Stopped) |
            (Running, Unknown) |
            (Running, Removed) |
            // Stopping → Stopped (complete) or Unknown (error)
            (Stopping, Stopped) |
            (Stopping, Unknown) |
            (Stopping, Removed) |
            // Stopped → Booting (start) or Removed
            (Stopped, Booting) |
            (Stopped, Removed)
        )
    }

    /// Convert to string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachinePhase::Absent => "absent",
            MachinePhase::Provisioning => "provisioning",
            MachinePhase::Booting => "booting",
            MachinePhase::Running => "running",
            MachinePhase::Stopping => "stopping",
            MachinePhase::Stopped => "stopped",
            MachinePhase::Removed => "removed",
            MachinePhase::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for MachinePhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absent" => Ok(MachinePhase::Absent),
            "provisioning" => Ok(MachinePhase::Provisioning),
            "booting" => Ok(MachinePhase::Booting),
            "running" => Ok(MachinePhase::Running),
            "stopping" => Ok(MachinePhase::Stopping),
            "stopped" => Ok(MachinePhase::Stopped),
            "removed" => Ok(MachinePhase::Removed),
            "unknown" => Ok(MachinePhase::Unknown),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dynamic machine state, owned by the lifecycle controller.
///
/// Persisted to `state.json` after every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    /// Instance identifier handed to the hypervisor (`-U`). Empty until created.
    pub uuid: String,
    /// Current lifecycle phase.
    pub phase: MachinePhase,
    /// Last leased address. `None` unless the guest has been seen on the network.
    pub ip_address: Option<IpAddr>,
    /// Hypervisor PID while a process is expected to be alive.
    pub pid: Option<u32>,
    /// Last state change timestamp (UTC).
    pub last_updated: DateTime<Utc>,
}

impl MachineState {
    /// Initial state before anything has been created.
    pub fn new() -> Self {
        Self {
            uuid: String::new(),
            phase: MachinePhase::Absent,
            ip_address: None,
            pid: None,
            last_updated: Utc::now(),
        }
    }

    /// Attempt phase transition with validation.
    ///
    /// Returns error if the transition is not valid.
    pub fn transition_to(&mut self, new_phase: MachinePhase) -> HyveliteResult<()> {
        if !self.phase.can_transition_to(new_phase) {
            return Err(HyveliteError::InvalidState(format!(
                "Cannot transition from {} to {}",
                self.phase, new_phase
            )));
        }
        self.phase = new_phase;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Forget the process and address after the hypervisor exited.
    pub fn clear_runtime(&mut self) {
        self.pid = None;
        self.ip_address = None;
        self.last_updated = Utc::now();
    }

    /// SSH endpoint of the guest, once it has an address.
    pub fn ssh_endpoint(&self) -> Option<SocketAddr> {
        self.ip_address
            .map(|ip| SocketAddr::new(ip, network::SSH_PORT))
    }

    /// Docker daemon URL (`tcp://<ip>:2376`), empty when no address is known.
    pub fn url(&self) -> String {
        match self.ip_address {
            Some(ip) => format!("tcp://{}", SocketAddr::new(ip, network::DOCKER_PORT)),
            None => String::new(),
        }
    }

    /// Write the state to `path` atomically.
    pub fn save(&self, path: &Path) -> HyveliteResult<()> {
        let storage_err = |e: &dyn std::fmt::Display| {
            HyveliteError::Storage(format!("save state {}: {}", path.display(), e))
        };

        let json = serde_json::to_vec_pretty(self).map_err(|e| storage_err(&e))?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(parent).map_err(|e| storage_err(&e))?;
        file.write_all(&json).map_err(|e| storage_err(&e))?;
        file.persist(path).map_err(|e| storage_err(&e.error))?;
        Ok(())
    }

    /// Read state previously written by [`MachineState::save`].
    pub fn load(path: &Path) -> HyveliteResult<Self> {
        let json = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HyveliteError::NotFound(format!("machine state {}", path.display()))
            } else {
                HyveliteError::Storage(format!("read state {}: {}", path.display(), e))
            }
        })?;
        serde_json::from_slice(&json)
            .map_err(|e| HyveliteError::Storage(format!("parse state {}: {}", path.display(), e)))
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}
