//! Machine lifecycle controller.
//!
//! Orchestrates Create → Start → (poll for address) → Running and the
//! Stop/Restart/Remove/Kill transitions on top of the artifact builder,
//! the hypervisor supervisor and the lease table reader.
//!
//! Callers serialize operations per machine; the controller takes `&mut self`
//! for every transition and has no locking of its own.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use hyvelite_shared::errors::{AddressError, HyveliteError, HyveliteResult, ProcessError};
use tokio_util::sync::CancellationToken;

use super::builder::ArtifactBuilder;
use super::state::{MachinePhase, MachineState};
use crate::net::{HardwareId, LeaseSnapshot, LeaseTable};
use crate::runtime::constants::{guest, hypervisor, network};
use crate::runtime::{MachineConfig, MachineLayout, MachineOptions};
use crate::vmm::host_check::{self, HostSupport};
use crate::vmm::{
    HypervisorController, HypervisorHandler, LaunchSpec, ProcessStatus, XhyveController,
};

/// A single xhyve machine and its lifecycle.
pub struct Machine {
    config: MachineConfig,
    options: MachineOptions,
    layout: MachineLayout,
    state: MachineState,
    builder: ArtifactBuilder,
    controller: Arc<dyn HypervisorController>,
    lease_table: LeaseTable,
    /// Supervisor handle while a hypervisor process is expected to exist.
    handler: Option<Box<dyn HypervisorHandler>>,
}

impl Machine {
    /// Machine with default collaborators and poll policy.
    ///
    /// Resolves the hypervisor binary up front.
    pub fn new(config: MachineConfig) -> HyveliteResult<Self> {
        Self::with_options(config, MachineOptions::default())
    }

    pub fn with_options(config: MachineConfig, options: MachineOptions) -> HyveliteResult<Self> {
        let controller = XhyveController::new(&config.hypervisor_binary_name())?;
        Ok(Self::with_collaborators(
            config,
            options,
            ArtifactBuilder::default(),
            Arc::new(controller),
        ))
    }

    /// Machine with explicit collaborators.
    pub fn with_collaborators(
        config: MachineConfig,
        options: MachineOptions,
        builder: ArtifactBuilder,
        controller: Arc<dyn HypervisorController>,
    ) -> Self {
        let config = config.with_default_name();
        let layout = config.layout();
        let lease_table = LeaseTable::new(config.lease_file.clone());
        Self {
            config,
            options,
            layout,
            state: MachineState::new(),
            builder,
            controller,
            lease_table,
            handler: None,
        }
    }

    /// Rebuild the controller for a machine created earlier.
    ///
    /// Reads the persisted `state.json`. A recorded hypervisor PID is
    /// re-attached and checked on the next [`Machine::refresh`].
    pub fn load(
        config: MachineConfig,
        options: MachineOptions,
        builder: ArtifactBuilder,
        controller: Arc<dyn HypervisorController>,
    ) -> HyveliteResult<Self> {
        let mut machine = Self::with_collaborators(config, options, builder, controller);
        machine.config.validate()?;
        machine.state = MachineState::load(&machine.layout.state_path())?;
        if let Some(pid) = machine.state.pid {
            machine.handler = Some(machine.controller.attach(pid, &machine.state.uuid));
        }
        tracing::debug!(
            machine = %machine.config.machine_name,
            phase = %machine.state.phase,
            pid = ?machine.state.pid,
            "Loaded machine state"
        );
        Ok(machine)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn driver_name(&self) -> &'static str {
        hypervisor::DRIVER_NAME
    }

    pub fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn layout(&self) -> &MachineLayout {
        &self.layout
    }

    /// Recorded state, without querying the hypervisor.
    pub fn machine_state(&self) -> &MachineState {
        &self.state
    }

    /// Current phase, reconciled with the hypervisor process first.
    pub fn state(&mut self) -> MachinePhase {
        self.refresh().phase
    }

    /// Guest address. Only available while running.
    pub fn ip(&mut self) -> HyveliteResult<IpAddr> {
        let phase = self.state();
        match (phase, self.state.ip_address) {
            (MachinePhase::Running, Some(ip)) => Ok(ip),
            _ => Err(HyveliteError::InvalidState(format!(
                "machine '{}' is not running ({})",
                self.config.machine_name, phase
            ))),
        }
    }

    pub fn ssh_hostname(&mut self) -> HyveliteResult<String> {
        self.ip().map(|ip| ip.to_string())
    }

    pub fn ssh_port(&self) -> u16 {
        network::SSH_PORT
    }

    pub fn ssh_username(&self) -> &'static str {
        guest::SSH_USER
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.layout.ssh_key_path()
    }

    /// Docker daemon URL, empty while the guest has no address.
    pub fn url(&self) -> String {
        self.state.url()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate the configuration and the host before anything is written.
    pub fn pre_create_check(&self) -> HyveliteResult<HostSupport> {
        self.config.validate()?;
        host_check::check_host(&self.config)
    }

    /// Build artifacts, launch the hypervisor and wait for an address.
    ///
    /// On failure the machine is treated as never created: the phase stays
    /// `Absent` and a launched hypervisor is killed. Artifacts already on
    /// disk are left in place.
    pub async fn create(&mut self) -> HyveliteResult<()> {
        self.create_with_cancellation(&CancellationToken::new())
            .await
    }

    pub async fn create_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> HyveliteResult<()> {
        self.config.validate()?;
        if self.state.phase != MachinePhase::Absent || self.layout.state_path().exists() {
            return Err(HyveliteError::AlreadyExists(format!(
                "machine '{}' already exists",
                self.config.machine_name
            )));
        }

        tracing::info!(machine = %self.config.machine_name, "Creating VM...");
        let previous = self.state.clone();
        self.state.transition_to(MachinePhase::Provisioning)?;

        let uuid = match self.builder.build(&self.config, &self.layout).await {
            Ok(uuid) => uuid,
            Err(e) => {
                tracing::error!(machine = %self.config.machine_name, "Build failed: {}", e);
                self.restore(previous);
                return Err(e);
            }
        };
        self.state.uuid = uuid;

        if let Err(e) = self.boot(cancel).await {
            self.abort_boot(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Launch the hypervisor for a stopped machine and wait for an address.
    ///
    /// A running machine is left alone.
    pub async fn start(&mut self) -> HyveliteResult<()> {
        self.start_with_cancellation(&CancellationToken::new())
            .await
    }

    pub async fn start_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> HyveliteResult<()> {
        match self.state() {
            MachinePhase::Running => {
                tracing::debug!(machine = %self.config.machine_name, "Already running");
                return Ok(());
            }
            phase if phase.can_start() => {}
            phase => {
                return Err(HyveliteError::InvalidState(format!(
                    "cannot start machine '{}' while {}",
                    self.config.machine_name, phase
                )));
            }
        }

        let previous = self.state.clone();
        if let Err(e) = self.boot(cancel).await {
            self.abort_boot(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Ask the hypervisor to shut down and wait for it to exit.
    ///
    /// Stopping a stopped machine succeeds without doing anything. If the
    /// process outlives the stop timeout, fails with `ShutdownTimeout` and
    /// the machine stays `Running`.
    pub async fn stop(&mut self) -> HyveliteResult<()> {
        match self.state() {
            MachinePhase::Stopped => {
                tracing::debug!(machine = %self.config.machine_name, "Already stopped");
                return Ok(());
            }
            MachinePhase::Running | MachinePhase::Unknown => {}
            phase => {
                return Err(HyveliteError::InvalidState(format!(
                    "cannot stop machine '{}' while {}",
                    self.config.machine_name, phase
                )));
            }
        }

        tracing::info!(machine = %self.config.machine_name, "Stopping VM...");
        let previous = self.state.clone();
        self.transition(MachinePhase::Stopping)?;

        if let Err(e) = self.await_shutdown().await {
            tracing::warn!(machine = %self.config.machine_name, "Stop failed: {}", e);
            self.restore(previous);
            return Err(e);
        }

        self.handler = None;
        self.state.clear_runtime();
        self.transition(MachinePhase::Stopped)?;
        tracing::info!(machine = %self.config.machine_name, "VM stopped");
        Ok(())
    }

    /// Stop (when running) then start.
    pub async fn restart(&mut self) -> HyveliteResult<()> {
        if matches!(
            self.state(),
            MachinePhase::Running | MachinePhase::Unknown
        ) {
            self.stop().await?;
        }
        self.start().await
    }

    /// Force-terminate the hypervisor.
    ///
    /// Commits `Stopped` once the process is confirmed gone.
    pub async fn kill(&mut self) -> HyveliteResult<()> {
        match self.state() {
            MachinePhase::Stopped => return Ok(()),
            MachinePhase::Absent | MachinePhase::Provisioning | MachinePhase::Removed => {
                return Err(HyveliteError::InvalidState(format!(
                    "cannot kill machine '{}' while {}",
                    self.config.machine_name, self.state.phase
                )));
            }
            _ => {}
        }

        if let Some(handler) = self.handler.as_mut() {
            tracing::info!(machine = %self.config.machine_name, pid = handler.pid(), "Killing VM...");
            handler.kill()?;

            let deadline = Instant::now() + self.options.stop_timeout;
            while handler.status() != ProcessStatus::Exited {
                if Instant::now() >= deadline {
                    return Err(HyveliteError::ShutdownTimeout(self.options.stop_timeout));
                }
                tokio::time::sleep(self.options.stop_poll_interval).await;
            }
        }

        self.handler = None;
        self.state.clear_runtime();
        self.transition(MachinePhase::Stopped)
    }

    /// Stop the machine if needed and delete its artifacts.
    ///
    /// Ends in `Removed`. Removing an already removed machine succeeds.
    pub async fn remove(&mut self) -> HyveliteResult<()> {
        // The name picks the directory that gets deleted
        self.config.validate()?;

        match self.state() {
            MachinePhase::Removed => return Ok(()),
            MachinePhase::Absent => {
                if !self.layout.exists() {
                    return Err(HyveliteError::NotFound(format!(
                        "machine '{}' does not exist",
                        self.config.machine_name
                    )));
                }
                // Leftovers of a failed create
                self.delete_artifacts();
                return Ok(());
            }
            MachinePhase::Running | MachinePhase::Unknown => match self.stop().await {
                Ok(()) => {}
                Err(HyveliteError::ShutdownTimeout(timeout)) => {
                    tracing::warn!(
                        machine = %self.config.machine_name,
                        "VM did not stop within {:?}, killing",
                        timeout
                    );
                    self.kill().await?;
                }
                Err(e) => return Err(e),
            },
            phase if phase.is_active() => self.kill().await?,
            _ => {}
        }

        self.delete_artifacts();
        self.handler = None;
        self.state.clear_runtime();
        // The state file went with the artifact directory
        self.state.transition_to(MachinePhase::Removed)?;
        tracing::info!(machine = %self.config.machine_name, "VM removed");
        Ok(())
    }

    /// Reconcile the recorded phase with the hypervisor process.
    ///
    /// Never fails: a process that cannot be queried moves a running
    /// machine to `Unknown` instead of being assumed alive.
    pub fn refresh(&mut self) -> &MachineState {
        if self.handler.is_none()
            && let Some(pid) = self.state.pid
        {
            self.handler = Some(self.controller.attach(pid, &self.state.uuid));
        }

        let Some(status) = self.handler.as_mut().map(|h| h.status()) else {
            return &self.state;
        };

        use MachinePhase::*;
        let next = match (self.state.phase, status) {
            (Booting | Running | Stopping | Unknown, ProcessStatus::Exited) => Some(Stopped),
            (Running, ProcessStatus::Unknown) => Some(Unknown),
            (Unknown, ProcessStatus::Running) if self.state.ip_address.is_some() => Some(Running),
            _ => None,
        };

        if let Some(phase) = next {
            tracing::debug!(
                machine = %self.config.machine_name,
                from = %self.state.phase,
                to = %phase,
                "Hypervisor status changed"
            );
            if phase == Stopped {
                self.handler = None;
                self.state.clear_runtime();
            }
            if let Err(e) = self.transition(phase) {
                tracing::warn!(machine = %self.config.machine_name, "Failed to record state: {}", e);
            }
        }
        &self.state
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Launch (unless a live process exists) and poll for the guest address.
    async fn boot(&mut self, cancel: &CancellationToken) -> HyveliteResult<()> {
        if self.state.phase != MachinePhase::Booting {
            self.transition(MachinePhase::Booting)?;
        }

        let needs_launch = match self.handler.as_mut() {
            Some(handler) => handler.status() == ProcessStatus::Exited,
            None => true,
        };
        // Without a MAC only a table written after launch can hold our lease
        let since = (needs_launch && self.config.mac_address.is_none())
            .then(|| self.lease_table.snapshot());
        if needs_launch {
            tracing::info!(
                machine = %self.config.machine_name,
                cpus = self.config.effective_cpus(),
                memory_mb = self.config.memory_mb,
                "Starting VM..."
            );
            let spec = LaunchSpec::new(&self.config, &self.layout, self.state.uuid.clone());
            let handler = self
                .controller
                .launch(&spec, &self.layout.hypervisor_log_path())?;
            self.state.pid = Some(handler.pid());
            self.handler = Some(handler);
            self.persist()?;
        }

        tracing::info!(machine = %self.config.machine_name, "Waiting for VM to come online...");
        let ip = self.wait_for_address(since, cancel).await?;

        self.state.ip_address = Some(ip);
        self.transition(MachinePhase::Running)?;
        tracing::info!(machine = %self.config.machine_name, ip = %ip, "VM is online");
        Ok(())
    }

    /// Poll the lease table until the guest shows up.
    ///
    /// Fails fast if the hypervisor exits while we wait. With `since`, a
    /// table unchanged from that snapshot counts as having no lease.
    async fn wait_for_address(
        &mut self,
        since: Option<LeaseSnapshot>,
        cancel: &CancellationToken,
    ) -> HyveliteResult<IpAddr> {
        let hardware_id = match &self.config.mac_address {
            Some(mac) => HardwareId::Mac(mac.clone()),
            None => HardwareId::Latest,
        };
        let attempts = self.options.boot_poll_attempts.max(1);
        let interval = self.options.boot_poll_interval;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(HyveliteError::Cancelled);
            }

            if let Some(handler) = self.handler.as_mut()
                && handler.status() == ProcessStatus::Exited
            {
                return Err(ProcessError::Exited {
                    pid: handler.pid(),
                    status: format!(
                        "exited before the guest leased an address, see {}",
                        self.layout.hypervisor_log_path().display()
                    ),
                }
                .into());
            }

            let lookup = match &since {
                Some(snapshot) => self.lease_table.resolve_address_since(&hardware_id, snapshot),
                None => self.lease_table.resolve_address(&hardware_id),
            };
            match lookup {
                Ok(Some(ip)) => {
                    tracing::debug!(attempt, ip = %ip, "Found lease for {}", hardware_id);
                    return Ok(ip);
                }
                Ok(None) => {
                    tracing::debug!(attempt, "No lease yet for {}", hardware_id);
                }
                Err(HyveliteError::Address(e)) if e.is_transient() => {
                    tracing::debug!(attempt, "Lease lookup failed: {}", e);
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HyveliteError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        Err(AddressError::Timeout {
            attempts,
            waited: interval * (attempts - 1),
        }
        .into())
    }

    /// Send SIGTERM and wait, bounded by the stop timeout.
    async fn await_shutdown(&mut self) -> HyveliteResult<()> {
        let Some(handler) = self.handler.as_mut() else {
            return Ok(());
        };
        handler.shutdown()?;

        let deadline = Instant::now() + self.options.stop_timeout;
        loop {
            let status = handler.status();
            if status == ProcessStatus::Exited {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HyveliteError::ShutdownTimeout(self.options.stop_timeout));
            }
            tracing::debug!(pid = handler.pid(), ?status, "Waiting for hypervisor to exit");
            tokio::time::sleep(self.options.stop_poll_interval).await;
        }
    }

    /// Validate and apply a phase change, then persist it.
    fn transition(&mut self, phase: MachinePhase) -> HyveliteResult<()> {
        self.state.transition_to(phase)?;
        self.persist()
    }

    fn persist(&self) -> HyveliteResult<()> {
        if !self.layout.exists() {
            return Ok(());
        }
        self.state.save(&self.layout.state_path())
    }

    /// Put back the state recorded before a failed transition.
    fn restore(&mut self, previous: MachineState) {
        self.state = previous;
        if self.state.phase == MachinePhase::Absent {
            let path = self.layout.state_path();
            if path.exists()
                && let Err(e) = std::fs::remove_file(&path)
            {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        } else if let Err(e) = self.persist() {
            tracing::warn!(machine = %self.config.machine_name, "Failed to restore state: {}", e);
        }
    }

    /// Kill whatever a failed boot launched, then restore.
    fn abort_boot(&mut self, previous: MachineState) {
        if let Some(mut handler) = self.handler.take()
            && let Err(e) = handler.kill()
        {
            tracing::warn!(pid = handler.pid(), "Failed to kill hypervisor: {}", e);
        }
        self.restore(previous);
    }

    fn delete_artifacts(&self) {
        let dir = self.layout.artifact_dir();
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}
