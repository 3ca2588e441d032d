//! Host prerequisites for running xhyve machines.
//!
//! Checked before any artifacts are written so that a broken host fails
//! with a clear diagnostic instead of a half-built machine directory.

use std::process::Command;

use hyvelite_shared::{HyveliteError, HyveliteResult};

use crate::runtime::MachineConfig;
use crate::util;

/// Oldest VirtualBox major version that coexists with xhyve.
const MIN_VIRTUALBOX_MAJOR: u32 = 5;

const VBOXMANAGE: &str = "VBoxManage";

/// Result of a successful host check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSupport {
    /// Human-readable reason for support status
    pub reason: String,
}

/// Verify the host can run a machine described by `config`.
///
/// - The hypervisor binary must resolve to an executable.
/// - If VirtualBox is installed, it must be version 5 or newer; older
///   releases hold the VT-x lock and xhyve cannot start alongside them.
///
/// # Errors
///
/// Returns `HyveliteError::Process` when the binary is missing and
/// `HyveliteError::Unsupported` for an incompatible VirtualBox.
pub fn check_host(config: &MachineConfig) -> HyveliteResult<HostSupport> {
    let binary = util::find_binary(&config.hypervisor_binary_name())?;

    let vbox = match Command::new(VBOXMANAGE).arg("--version").output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        // Not installed, or not runnable
        _ => None,
    };

    if let Some(version) = vbox {
        if !virtualbox_version_supported(&version) {
            return Err(HyveliteError::Unsupported(format!(
                "VirtualBox {} is installed; xhyve requires VirtualBox {} or newer.\n\n\
                 Suggestions:\n\
                 - Upgrade VirtualBox\n\
                 - Or uninstall VirtualBox",
                version, MIN_VIRTUALBOX_MAJOR
            )));
        }
        tracing::debug!(version = %version, "Compatible VirtualBox detected");
    }

    Ok(HostSupport {
        reason: format!("hypervisor available at {}", binary.display()),
    })
}

/// Whether a `VBoxManage --version` string (e.g. `5.1.22r115126`) is new enough.
///
/// Unparsable versions are rejected.
pub fn virtualbox_version_supported(version: &str) -> bool {
    version
        .trim()
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= MIN_VIRTUALBOX_MAJOR)
}
