//! Process liveness and identity checks by PID.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Liveness of a process as observable from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Gone,
    /// The process exists but we may not signal it.
    Indeterminate,
}

/// Check whether a process with the given PID exists.
///
/// Uses `kill(pid, 0)`, which delivers no signal.
pub fn process_liveness(pid: u32) -> Liveness {
    let Ok(raw) = i32::try_from(pid) else {
        return Liveness::Gone;
    };
    if raw <= 0 {
        return Liveness::Gone;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Liveness::Alive,
        Err(Errno::ESRCH) => Liveness::Gone,
        Err(_) => Liveness::Indeterminate,
    }
}

/// Check if a process with the given PID exists.
pub fn is_process_alive(pid: u32) -> bool {
    process_liveness(pid) == Liveness::Alive
}

/// Verify that a PID still belongs to the hypervisor launched with `instance_id`.
///
/// Guards against PID reuse after the original process exited. The
/// hypervisor is always launched with its instance UUID as an argument.
///
/// * **Linux**: `/proc/{pid}/cmdline` must contain `instance_id` as an argument
/// * **macOS**: the process arguments reported by `sysinfo` must contain it
/// * **other**: falls back to plain liveness
pub fn is_same_process(pid: u32, instance_id: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        is_same_process_linux(pid, instance_id)
    }

    #[cfg(target_os = "macos")]
    {
        is_same_process_macos(pid, instance_id)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = instance_id;
        is_process_alive(pid)
    }
}

#[cfg(target_os = "linux")]
fn is_same_process_linux(pid: u32, instance_id: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/cmdline", pid)) {
        // cmdline is NUL-separated
        Ok(cmdline) => cmdline.split('\0').any(|arg| arg == instance_id),
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
fn is_same_process_macos(pid: u32, instance_id: &str) -> bool {
    use sysinfo::{Pid, ProcessRefreshKind, System};

    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if !sys.refresh_process_specifics(pid, ProcessRefreshKind::everything()) {
        return false;
    }

    sys.process(pid)
        .is_some_and(|process| process.cmd().iter().any(|arg| arg == instance_id))
}
