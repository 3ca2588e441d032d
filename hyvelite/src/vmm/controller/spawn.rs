//! Subprocess spawning for the hypervisor binary.

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use hyvelite_shared::errors::{HyveliteResult, ProcessError};

/// Spawns the hypervisor detached from our standard streams.
///
/// stdout and stderr both go to `log_path` for post-mortem diagnostics.
///
/// # Arguments
/// * `binary_path` - Resolved hypervisor binary
/// * `args` - Full argument vector (see [`crate::vmm::LaunchSpec::to_args`])
/// * `log_path` - File receiving the hypervisor's output (truncated)
pub(super) fn spawn_subprocess(
    binary_path: &Path,
    args: &[String],
    log_path: &Path,
) -> HyveliteResult<Child> {
    let spawn_err = |source| ProcessError::Spawn {
        binary: binary_path.to_path_buf(),
        source,
    };

    let stdout = File::create(log_path).map_err(spawn_err)?;
    let stderr = stdout.try_clone().map_err(spawn_err)?;

    let mut cmd = Command::new(binary_path);
    cmd.args(args);

    // Pass RUST_LOG to subprocess if set
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        cmd.env("RUST_LOG", rust_log);
    }

    // stdin: prevents the serial console from reading the parent's terminal
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(stdout));
    cmd.stderr(Stdio::from(stderr));

    let child = cmd.spawn().map_err(|e| {
        tracing::error!(
            "Failed to spawn hypervisor at {}: {}",
            binary_path.display(),
            e
        );
        spawn_err(e)
    })?;
    Ok(child)
}
