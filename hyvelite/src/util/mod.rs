use std::path::{Path, PathBuf};

use hyvelite_shared::errors::{HyveliteError, HyveliteResult, ProcessError};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod process;

pub use process::{Liveness, is_process_alive, is_same_process, process_liveness};

/// Resolve a binary by path or by name on `PATH`.
///
/// # Returns
/// * `Ok(PathBuf)` - Absolute path to an executable
/// * `Err(...)` - Binary not found or not executable
pub fn find_binary(binary: &Path) -> HyveliteResult<PathBuf> {
    let found = which::which(binary).map_err(|e| {
        tracing::debug!(binary = %binary.display(), "Binary lookup failed: {}", e);
        ProcessError::BinaryNotFound {
            binary: binary.display().to_string(),
        }
    })?;
    tracing::debug!(binary = %found.display(), "Found binary");
    Ok(found)
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}

/// Initialize tracing with file logging.
///
/// Logs are written to `{logs_dir}/hyvelite.log` with daily rotation; the
/// filter comes from `RUST_LOG` and defaults to `info`.
/// Returns the WorkerGuard that keeps the background writer alive.
pub fn init_logging(logs_dir: &Path) -> HyveliteResult<WorkerGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        HyveliteError::Storage(format!(
            "failed to create logs dir {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "hyvelite.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    register_to_tracing(non_blocking, env_filter);
    Ok(guard)
}
