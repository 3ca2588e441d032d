//! Hierarchical error types for the driver.
//!
//! Errors are categorized by the lifecycle step that produced them:
//! - [`BuildError`]: Artifact creation failures (abort `create`)
//! - [`CredentialError`]: Credential bundle packaging failures
//! - [`AddressError`]: Lease table lookups and boot address discovery
//! - [`ProcessError`]: Hypervisor process launch and supervision

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout hyvelite.
pub type HyveliteResult<T> = Result<T, HyveliteError>;

// ============================================================================
// Top-Level Error
// ============================================================================

/// Errors that can occur while driving a machine through its lifecycle.
///
/// ```ignore
/// match machine.create().await {
///     Err(HyveliteError::Build(_)) => { /* artifacts incomplete, nothing launched */ }
///     Err(HyveliteError::Address(_)) => { /* launched but never got an address */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Error)]
pub enum HyveliteError {
    /// Artifact creation failed.
    #[error("build: {0}")]
    Build(#[from] BuildError),

    /// Credential bundle could not be packaged.
    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),

    /// Network address could not be resolved.
    #[error("address: {0}")]
    Address(#[from] AddressError),

    /// Hypervisor process failed.
    #[error("process: {0}")]
    Process(#[from] ProcessError),

    /// Configuration rejected by validation.
    #[error("invalid config: {0}")]
    Config(String),

    /// Operation not allowed in the current lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Machine has no artifacts on disk.
    #[error("machine does not exist: {0}")]
    NotFound(String),

    /// Machine artifacts already exist.
    #[error("machine already exists: {0}")]
    AlreadyExists(String),

    /// Hypervisor process still alive after the stop timeout.
    #[error("machine did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    /// Host prerequisites are missing.
    #[error("unsupported host: {0}")]
    Unsupported(String),

    /// Operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Persisted machine state could not be read or written.
    #[error("storage: {0}")]
    Storage(String),

    /// Generic IO error (catch-all).
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Build Errors (artifact creation)
// ============================================================================

/// Errors during artifact creation. Each step fails with its own kind.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Boot image could not be acquired from its source.
    #[error("acquire boot image {url}: {reason}")]
    ImageAcquisition { url: String, reason: String },

    /// Artifact directory could not be created.
    #[error("create directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SSH key pair could not be generated.
    #[error("generate ssh key {}: {reason}", .path.display())]
    KeyGeneration { path: PathBuf, reason: String },

    /// Boot image could not be mounted.
    #[error("mount {}: {reason}", .image.display())]
    Mount { image: PathBuf, reason: String },

    /// A boot payload could not be copied out of the mounted image.
    #[error("copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Boot image volume could not be unmounted.
    #[error("unmount {}: {reason}", .mount_point.display())]
    Unmount { mount_point: PathBuf, reason: String },

    /// Blank disk image could not be written.
    #[error("allocate disk {}: {source}", .path.display())]
    DiskAllocation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Credential Errors (userdata bundle)
// ============================================================================

/// Errors while packaging the credential bundle.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Public key could not be read.
    #[error("missing key material {}: {source}", .path.display())]
    MissingKeyMaterial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive could not be assembled in memory.
    #[error("build archive: {0}")]
    Archive(#[source] io::Error),

    /// Archive could not be written to its final path.
    #[error("write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Address Errors (lease table)
// ============================================================================

/// Errors while resolving the machine's network address.
#[derive(Debug, Error)]
pub enum AddressError {
    /// Lease table does not exist (yet).
    #[error("lease table {} not found", .path.display())]
    LeaseTableMissing { path: PathBuf },

    /// Lease table exists but could not be read.
    #[error("read lease table {}: {source}", .path.display())]
    LeaseTableUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Hardware address matched but no IP directive preceded it.
    #[error("IP not found for MAC {hardware_id} in DHCP leases")]
    NoAddressForLease { hardware_id: String },

    /// Boot poll exhausted its retry budget.
    #[error("machine didn't return an IP after {attempts} attempts ({waited:?})")]
    Timeout { attempts: u32, waited: Duration },
}

impl AddressError {
    /// Whether retrying the lookup later may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AddressError::Timeout { .. })
    }
}

// ============================================================================
// Process Errors (hypervisor supervision)
// ============================================================================

/// Errors while launching or supervising the hypervisor process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Hypervisor binary could not be located.
    #[error("hypervisor binary '{binary}' not found")]
    BinaryNotFound { binary: String },

    /// Hypervisor process could not be spawned.
    #[error("spawn {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Hypervisor process exited while it was expected to run.
    #[error("hypervisor (pid {pid}) exited: {status}")]
    Exited { pid: u32, status: String },

    /// Signal delivery failed.
    #[error("send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: &'static str,
        #[source]
        source: io::Error,
    },

    /// Waiting on the process handle failed.
    #[error("wait on pid {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_errors_convert_to_top_level() {
        let err: HyveliteError = AddressError::NoAddressForLease {
            hardware_id: "aa:bb:cc:dd:ee:ff".into(),
        }
        .into();
        assert!(matches!(err, HyveliteError::Address(_)));
        assert_eq!(
            err.to_string(),
            "address: IP not found for MAC aa:bb:cc:dd:ee:ff in DHCP leases"
        );
    }

    #[test]
    fn test_build_error_messages_include_paths() {
        let err = BuildError::DiskAllocation {
            path: PathBuf::from("/tmp/dev.img"),
            source: io::Error::other("disk full"),
        };
        assert_eq!(err.to_string(), "allocate disk /tmp/dev.img: disk full");
    }

    #[test]
    fn test_timeout_is_not_transient() {
        let timeout = AddressError::Timeout {
            attempts: 60,
            waited: Duration::from_secs(120),
        };
        assert!(!timeout.is_transient());
        assert!(
            AddressError::LeaseTableMissing {
                path: PathBuf::from("/var/db/dhcpd_leases")
            }
            .is_transient()
        );
    }
}
