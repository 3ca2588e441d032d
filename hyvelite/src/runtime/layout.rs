use crate::runtime::constants::filenames;
use hyvelite_shared::errors::{BuildError, HyveliteResult};
use std::path::{Path, PathBuf};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for hyvelite data
    pub const HYVELITE_DIR: &str = ".hyvelite";

    /// Subdirectory holding one artifact directory per machine
    pub const MACHINES_DIR: &str = "machines";
}

// ============================================================================
// FILESYSTEM LAYOUT (artifact root)
// ============================================================================

#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    root: PathBuf,
}

impl FilesystemLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a machine layout for a specific machine name.
    pub fn machine_layout(&self, machine_name: &str) -> MachineLayout {
        MachineLayout::new(self.root.join(machine_name), machine_name)
    }
}

// ============================================================================
// MACHINE LAYOUT (per-machine artifact directory)
// ============================================================================

/// Filesystem layout for a single machine's artifact directory.
///
/// ```text
/// <root>/<name>/
///   id_rsa, id_rsa.pub   SSH key pair
///   boot2docker.iso      boot image
///   vmlinuz64            extracted kernel
///   initrd.img           extracted ramdisk
///   <name>.img           blank backing disk
///   userdata.tar         credential bundle
///   boot-volume/         transient mount point
///   xhyve.log            hypervisor output
///   state.json           persisted machine state
/// ```
#[derive(Clone, Debug)]
pub struct MachineLayout {
    artifact_dir: PathBuf,
    machine_name: String,
}

impl MachineLayout {
    pub fn new(artifact_dir: PathBuf, machine_name: impl Into<String>) -> Self {
        Self {
            artifact_dir,
            machine_name: machine_name.into(),
        }
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::SSH_KEY)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::SSH_PUBLIC_KEY)
    }

    pub fn boot_image_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::BOOT_IMAGE)
    }

    pub fn kernel_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::KERNEL)
    }

    pub fn initrd_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::INITRD)
    }

    pub fn disk_image_path(&self) -> PathBuf {
        self.artifact_dir
            .join(filenames::disk_image(&self.machine_name))
    }

    pub fn userdata_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::USERDATA)
    }

    pub fn boot_volume_dir(&self) -> PathBuf {
        self.artifact_dir.join(filenames::BOOT_VOLUME_DIR)
    }

    pub fn hypervisor_log_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::HYPERVISOR_LOG)
    }

    pub fn state_path(&self) -> PathBuf {
        self.artifact_dir.join(filenames::STATE)
    }

    /// Whether the machine has any artifacts on disk.
    pub fn exists(&self) -> bool {
        self.artifact_dir.exists()
    }

    /// Create the artifact directory (`mkdir -p` semantics).
    pub fn prepare(&self) -> HyveliteResult<()> {
        std::fs::create_dir_all(&self.artifact_dir).map_err(|source| BuildError::Directory {
            path: self.artifact_dir.clone(),
            source,
        })?;
        Ok(())
    }
}
