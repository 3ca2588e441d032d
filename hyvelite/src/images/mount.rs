//! Boot image volume mounting.

use std::path::{Path, PathBuf};
use std::process::Command;

use hyvelite_shared::errors::{BuildError, HyveliteResult};

/// Attaches a boot image as a read-only volume at a chosen mount point.
pub trait VolumeMounter: Send + Sync {
    fn mount(&self, image: &Path, mount_point: &Path) -> HyveliteResult<()>;
    fn unmount(&self, mount_point: &Path) -> HyveliteResult<()>;
}

/// [`VolumeMounter`] using the host's mount tooling.
///
/// - **macOS**: `hdiutil attach -readonly -nobrowse -mountpoint` / `hdiutil detach`
/// - **other**: `mount -o loop,ro` / `umount`
#[derive(Debug, Clone, Default)]
pub struct CommandMounter;

impl CommandMounter {
    fn mount_command(image: &Path, mount_point: &Path) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("hdiutil");
            cmd.args(["attach", "-readonly", "-nobrowse", "-mountpoint"])
                .arg(mount_point)
                .arg(image);
            cmd
        } else {
            let mut cmd = Command::new("mount");
            cmd.args(["-o", "loop,ro"]).arg(image).arg(mount_point);
            cmd
        }
    }

    fn unmount_command(mount_point: &Path) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("hdiutil");
            cmd.arg("detach").arg(mount_point);
            cmd
        } else {
            let mut cmd = Command::new("umount");
            cmd.arg(mount_point);
            cmd
        }
    }
}

/// Run a command, turning spawn failures and non-zero exits into a message.
fn run(mut cmd: Command) -> Result<(), String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .map_err(|e| format!("failed to run {}: {}", program, e))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

impl VolumeMounter for CommandMounter {
    fn mount(&self, image: &Path, mount_point: &Path) -> HyveliteResult<()> {
        tracing::debug!(
            image = %image.display(),
            mount_point = %mount_point.display(),
            "Mounting boot image"
        );
        run(Self::mount_command(image, mount_point)).map_err(|reason| BuildError::Mount {
            image: image.to_path_buf(),
            reason,
        })?;
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> HyveliteResult<()> {
        tracing::debug!(mount_point = %mount_point.display(), "Unmounting boot image");
        run(Self::unmount_command(mount_point)).map_err(|reason| BuildError::Unmount {
            mount_point: mount_point.to_path_buf(),
            reason,
        })?;
        Ok(())
    }
}

/// Copy the kernel and initrd out of a mounted boot image.
///
/// The volume is unmounted whether or not the copies succeed. An unmount
/// failure is logged and does not undo copies that already landed.
pub fn extract_boot_payloads(
    mounter: &dyn VolumeMounter,
    image: &Path,
    mount_point: &Path,
    payloads: &[(PathBuf, PathBuf)],
) -> HyveliteResult<()> {
    std::fs::create_dir_all(mount_point).map_err(|source| BuildError::Directory {
        path: mount_point.to_path_buf(),
        source,
    })?;

    mounter.mount(image, mount_point)?;

    let copied = payloads.iter().try_for_each(|(from, to)| {
        tracing::debug!(from = %from.display(), to = %to.display(), "Extracting boot payload");
        std::fs::copy(from, to)
            .map(|_| ())
            .map_err(|source| BuildError::Copy {
                from: from.clone(),
                to: to.clone(),
                source,
            })
    });

    if let Err(e) = mounter.unmount(mount_point) {
        tracing::warn!("Failed to unmount boot image: {}", e);
    } else if let Err(e) = std::fs::remove_dir(mount_point) {
        tracing::debug!("Failed to remove mount point {}: {}", mount_point.display(), e);
    }

    copied?;
    Ok(())
}
