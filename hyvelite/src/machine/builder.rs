//! Artifact builder: everything a machine needs on disk before first boot.

use std::sync::Arc;
use std::time::Instant;

use hyvelite_shared::errors::HyveliteResult;
use uuid::Uuid;

use crate::credentials::{self, KeyGenerator, SshKeygen};
use crate::disk::{AllocationMode, DiskImage};
#[cfg(feature = "download")]
use crate::images::HttpImageSource;
#[cfg(not(feature = "download"))]
use crate::images::LocalImageSource;
use crate::images::{BootImageSource, CommandMounter, VolumeMounter};
use crate::runtime::{MachineConfig, MachineLayout};

/// Builds the per-machine artifact directory.
///
/// Runs once per machine, at creation. Each step fails with its own error
/// kind and nothing already written is rolled back.
#[derive(Clone)]
pub struct ArtifactBuilder {
    image_source: Arc<dyn BootImageSource>,
    mounter: Arc<dyn VolumeMounter>,
    keygen: Arc<dyn KeyGenerator>,
    allocation: AllocationMode,
}

impl ArtifactBuilder {
    pub fn new(
        image_source: Arc<dyn BootImageSource>,
        mounter: Arc<dyn VolumeMounter>,
        keygen: Arc<dyn KeyGenerator>,
    ) -> Self {
        Self {
            image_source,
            mounter,
            keygen,
            allocation: AllocationMode::default(),
        }
    }

    /// Use a different allocation mode for the backing disk.
    pub fn with_allocation(mut self, allocation: AllocationMode) -> Self {
        self.allocation = allocation;
        self
    }

    /// Build all artifacts for `config` under `layout`.
    ///
    /// # Returns
    /// * `Ok(String)` - Freshly generated instance identifier
    /// * `Err(...)` - First failing step
    pub async fn build(
        &self,
        config: &MachineConfig,
        layout: &MachineLayout,
    ) -> HyveliteResult<String> {
        let build_start = Instant::now();
        layout.prepare()?;

        tracing::info!(machine = %config.machine_name, "Copying boot image...");
        self.image_source
            .acquire(&config.boot_image_url, &layout.boot_image_path())
            .await?;

        tracing::info!(machine = %config.machine_name, "Creating SSH key...");
        self.keygen.generate(&layout.ssh_key_path())?;

        tracing::info!(machine = %config.machine_name, "Extracting vmlinuz64 and initrd.img...");
        let mount_point = layout.boot_volume_dir();
        let payloads = [
            (
                config.boot_volume.kernel_in(&mount_point),
                layout.kernel_path(),
            ),
            (
                config.boot_volume.initrd_in(&mount_point),
                layout.initrd_path(),
            ),
        ];
        crate::images::extract_boot_payloads(
            self.mounter.as_ref(),
            &layout.boot_image_path(),
            &mount_point,
            &payloads,
        )?;

        credentials::package_credentials(&layout.public_key_path(), &layout.userdata_path())?;

        tracing::info!(
            machine = %config.machine_name,
            size_mb = config.disk_size_mb,
            "Creating disk image..."
        );
        DiskImage::allocate_mb(&layout.disk_image_path(), config.disk_size_mb, self.allocation)?;

        let uuid = Uuid::new_v4().to_string();
        tracing::debug!(
            machine = %config.machine_name,
            uuid = %uuid,
            build_duration_ms = build_start.elapsed().as_millis(),
            "Artifacts built"
        );
        Ok(uuid)
    }
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        #[cfg(feature = "download")]
        let image_source: Arc<dyn BootImageSource> = Arc::new(HttpImageSource::default());
        #[cfg(not(feature = "download"))]
        let image_source: Arc<dyn BootImageSource> = Arc::new(LocalImageSource);

        Self::new(
            image_source,
            Arc::new(CommandMounter),
            Arc::new(SshKeygen::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::test_support::TestContext;
    use hyvelite_shared::errors::{BuildError, HyveliteError};

    #[tokio::test]
    async fn test_build_produces_all_artifacts() {
        let ctx = TestContext::new();
        let config = ctx.config();
        let layout = config.layout();

        let uuid = ctx.builder().build(&config, &layout).await.unwrap();
        assert!(Uuid::parse_str(&uuid).is_ok());

        for path in [
            layout.ssh_key_path(),
            layout.public_key_path(),
            layout.boot_image_path(),
            layout.userdata_path(),
        ] {
            assert!(path.is_file(), "missing {}", path.display());
        }
        assert_eq!(std::fs::read_to_string(layout.kernel_path()).unwrap(), "boot/vmlinuz64");
        assert_eq!(std::fs::read_to_string(layout.initrd_path()).unwrap(), "boot/initrd.img");
        assert_eq!(
            std::fs::metadata(layout.disk_image_path()).unwrap().len(),
            2 * 1_048_576
        );
        assert!(!layout.boot_volume_dir().exists());
    }

    #[tokio::test]
    async fn test_build_generates_distinct_uuids() {
        let ctx = TestContext::new();
        let config = ctx.config();
        let layout = config.layout();
        let builder = ctx.builder();

        let first = builder.build(&config, &layout).await.unwrap();
        let second = builder.build(&config, &layout).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_build_fails_on_missing_image() {
        let ctx = TestContext::new();
        let mut config = ctx.config();
        config.boot_image_url = "/nonexistent/boot2docker.iso".into();
        let layout = config.layout();

        let err = ctx.builder().build(&config, &layout).await.unwrap_err();
        assert!(matches!(
            err,
            HyveliteError::Build(BuildError::ImageAcquisition { .. })
        ));
        assert!(!layout.disk_image_path().exists());
    }
}
