//! Blank backing disk allocation.
//!
//! The hypervisor's virtio-blk device consumes the image unmodified, so its
//! byte size is a hard contract: exactly `blocks * block_size`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hyvelite_shared::errors::{BuildError, HyveliteResult};

use super::constants::raw::BLOCK_SIZE;

/// How the blank image's blocks are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationMode {
    /// Extend the file without writing data (holes read back as zeros).
    #[default]
    Sparse,
    /// Write every block with zeros, like `dd if=/dev/zero`.
    Zeroed,
}

/// A raw disk image on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskImage {
    path: PathBuf,
    size_bytes: u64,
}

impl DiskImage {
    /// Allocate a blank image of `blocks` blocks of `block_size` bytes.
    ///
    /// Truncates any existing file at `path`.
    pub fn allocate(
        path: &Path,
        blocks: u64,
        block_size: u64,
        mode: AllocationMode,
    ) -> HyveliteResult<Self> {
        let size_bytes = blocks.checked_mul(block_size).ok_or_else(|| {
            BuildError::DiskAllocation {
                path: path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{blocks} blocks of {block_size} bytes overflow the image size"),
                ),
            }
        })?;

        let write = || -> io::Result<()> {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            match mode {
                AllocationMode::Sparse => file.set_len(size_bytes)?,
                AllocationMode::Zeroed => write_zero_blocks(file, blocks, block_size)?,
            }
            Ok(())
        };

        write().map_err(|source| BuildError::DiskAllocation {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            size_bytes,
            ?mode,
            "Allocated blank disk image"
        );

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes,
        })
    }

    /// Allocate a blank image of `size_mb` MiB using 1 MiB blocks.
    pub fn allocate_mb(path: &Path, size_mb: u64, mode: AllocationMode) -> HyveliteResult<Self> {
        Self::allocate(path, size_mb, BLOCK_SIZE, mode)
    }

    /// Get the disk path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the image size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

fn write_zero_blocks(mut file: File, blocks: u64, block_size: u64) -> io::Result<()> {
    let block = vec![0u8; block_size as usize];
    for _ in 0..blocks {
        file.write_all(&block)?;
    }
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyvelite_shared::HyveliteError;
    use tempfile::TempDir;

    #[test]
    fn test_sparse_allocation_exact_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dev.img");

        let disk = DiskImage::allocate_mb(&path, 500, AllocationMode::Sparse).unwrap();

        assert_eq!(disk.size_bytes(), 500 * 1_048_576);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 500 * 1_048_576);
    }

    #[test]
    fn test_zeroed_allocation_writes_zeros() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small.img");

        DiskImage::allocate(&path, 3, 4096, AllocationMode::Zeroed).unwrap();

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content.len(), 3 * 4096);
        assert!(content.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_allocation_truncates_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dev.img");
        std::fs::write(&path, vec![0xffu8; 8192]).unwrap();

        DiskImage::allocate(&path, 1, 1024, AllocationMode::Sparse).unwrap();

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content, vec![0u8; 1024]);
    }

    #[test]
    fn test_allocation_rejects_overflowing_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dev.img");

        let err = DiskImage::allocate_mb(&path, u64::MAX / 1024, AllocationMode::Sparse).unwrap_err();
        assert!(matches!(
            err,
            HyveliteError::Build(BuildError::DiskAllocation { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_allocation_failure_is_build_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing-dir").join("dev.img");

        let err = DiskImage::allocate_mb(&path, 1, AllocationMode::Sparse).unwrap_err();
        assert!(matches!(
            err,
            HyveliteError::Build(BuildError::DiskAllocation { .. })
        ));
    }
}
