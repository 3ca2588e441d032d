//! SSH key pair generation.
//!
//! Key generation itself is delegated to `ssh-keygen`; the driver only needs
//! `<path>` and `<path>.pub` to exist afterwards.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use hyvelite_shared::errors::{BuildError, HyveliteResult};

/// Produces an SSH key pair at a given private key path.
///
/// Implementations must write the private key to `private_key_path` and the
/// public key next to it with a `.pub` suffix.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, private_key_path: &Path) -> HyveliteResult<()>;
}

/// Public key path for a private key path.
pub fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut path = private_key_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// [`KeyGenerator`] backed by the `ssh-keygen` binary.
#[derive(Debug, Clone)]
pub struct SshKeygen {
    binary: PathBuf,
    bits: u32,
}

impl SshKeygen {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            bits: 2048,
        }
    }
}

impl Default for SshKeygen {
    fn default() -> Self {
        Self::new("ssh-keygen")
    }
}

impl KeyGenerator for SshKeygen {
    fn generate(&self, private_key_path: &Path) -> HyveliteResult<()> {
        let key_err = |reason: String| BuildError::KeyGeneration {
            path: private_key_path.to_path_buf(),
            reason,
        };

        // ssh-keygen prompts before overwriting; start clean instead
        for path in [private_key_path.to_path_buf(), public_key_path(private_key_path)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| key_err(e.to_string()))?;
            }
        }

        let output = Command::new(&self.binary)
            .args(["-t", "rsa", "-b", &self.bits.to_string(), "-N", "", "-q", "-f"])
            .arg(private_key_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| key_err(format!("failed to run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(key_err(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }

        tracing::debug!(key = %private_key_path.display(), "Generated SSH key pair");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_path() {
        assert_eq!(
            public_key_path(Path::new("/m/dev/id_rsa")),
            PathBuf::from("/m/dev/id_rsa.pub")
        );
    }

    #[test]
    fn test_missing_binary_is_key_generation_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let keygen = SshKeygen::new("/nonexistent/ssh-keygen");

        let err = keygen.generate(&temp.path().join("id_rsa")).unwrap_err();
        assert!(err.to_string().contains("generate ssh key"));
    }
}
