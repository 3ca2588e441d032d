//! Boot image acquisition.
//!
//! The driver does not manage an image cache itself; it asks a
//! [`BootImageSource`] to place the image at a destination path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hyvelite_shared::errors::{BuildError, HyveliteResult};
use url::Url;

/// Places a boot image at a destination path.
#[async_trait]
pub trait BootImageSource: Send + Sync {
    async fn acquire(&self, url: &str, dest: &Path) -> HyveliteResult<()>;
}

/// Where a boot image reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    /// File on the local filesystem.
    Local(PathBuf),
    /// Remote resource to download.
    Remote(Url),
}

impl ImageLocation {
    /// Parse a boot image reference.
    ///
    /// Accepts `file://` URLs, `http(s)://` URLs, and plain paths.
    pub fn parse(reference: &str) -> HyveliteResult<Self> {
        let invalid = |reason: String| BuildError::ImageAcquisition {
            url: reference.to_string(),
            reason,
        };

        match Url::parse(reference) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(ImageLocation::Local)
                .map_err(|_| invalid("file URL has no usable path".into()).into()),
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(ImageLocation::Remote(url)),
            Ok(url) if url.scheme().len() > 1 => {
                Err(invalid(format!("unsupported scheme '{}'", url.scheme())).into())
            }
            // No scheme, or a Windows drive letter parsed as one
            _ => Ok(ImageLocation::Local(PathBuf::from(reference))),
        }
    }
}

/// [`BootImageSource`] for images already present on the host.
///
/// Remote URLs are rejected; the `download` feature (on by default)
/// provides `HttpImageSource` for those.
#[derive(Debug, Clone, Default)]
pub struct LocalImageSource;

#[async_trait]
impl BootImageSource for LocalImageSource {
    async fn acquire(&self, url: &str, dest: &Path) -> HyveliteResult<()> {
        let source = match ImageLocation::parse(url)? {
            ImageLocation::Local(path) => path,
            ImageLocation::Remote(_) => {
                return Err(BuildError::ImageAcquisition {
                    url: url.to_string(),
                    reason: "remote images need a downloading image source".into(),
                }
                .into());
            }
        };

        tracing::debug!(
            from = %source.display(),
            to = %dest.display(),
            "Copying boot image"
        );
        tokio::fs::copy(&source, dest)
            .await
            .map_err(|e| BuildError::ImageAcquisition {
                url: url.to_string(),
                reason: format!("copy {} failed: {}", source.display(), e),
            })?;
        Ok(())
    }
}

/// [`BootImageSource`] that downloads remote images and copies local ones.
#[cfg(feature = "download")]
#[derive(Debug, Clone, Default)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

#[cfg(feature = "download")]
impl HttpImageSource {
    /// Use a preconfigured HTTP client (proxies, timeouts, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "download")]
#[async_trait]
impl BootImageSource for HttpImageSource {
    async fn acquire(&self, url: &str, dest: &Path) -> HyveliteResult<()> {
        use tokio::io::AsyncWriteExt;

        let remote = match ImageLocation::parse(url)? {
            ImageLocation::Local(_) => return LocalImageSource.acquire(url, dest).await,
            ImageLocation::Remote(remote) => remote,
        };
        let fail = |reason: String| BuildError::ImageAcquisition {
            url: url.to_string(),
            reason,
        };

        tracing::info!(url = %remote, "Downloading boot image");
        let mut response = self
            .client
            .get(remote)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| fail(format!("create {}: {}", dest.display(), e)))?;
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| fail(format!("write {}: {}", dest.display(), e)))?;
        }
        file.flush()
            .await
            .map_err(|e| fail(format!("write {}: {}", dest.display(), e)))?;
        Ok(())
    }
}
