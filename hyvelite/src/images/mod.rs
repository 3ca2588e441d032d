//! Boot image acquisition and payload extraction.

mod mount;
mod source;

pub use mount::{CommandMounter, VolumeMounter, extract_boot_payloads};
#[cfg(feature = "download")]
pub use source::HttpImageSource;
pub use source::{BootImageSource, ImageLocation, LocalImageSource};
