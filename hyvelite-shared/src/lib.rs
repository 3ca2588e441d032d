//! Hyvelite Shared - Contract between the host driver and the guest boot image
//!
//! This crate contains the error taxonomy used across the driver and the
//! constants and layouts the guest's first-boot scripts depend on.

pub mod constants;
pub mod errors;
pub mod layout;

pub use errors::{
    AddressError, BuildError, CredentialError, HyveliteError, HyveliteResult, ProcessError,
};
pub use layout::BootVolumeLayout;
