//! Configuration, constants, and on-disk layout.

pub mod constants;
pub mod layout;
pub mod options;

pub use layout::{FilesystemLayout, MachineLayout};
pub use options::{MachineConfig, MachineOptions};
