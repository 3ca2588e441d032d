//! hyvelite - lifecycle driver for xhyve virtual machines.
//!
//! Builds a machine's boot artifacts, launches the hypervisor, discovers the
//! guest's address through the host DHCP lease table and drives the
//! stop/restart/remove lifecycle.
//!
//! ```no_run
//! use hyvelite::{Machine, MachineConfig};
//!
//! # async fn run() -> hyvelite::HyveliteResult<()> {
//! let config = MachineConfig::new("dev", "/tmp/machines");
//! let mut machine = Machine::new(config)?;
//! machine.pre_create_check()?;
//! machine.create().await?;
//! println!("{}", machine.url());
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod disk;
pub mod images;
pub mod machine;
pub mod net;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod util;
pub mod vmm;

pub use hyvelite_shared::errors::{HyveliteError, HyveliteResult};
pub use machine::{ArtifactBuilder, Machine, MachinePhase, MachineState};
pub use runtime::{MachineConfig, MachineOptions};
pub use vmm::ProcessStatus;
