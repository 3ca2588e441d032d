//! Network identity discovery through the host's DHCP lease table.

mod lease;
mod mac;

pub use lease::{HardwareId, LeaseSnapshot, LeaseTable, scan_leases};
pub use mac::normalize_mac;
