//! Host DHCP lease table reader.
//!
//! The host's vmnet DHCP service appends records like:
//!
//! ```text
//! {
//!     name=boot2docker
//!     ip_address=192.168.64.3
//!     hw_address=1,be:2e:7:ef:c:95
//!     identifier=1,be:2e:7:ef:c:95
//!     lease=0x5f1a2b3c
//! }
//! ```
//!
//! The table is scanned as a flat sequence of lines with a single "last IP
//! seen" slot. Every matching `hw_address` line takes the slot's current value
//! as the candidate, so the last matching record in the file wins. Record
//! braces are not interpreted.
//!
//! The file is owned by the host; it is only ever opened for reading and is
//! re-read on every lookup.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use hyvelite_shared::errors::{AddressError, HyveliteResult};

use super::mac::normalize_mac;

const IP_DIRECTIVE: &str = "ip_address=";
const HW_DIRECTIVE: &str = "hw_address=";
/// ARP hardware type for Ethernet
const HW_TYPE_ETHERNET: &str = "1";

/// Which lease to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareId {
    /// Lease of a specific MAC address.
    Mac(String),
    /// Most recent lease in the table, whatever its MAC.
    Latest,
}

impl HardwareId {
    fn matches(&self, mac: &str) -> bool {
        match self {
            HardwareId::Mac(wanted) => normalize_mac(wanted) == normalize_mac(mac),
            HardwareId::Latest => true,
        }
    }
}

impl std::fmt::Display for HardwareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareId::Mac(mac) => write!(f, "{}", mac),
            HardwareId::Latest => write!(f, "<latest>"),
        }
    }
}

/// Fingerprint of the lease table content at one point in time.
///
/// Taken before a launch so that [`HardwareId::Latest`] is only trusted once
/// the host has written something since: a new lease or a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSnapshot(Option<u64>);

impl LeaseSnapshot {
    fn of(content: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self(Some(hasher.finish()))
    }
}

/// Read-only view of the host's lease table.
#[derive(Debug, Clone)]
pub struct LeaseTable {
    path: PathBuf,
}

impl LeaseTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve the IP address currently leased to `hardware_id`.
    ///
    /// Returns `Ok(None)` when the table has no lease for it.
    pub fn resolve_address(&self, hardware_id: &HardwareId) -> HyveliteResult<Option<IpAddr>> {
        let content = self.read()?;
        self.scan(&content, hardware_id)
    }

    /// Current fingerprint of the table. A missing or unreadable table
    /// has an empty fingerprint.
    pub fn snapshot(&self) -> LeaseSnapshot {
        self.read()
            .map(|content| LeaseSnapshot::of(&content))
            .unwrap_or(LeaseSnapshot(None))
    }

    /// Like [`resolve_address`](Self::resolve_address), but reports no lease
    /// while the table still matches `since`.
    pub fn resolve_address_since(
        &self,
        hardware_id: &HardwareId,
        since: &LeaseSnapshot,
    ) -> HyveliteResult<Option<IpAddr>> {
        let content = self.read()?;
        if LeaseSnapshot::of(&content) == *since {
            tracing::trace!(path = %self.path.display(), "Lease table unchanged");
            return Ok(None);
        }
        self.scan(&content, hardware_id)
    }

    fn read(&self) -> HyveliteResult<String> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                AddressError::LeaseTableMissing {
                    path: self.path.clone(),
                }
            } else {
                AddressError::LeaseTableUnreadable {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        Ok(content)
    }

    fn scan(&self, content: &str, hardware_id: &HardwareId) -> HyveliteResult<Option<IpAddr>> {
        let resolved = scan_leases(content, hardware_id)?;
        if let Some(ip) = resolved {
            tracing::debug!(%ip, %hardware_id, "IP found in DHCP lease table");
        }
        Ok(resolved)
    }
}

/// Scan lease table content for `hardware_id`.
pub fn scan_leases(
    content: &str,
    hardware_id: &HardwareId,
) -> Result<Option<IpAddr>, AddressError> {
    let mut last_ip: Option<IpAddr> = None;
    let mut matched: Option<(String, Option<IpAddr>)> = None;

    for line in content.lines() {
        let line = line.trim_start();

        if let Some(value) = line.strip_prefix(IP_DIRECTIVE) {
            match value.trim_end().parse::<IpAddr>() {
                Ok(ip) => last_ip = Some(ip),
                Err(_) => tracing::debug!(value, "Skipping unparsable ip_address directive"),
            }
            continue;
        }

        if let Some(value) = line.strip_prefix(HW_DIRECTIVE) {
            let Some((hw_type, mac)) = value.trim_end().split_once(',') else {
                continue;
            };
            if hw_type == HW_TYPE_ETHERNET && hardware_id.matches(mac) {
                matched = Some((mac.to_string(), last_ip));
            }
        }
    }

    match matched {
        None => Ok(None),
        Some((_, Some(ip))) => Ok(Some(ip)),
        Some((mac, None)) => Err(AddressError::NoAddressForLease { hardware_id: mac }),
    }
}
