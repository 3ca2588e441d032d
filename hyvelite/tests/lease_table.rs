//! Lease table resolution against synthetic tables.

use std::net::{IpAddr, Ipv4Addr};

use hyvelite::HyveliteError;
use hyvelite::net::{HardwareId, LeaseTable, scan_leases};
use hyvelite_shared::errors::AddressError;
use hyvelite_test_utils::{TestContext, write_lease_record};
use proptest::prelude::*;

const MACS: &[&str] = &["a:b:c:d:e:f", "1:22:33:44:55:66", "aa:bb:cc:dd:ee:ff"];

fn render(records: &[(Ipv4Addr, usize)]) -> String {
    records
        .iter()
        .map(|(ip, mac)| {
            format!(
                "{{\n\tname=boot2docker\n\tip_address={}\n\thw_address=1,{}\n\tlease=0x5f3c2a1b\n}}\n",
                ip, MACS[*mac]
            )
        })
        .collect()
}

#[test]
fn test_resolve_from_file() {
    let ctx = TestContext::new();
    write_lease_record(&ctx.lease_file(), "first", "192.168.64.2", "a:b:c:d:e:f");
    write_lease_record(&ctx.lease_file(), "second", "192.168.64.3", "1:22:33:44:55:66");

    let table = LeaseTable::new(ctx.lease_file());
    let resolved = table
        .resolve_address(&HardwareId::Mac("01:22:33:44:55:66".into()))
        .unwrap();
    assert_eq!(resolved, Some("192.168.64.3".parse().unwrap()));

    assert_eq!(
        table
            .resolve_address(&HardwareId::Mac("de:ad:be:ef:0:1".into()))
            .unwrap(),
        None
    );
}

#[test]
fn test_table_is_reread_on_every_call() {
    let ctx = TestContext::new();
    let table = LeaseTable::new(ctx.lease_file());
    let mac = HardwareId::Mac("a:b:c:d:e:f".into());

    assert!(matches!(
        table.resolve_address(&mac),
        Err(HyveliteError::Address(AddressError::LeaseTableMissing { .. }))
    ));

    write_lease_record(&ctx.lease_file(), "vm", "192.168.64.2", "a:b:c:d:e:f");
    assert_eq!(
        table.resolve_address(&mac).unwrap(),
        Some("192.168.64.2".parse().unwrap())
    );

    write_lease_record(&ctx.lease_file(), "vm", "192.168.64.5", "a:b:c:d:e:f");
    assert_eq!(
        table.resolve_address(&mac).unwrap(),
        Some("192.168.64.5".parse().unwrap())
    );
}

proptest! {
    #[test]
    fn prop_last_record_for_mac_wins(
        records in prop::collection::vec((any::<u32>().prop_map(Ipv4Addr::from), 0..MACS.len()), 0..16),
        wanted in 0..MACS.len(),
    ) {
        let content = render(&records);
        let expected = records
            .iter()
            .rev()
            .find(|(_, mac)| *mac == wanted)
            .map(|(ip, _)| IpAddr::V4(*ip));

        let resolved = scan_leases(&content, &HardwareId::Mac(MACS[wanted].to_string())).unwrap();
        prop_assert_eq!(resolved, expected);
    }

    #[test]
    fn prop_latest_is_last_record(
        records in prop::collection::vec((any::<u32>().prop_map(Ipv4Addr::from), 0..MACS.len()), 0..16),
    ) {
        let content = render(&records);
        let expected = records.last().map(|(ip, _)| IpAddr::V4(*ip));
        prop_assert_eq!(scan_leases(&content, &HardwareId::Latest).unwrap(), expected);
    }
}
