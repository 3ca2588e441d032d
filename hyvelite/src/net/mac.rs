/// Normalize a MAC address for comparison.
///
/// The lease service writes octets without leading zeros (`be:2e:7:ef:c:95`)
/// while other tools pad them (`be:2e:07:ef:0c:95`). Both normalize to the
/// unpadded lowercase form.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim()
        .split(':')
        .map(|octet| {
            let trimmed = octet.trim_start_matches('0');
            let octet = if trimmed.is_empty() { "0" } else { trimmed };
            octet.to_ascii_lowercase()
        })
        .collect::<Vec<_>>()
        .join(":")
}
