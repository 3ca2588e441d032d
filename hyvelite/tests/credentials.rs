//! Credential bundle layout as consumed by the guest's first-boot script.

use std::io::Read;

use hyvelite::HyveliteError;
use hyvelite::credentials::package_credentials;
use hyvelite_shared::constants::userdata;
use hyvelite_shared::errors::CredentialError;
use hyvelite_test_utils::{STUB_PUBLIC_KEY, TestContext};

#[test]
fn test_bundle_entries_in_guest_order() {
    let ctx = TestContext::new();
    let key = ctx.path().join("id_rsa.pub");
    std::fs::write(&key, STUB_PUBLIC_KEY).unwrap();
    let output = ctx.path().join("userdata.tar");

    package_credentials(&key, &output).unwrap();

    let file = std::fs::File::open(&output).unwrap();
    let mut archive = tar::Archive::new(file);
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
        let kind = entry.header().entry_type();
        let mode = entry.header().mode().unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((path, kind, mode, content));
    }

    assert_eq!(entries.len(), 4);

    assert_eq!(entries[0].0, userdata::MAGIC);
    assert!(entries[0].1.is_file());
    assert_eq!(entries[0].3, userdata::MAGIC.as_bytes());

    assert_eq!(entries[1].0, ".ssh");
    assert!(entries[1].1.is_dir());
    assert_eq!(entries[1].2 & 0o777, 0o700);

    assert_eq!(entries[2].0, ".ssh/authorized_keys");
    assert_eq!(entries[3].0, ".ssh/authorized_keys2");
    for entry in &entries[2..] {
        assert!(entry.1.is_file());
        assert_eq!(entry.3, STUB_PUBLIC_KEY.as_bytes());
    }
}

#[test]
fn test_missing_public_key() {
    let ctx = TestContext::new();
    let output = ctx.path().join("userdata.tar");

    let err = package_credentials(&ctx.path().join("id_rsa.pub"), &output).unwrap_err();
    assert!(matches!(
        err,
        HyveliteError::Credentials(CredentialError::MissingKeyMaterial { .. })
    ));
    assert!(!output.exists());
}
