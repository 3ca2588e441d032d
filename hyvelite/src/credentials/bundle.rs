//! Credential bundle (`userdata.tar`) packaging.
//!
//! The guest's automount script reads the archive sequentially at first boot:
//!
//! ```text
//! 1. "<MAGIC>"                 regular file, content == name
//! 2. ".ssh/"                   directory, mode 0700
//! 3. ".ssh/authorized_keys"    public key
//! 4. ".ssh/authorized_keys2"   public key (legacy alias)
//! ```
//!
//! The sentinel must come first: its presence is what makes the guest
//! format the data volume.

use std::io::Write;
use std::path::Path;

use hyvelite_shared::constants::userdata;
use hyvelite_shared::errors::{CredentialError, HyveliteResult};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;

/// Package the public key at `public_key_path` into a credential bundle
/// written atomically to `output_path`.
pub fn package_credentials(public_key_path: &Path, output_path: &Path) -> HyveliteResult<()> {
    let public_key = std::fs::read(public_key_path).map_err(|source| {
        CredentialError::MissingKeyMaterial {
            path: public_key_path.to_path_buf(),
            source,
        }
    })?;

    let archive = build_archive(&public_key).map_err(CredentialError::Archive)?;
    write_atomic(output_path, &archive)?;

    tracing::debug!(
        output = %output_path.display(),
        key_bytes = public_key.len(),
        archive_bytes = archive.len(),
        "Wrote credential bundle"
    );
    Ok(())
}

/// Assemble the archive in memory.
pub(crate) fn build_archive(public_key: &[u8]) -> std::io::Result<Vec<u8>> {
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;
    let mut builder = Builder::new(Vec::new());

    let magic = userdata::MAGIC.as_bytes();
    let mut header = file_header(magic.len() as u64, mtime);
    builder.append_data(&mut header, userdata::MAGIC, magic)?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(userdata::SSH_DIR_MODE);
    header.set_size(0);
    header.set_mtime(mtime);
    builder.append_data(&mut header, userdata::SSH_DIR, std::io::empty())?;

    for name in [userdata::AUTHORIZED_KEYS, userdata::AUTHORIZED_KEYS2] {
        let mut header = file_header(public_key.len() as u64, mtime);
        builder.append_data(&mut header, name, public_key)?;
    }

    builder.into_inner()
}

fn file_header(size: u64, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(userdata::FILE_MODE);
    header.set_size(size);
    header.set_mtime(mtime);
    header
}

/// Write through a temp file in the destination directory, then rename.
fn write_atomic(output_path: &Path, data: &[u8]) -> HyveliteResult<()> {
    let to_write_err = |source| CredentialError::Write {
        path: output_path.to_path_buf(),
        source,
    };

    let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(to_write_err)?;
    temp.write_all(data).map_err(to_write_err)?;
    temp.as_file().sync_all().map_err(to_write_err)?;
    temp.persist(output_path)
        .map_err(|e| to_write_err(e.error))?;
    Ok(())
}
