//! Guest credentials: SSH key pair and the first-boot credential bundle.

mod bundle;
mod keygen;

pub use bundle::package_credentials;
pub use keygen::{KeyGenerator, SshKeygen, public_key_path};
