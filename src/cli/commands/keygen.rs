use std::path::Path;

use crate::adapters::keyrings::age_keyring::AgeKeyRing;
use crate::cli::output;
use crate::core::errors::{BackupError, Result};
use crate::core::models::recipient::Recipient;

/// Execute the `backup-cloud keygen` command.
///
/// Writes `<uid>.pub` (to upload into the key material folder) and
/// `<uid>.key` (to keep offline for restores) into `out`.
pub fn execute(uid: &str, out: &Path, quiet: bool) -> Result<()> {
    let recipient = Recipient::parse(uid, "generated key")?;
    if recipient.as_str().contains(['/', '\\']) {
        return Err(BackupError::InvalidConfig {
            detail: format!("identity '{recipient}' must not contain path separators"),
        });
    }

    let public_path = out.join(format!("{recipient}.pub"));
    let secret_path = out.join(format!("{recipient}.key"));
    for path in [&public_path, &secret_path] {
        if path.exists() {
            return Err(BackupError::InvalidConfig {
                detail: format!("{} already exists; refusing to overwrite", path.display()),
            });
        }
    }

    std::fs::create_dir_all(out)?;
    let (public_block, secret_block) = AgeKeyRing::generate_keypair(recipient.as_str());
    std::fs::write(&public_path, public_block)?;
    std::fs::write(&secret_path, secret_block)?;

    if !quiet {
        output::success(&format!("Public key: {}", public_path.display()));
        output::success(&format!("Private key: {}", secret_path.display()));
        output::detail("Upload the public key to <s3_path>/config/public-keys/.");
        output::detail("Keep the private key offline; it is the only way to restore.");
    }
    Ok(())
}
