use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::adapters::keyrings::KeyRingBackend;
use crate::cli::output;
use crate::core::errors::{BackupError, Result};

/// Execute the `backup-cloud decrypt` command.
///
/// Imports the private key into a throwaway keyring and streams the
/// plaintext to `out`, or to stdout when no output file is given.
pub fn execute(
    file: &Path,
    identity: &Path,
    out: Option<&Path>,
    backend: KeyRingBackend,
    quiet: bool,
) -> Result<()> {
    for path in [file, identity] {
        if !path.is_file() {
            return Err(BackupError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let keyring = backend.create(false)?;
    keyring.import_key(&std::fs::read(identity)?)?;

    let mut ciphertext = File::open(file)?;
    match out {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let mut staged = tempfile::NamedTempFile::new_in(dir)?;
            keyring.decrypt(&mut ciphertext, staged.as_file_mut())?;
            staged.persist(path).map_err(|e| BackupError::Io(e.error))?;
            if !quiet {
                output::success(&format!("Decrypted → {}", path.display()));
            }
        }
        None => {
            let mut stdout = io::stdout();
            keyring.decrypt(&mut ciphertext, &mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
