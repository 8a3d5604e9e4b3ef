use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::errors::Result;

/// Directory that holds a keyring's state.
///
/// Created fresh for every keyring. An ephemeral home is deleted when the
/// keyring is dropped, on every exit path; a retained one is left on disk
/// for debugging or for scripts that need the keyring afterwards.
#[derive(Debug)]
pub enum KeyRingHome {
    Ephemeral(TempDir),
    Retained(PathBuf),
}

impl KeyRingHome {
    pub fn create(retain: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("backup-keyring-").tempdir()?;
        if retain {
            Ok(Self::Retained(dir.keep()))
        } else {
            Ok(Self::Ephemeral(dir))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Ephemeral(dir) => dir.path(),
            Self::Retained(path) => path,
        }
    }
}
