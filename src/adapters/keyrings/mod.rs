pub mod age_keyring;
pub mod gpg_keyring;
pub mod home;

use std::path::Path;
use std::str::FromStr;

use crate::core::errors::{BackupError, Result};
use crate::core::traits::keyring::KeyRing;

use self::age_keyring::AgeKeyRing;
use self::gpg_keyring::GpgKeyRing;

/// Which keyring implementation a backup context is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRingBackend {
    #[default]
    Age,
    Gpg,
}

impl KeyRingBackend {
    /// Create an empty keyring of this kind in a fresh directory.
    pub fn create(self, retain: bool) -> Result<Box<dyn KeyRing>> {
        let keyring: Box<dyn KeyRing> = match self {
            KeyRingBackend::Age => Box::new(AgeKeyRing::create(retain)?),
            KeyRingBackend::Gpg => {
                if !GpgKeyRing::is_available(Path::new("gpg")) {
                    return Err(BackupError::InvalidConfig {
                        detail: "gpg backend selected but no gpg binary was found on PATH".into(),
                    });
                }
                Box::new(GpgKeyRing::create(retain)?)
            }
        };
        Ok(keyring)
    }
}

impl FromStr for KeyRingBackend {
    type Err = BackupError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "age" => Ok(KeyRingBackend::Age),
            "gpg" => Ok(KeyRingBackend::Gpg),
            other => Err(BackupError::InvalidConfig {
                detail: format!("Unknown cipher backend: '{other}'. Use 'age' or 'gpg'."),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_backends() {
        assert_eq!("age".parse::<KeyRingBackend>().unwrap(), KeyRingBackend::Age);
        assert_eq!("gpg".parse::<KeyRingBackend>().unwrap(), KeyRingBackend::Gpg);
        assert!(matches!(
            "pgp".parse::<KeyRingBackend>(),
            Err(BackupError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn created_keyring_starts_empty() {
        let ring = KeyRingBackend::Age.create(false).unwrap();
        assert_eq!(ring.name(), "age");
        assert!(ring.keys().unwrap().is_empty());
    }
}
