use std::io::{Read, Write};
use std::path::Path;

use crate::core::errors::{BackupError, Result};
use crate::core::models::recipient::Recipient;

/// A key held by a keyring together with its primary user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyListing {
    /// Backend-specific key id (fingerprint).
    pub key_id: String,
    /// Primary identity string, unvalidated.
    pub uid: String,
}

/// Port for the OpenPGP-style encryption capability.
///
/// Implementations live in `adapters::keyrings` (e.g. AgeKeyRing, GpgKeyRing).
/// A keyring is backed by its own directory and is only mutated while it is
/// being bootstrapped; afterwards it is shared read-only between runs.
pub trait KeyRing: Send + Sync {
    /// Import one blob of key material. Returns the key id.
    fn import_key(&self, material: &[u8]) -> Result<String>;

    /// All keys currently in the keyring.
    fn keys(&self) -> Result<Vec<KeyListing>>;

    /// Encrypt `plaintext` for `recipients`, always trusting imported keys
    /// and never signing. Streams into `sink` without buffering the input.
    fn encrypt(
        &self,
        recipients: &[Recipient],
        plaintext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()>;

    /// Decrypt with whatever private material was imported.
    fn decrypt(
        &self,
        ciphertext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()>;

    /// Directory holding the keyring state.
    fn home(&self) -> &Path;

    /// Human-readable name of this backend (e.g. "age", "gpg").
    fn name(&self) -> &str;
}

/// Every key in `known` that carries one of `recipients` as its exact uid.
///
/// Several keys may share a uid; all of them are returned so that every
/// holder can decrypt. A recipient with no key fails with `UnknownRecipient`.
pub fn keys_for_recipients<'k, K>(
    known: &'k [K],
    recipients: &[Recipient],
    uid: impl Fn(&K) -> &str,
) -> Result<Vec<&'k K>> {
    if recipients.is_empty() {
        return Err(BackupError::NoRecipients);
    }
    let mut selected = Vec::new();
    for wanted in recipients {
        let before = selected.len();
        selected.extend(known.iter().filter(|key| uid(*key).trim() == wanted.as_str()));
        if selected.len() == before {
            return Err(BackupError::UnknownRecipient {
                identity: wanted.to_string(),
            });
        }
    }
    Ok(selected)
}
