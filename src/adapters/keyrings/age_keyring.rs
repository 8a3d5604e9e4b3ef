use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use age::secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use super::home::KeyRingHome;
use crate::core::errors::{BackupError, ConduitError, Result};
use crate::core::models::recipient::Recipient;
use crate::core::traits::keyring::{KeyListing, KeyRing, keys_for_recipients};

const UID_PREFIX: &str = "# uid:";
const PUBLIC_PREFIX: &str = "age1";
const SECRET_PREFIX: &str = "AGE-SECRET-KEY-";

/// Age keyring using X25519 + ChaCha20-Poly1305 with ASCII-armored output.
///
/// Every imported key is stored as one file in the keyring directory,
/// named after a fingerprint of its recipient string:
///
/// ```text
/// <home>/<key id>.pub   "# uid: <identity>" + the age1... recipient
/// <home>/<key id>.key   the secret block, only when private material was imported
/// ```
///
/// Key material is the text block written by [`AgeKeyRing::generate_keypair`]:
/// ```text
/// # uid: backup-Xk3j9aQ01z
/// # created: 2026-10-16T09:00:00Z
/// age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p
/// ```
#[derive(Debug)]
pub struct AgeKeyRing {
    home: KeyRingHome,
}

/// Parsed key material.
struct Material {
    uid: String,
    recipient: age::x25519::Recipient,
    secret: Option<age::x25519::Identity>,
}

impl AgeKeyRing {
    /// Create an empty keyring in a fresh temporary directory.
    pub fn create(retain: bool) -> Result<Self> {
        Ok(Self {
            home: KeyRingHome::create(retain)?,
        })
    }

    /// Generate a new X25519 key pair for `uid`.
    ///
    /// Returns `(public_block, secret_block)`; the public block is what
    /// goes into the key material folder, the secret block stays with the
    /// person who must be able to restore backups.
    pub fn generate_keypair(uid: &str) -> (String, String) {
        let identity = age::x25519::Identity::generate();
        let public_key = identity.to_public().to_string();
        let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

        let public_block = format!("{UID_PREFIX} {uid}\n# created: {created}\n{public_key}\n");
        let secret_block = format!(
            "{UID_PREFIX} {uid}\n# created: {created}\n# public key: {public_key}\n{}\n",
            identity.to_string().expose_secret()
        );
        (public_block, secret_block)
    }

    fn parse_material(material: &[u8]) -> Result<Material> {
        let text = std::str::from_utf8(material).map_err(|_| BackupError::KeyImportFailed {
            reason: "key material is not UTF-8 text".into(),
        })?;

        let mut uid = String::new();
        let mut recipient = None;
        let mut secret = None;

        for line in text.lines().map(str::trim) {
            if let Some(value) = line.strip_prefix(UID_PREFIX) {
                if uid.is_empty() {
                    uid = value.trim().to_string();
                }
            } else if line.starts_with(PUBLIC_PREFIX) && recipient.is_none() {
                let parsed = line.parse::<age::x25519::Recipient>().map_err(|e: &str| {
                    BackupError::KeyImportFailed {
                        reason: format!("invalid age recipient: {e}"),
                    }
                })?;
                recipient = Some(parsed);
            } else if line.starts_with(SECRET_PREFIX) && secret.is_none() {
                let parsed = line.parse::<age::x25519::Identity>().map_err(|e: &str| {
                    BackupError::KeyImportFailed {
                        reason: format!("invalid age secret key: {e}"),
                    }
                })?;
                secret = Some(parsed);
            }
        }

        let recipient = match (&secret, recipient) {
            (Some(identity), _) => identity.to_public(),
            (None, Some(recipient)) => recipient,
            (None, None) => {
                return Err(BackupError::KeyImportFailed {
                    reason: "no age1... recipient or AGE-SECRET-KEY-... line found".into(),
                });
            }
        };

        Ok(Material {
            uid,
            recipient,
            secret,
        })
    }

    fn key_id(recipient: &age::x25519::Recipient) -> String {
        let digest = format!("{:x}", Sha256::digest(recipient.to_string().as_bytes()));
        digest[..16].to_uppercase()
    }

    fn key_files(&self, extension: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.home.path())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Public keys as `(listing, recipient)` pairs.
    fn public_keys(&self) -> Result<Vec<(KeyListing, age::x25519::Recipient)>> {
        self.key_files("pub")?
            .into_iter()
            .map(|path| {
                let key_id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let material = Self::parse_material(&std::fs::read(&path)?)?;
                Ok((
                    KeyListing {
                        key_id,
                        uid: material.uid,
                    },
                    material.recipient,
                ))
            })
            .collect()
    }

    fn secret_keys(&self) -> Result<Vec<age::x25519::Identity>> {
        self.key_files("key")?
            .into_iter()
            .filter_map(|path| match std::fs::read(&path) {
                Ok(bytes) => Self::parse_material(&bytes).map(|m| m.secret).transpose(),
                Err(e) => Some(Err(e.into())),
            })
            .collect()
    }

    /// Map each requested identity onto every imported key carrying it.
    fn resolve(&self, recipients: &[Recipient]) -> Result<Vec<age::x25519::Recipient>> {
        let known = self.public_keys()?;
        let selected =
            keys_for_recipients(&known, recipients, |(listing, _)| listing.uid.as_str())?;
        Ok(selected
            .into_iter()
            .map(|(_, recipient)| recipient.clone())
            .collect())
    }
}

/// Keep conduit signals intact; everything else is an encryption failure.
fn stream_failure(err: io::Error, what: &str) -> BackupError {
    match ConduitError::from_io(&err) {
        Some(signal) => BackupError::Conduit(signal),
        None => BackupError::EncryptionFailed {
            reason: format!("{what}: {err}"),
        },
    }
}

impl KeyRing for AgeKeyRing {
    fn import_key(&self, material: &[u8]) -> Result<String> {
        let parsed = Self::parse_material(material)?;
        let key_id = Self::key_id(&parsed.recipient);
        let home = self.home.path();

        std::fs::write(
            home.join(format!("{key_id}.pub")),
            format!("{UID_PREFIX} {}\n{}\n", parsed.uid, parsed.recipient),
        )?;
        if parsed.secret.is_some() {
            std::fs::write(home.join(format!("{key_id}.key")), material)?;
        }

        tracing::debug!(key_id = %key_id, uid = %parsed.uid, "imported age key");
        Ok(key_id)
    }

    fn keys(&self) -> Result<Vec<KeyListing>> {
        Ok(self
            .public_keys()?
            .into_iter()
            .map(|(listing, _)| listing)
            .collect())
    }

    fn encrypt(
        &self,
        recipients: &[Recipient],
        plaintext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        let resolved = self.resolve(recipients)?;

        let encryptor =
            age::Encryptor::with_recipients(resolved.iter().map(|r| r as &dyn age::Recipient))
                .map_err(|e| BackupError::EncryptionFailed {
                    reason: format!("{e}"),
                })?;

        let armored = age::armor::ArmoredWriter::wrap_output(sink, age::armor::Format::AsciiArmor)
            .map_err(|e| stream_failure(e, "armor writer failed"))?;

        let mut writer = encryptor
            .wrap_output(armored)
            .map_err(|e| stream_failure(e, "encryption stream failed"))?;

        io::copy(plaintext, &mut writer).map_err(|e| stream_failure(e, "write failed"))?;

        let armored = writer
            .finish()
            .map_err(|e| stream_failure(e, "encryption finish failed"))?;
        let sink = armored
            .finish()
            .map_err(|e| stream_failure(e, "armor finish failed"))?;
        sink.flush().map_err(|e| stream_failure(e, "flush failed"))?;

        Ok(())
    }

    fn decrypt(
        &self,
        ciphertext: &mut (dyn Read + Send),
        sink: &mut (dyn Write + Send),
    ) -> Result<()> {
        let identities = self.secret_keys()?;
        if identities.is_empty() {
            return Err(BackupError::DecryptionFailed {
                reason: "no private keys have been imported".into(),
            });
        }

        let armored_reader = age::armor::ArmoredReader::new(ciphertext);
        let decryptor =
            age::Decryptor::new(armored_reader).map_err(|e| BackupError::DecryptionFailed {
                reason: format!("invalid encrypted stream: {e}"),
            })?;

        let mut reader = decryptor
            .decrypt(identities.iter().map(|i| i as &dyn age::Identity))
            .map_err(|e| BackupError::DecryptionFailed {
                reason: format!("no matching key: {e}"),
            })?;

        io::copy(&mut reader, sink).map_err(|e| BackupError::DecryptionFailed {
            reason: format!("read decrypted data failed: {e}"),
        })?;
        Ok(())
    }

    fn home(&self) -> &Path {
        self.home.path()
    }

    fn name(&self) -> &str {
        "age"
    }
}
