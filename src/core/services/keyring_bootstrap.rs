use std::io::Read;

use crate::core::errors::Result;
use crate::core::models::key_material::KeyBlob;
use crate::core::models::object_ref::ObjectRef;
use crate::core::models::recipient::{Recipient, RecipientSet};
use crate::core::traits::keyring::KeyRing;
use crate::core::traits::object_store::ObjectStore;

/// Populates a fresh keyring from key material and derives the recipient set.
pub struct KeyRingBootstrapper;

impl KeyRingBootstrapper {
    /// Import every blob into `keyring`, then collect the identity of every
    /// key it ended up holding.
    ///
    /// - Blobs too short to be key material are skipped with a warning.
    /// - Blobs the keyring refuses to import are skipped with a warning.
    /// - A key whose identity is too short fails the whole bootstrap.
    /// - An empty result fails with `NoRecipients`.
    pub fn bootstrap(
        &self,
        keyring: &dyn KeyRing,
        blobs: impl IntoIterator<Item = KeyBlob>,
    ) -> Result<RecipientSet> {
        for blob in blobs {
            if !blob.is_plausible() {
                tracing::warn!(
                    key = %blob.name,
                    length = blob.bytes.len(),
                    "public key is corrupt - too short"
                );
                continue;
            }
            match keyring.import_key(&blob.bytes) {
                Ok(key_id) => tracing::debug!(key = %blob.name, %key_id, "imported key"),
                Err(e) => tracing::warn!(key = %blob.name, error = %e, "failed to import key"),
            }
        }

        let keys = keyring.keys()?;
        let mut recipients = Vec::new();
        for listing in &keys {
            recipients.push(Recipient::parse(&listing.uid, &listing.key_id)?);
        }
        let set = RecipientSet::new(recipients)?;
        for recipient in &set {
            let shared = keys.iter().filter(|k| k.uid.trim() == recipient.as_str()).count();
            if shared > 1 {
                tracing::warn!(
                    identity = %recipient,
                    keys = shared,
                    "several keys share one identity; encrypting for all of them"
                );
            }
        }
        tracing::info!(
            backend = keyring.name(),
            recipients = set.len(),
            "keyring bootstrapped"
        );
        Ok(set)
    }

    /// Fetch every key material object below `prefix`.
    ///
    /// The folder marker object (key equal to `prefix`) is ignored. Objects
    /// that can't be read are skipped with a warning; a failing listing is
    /// an error.
    pub fn fetch_blobs(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<KeyBlob>> {
        let mut blobs = Vec::new();
        for key in store.list(bucket, prefix)? {
            if key == prefix {
                continue;
            }
            let object = ObjectRef::new(bucket, key.as_str());
            let mut bytes = Vec::new();
            let read = store
                .open(&object)
                .and_then(|mut body| Ok(body.read_to_end(&mut bytes)?));
            match read {
                Ok(_) => blobs.push(KeyBlob::new(key, bytes)),
                Err(e) => tracing::warn!(%object, error = %e, "skipping unreadable key material"),
            }
        }
        tracing::debug!(bucket, prefix, count = blobs.len(), "fetched key material");
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::keyrings::age_keyring::AgeKeyRing;
    use crate::adapters::object_stores::memory_store::MemoryObjectStore;
    use crate::core::errors::BackupError;

    fn public_blob(name: &str, uid: &str) -> KeyBlob {
        let (public, _secret) = AgeKeyRing::generate_keypair(uid);
        KeyBlob::new(name, public)
    }

    #[test]
    fn imports_valid_and_skips_corrupt_blobs() {
        let ring = AgeKeyRing::create(false).unwrap();
        let blobs = vec![
            KeyBlob::new("short", "too short"),
            KeyBlob::new("garbage", vec![b'x'; 200]),
            public_blob("one", "backup-one"),
            public_blob("two", "backup-two"),
        ];

        let set = KeyRingBootstrapper.bootstrap(&ring, blobs).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("backup-one"));
        assert!(set.contains("backup-two"));
    }

    #[test]
    fn shared_identity_keeps_every_key() {
        let ring = AgeKeyRing::create(false).unwrap();
        let blobs = vec![
            public_blob("ops-a", "backup-ops"),
            public_blob("ops-b", "backup-ops"),
        ];

        let set = KeyRingBootstrapper.bootstrap(&ring, blobs).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(ring.keys().unwrap().len(), 2);
    }

    #[test]
    fn no_usable_blobs_is_no_recipients() {
        let ring = AgeKeyRing::create(false).unwrap();
        let result = KeyRingBootstrapper.bootstrap(&ring, vec![KeyBlob::new("short", "x")]);
        assert!(matches!(result, Err(BackupError::NoRecipients)));

        let result = KeyRingBootstrapper.bootstrap(&ring, Vec::new());
        assert!(matches!(result, Err(BackupError::NoRecipients)));
    }

    #[test]
    fn short_identity_fails_bootstrap() {
        let ring = AgeKeyRing::create(false).unwrap();
        let result = KeyRingBootstrapper.bootstrap(&ring, vec![public_blob("bad", "ab")]);
        assert!(matches!(result, Err(BackupError::InvalidIdentity { .. })));
    }

    #[test]
    fn fetch_skips_folder_marker() {
        let store = MemoryObjectStore::new();
        let prefix = "team/config/public-keys/";
        store.put_object("b", prefix, "");
        store.put_object("b", "team/config/public-keys/one.pub", "key one");
        store.put_object("b", "team/backup/unrelated", "data");

        let blobs = KeyRingBootstrapper.fetch_blobs(&store, "b", prefix).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].name, "team/config/public-keys/one.pub");
        assert_eq!(blobs[0].bytes, b"key one");
    }
}
