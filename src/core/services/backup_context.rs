use std::path::Path;

use super::keyring_bootstrap::KeyRingBootstrapper;
use crate::core::errors::Result;
use crate::core::models::object_ref::{ObjectRef, join_key};
use crate::core::models::recipient::RecipientSet;
use crate::core::traits::config_resolver::ConfigResolver;
use crate::core::traits::keyring::KeyRing;
use crate::core::traits::object_store::ObjectStore;

/// Parameter path used when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "/backup_cloud/base_defs";

/// Folder below the base path holding encrypted backups.
pub const BACKUP_FOLDER: &str = "backup";

/// Folder below the base path holding public key material.
pub const KEY_MATERIAL_FOLDER: &str = "config/public-keys";

/// How to locate a backup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Prefix of the `s3_bucket` and `s3_path` parameters.
    pub config_path: String,
    /// Identities to encrypt for instead of every discovered key.
    pub recipients: Option<Vec<String>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            recipients: None,
        }
    }
}

/// Resolved backup configuration plus a keyring loaded with every
/// recipient key found in the key material folder.
///
/// A context is read-only once built and can be shared by concurrent runs.
pub struct BackupContext {
    config_path: String,
    bucket: String,
    s3_path: String,
    discovered: RecipientSet,
    explicit: Option<RecipientSet>,
    keyring: Box<dyn KeyRing>,
}

impl BackupContext {
    /// Resolve the backup location, then bootstrap `keyring` (which must
    /// be empty) from `<s3_path>/config/public-keys/` in the backup bucket.
    pub fn new(
        options: ContextOptions,
        keyring: Box<dyn KeyRing>,
        resolver: &dyn ConfigResolver,
        store: &dyn ObjectStore,
    ) -> Result<Self> {
        let config_path = options.config_path;
        let bucket = resolve(resolver, &config_path, "s3_bucket")?;
        let s3_path = resolve(resolver, &config_path, "s3_path")?
            .trim_start_matches('/')
            .to_string();

        let explicit = options
            .recipients
            .map(|ids| RecipientSet::explicit(&ids))
            .transpose()?;

        let prefix = key_material_prefix(&s3_path);
        let blobs = KeyRingBootstrapper.fetch_blobs(store, &bucket, &prefix)?;
        let discovered = KeyRingBootstrapper.bootstrap(keyring.as_ref(), blobs)?;

        tracing::debug!(
            config_path = %config_path,
            bucket = %bucket,
            s3_path = %s3_path,
            keyring = %keyring.home().display(),
            "backup context ready"
        );

        Ok(Self {
            config_path,
            bucket,
            s3_path,
            discovered,
            explicit,
            keyring,
        })
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    /// Bucket that receives backups and holds the key material.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Base path inside the bucket, without a leading `/`.
    pub fn s3_path(&self) -> &str {
        &self.s3_path
    }

    /// Recipients every backup is encrypted for. Explicit recipients
    /// replace the discovered ones.
    pub fn recipients(&self) -> &RecipientSet {
        self.explicit.as_ref().unwrap_or(&self.discovered)
    }

    /// Every identity found in the key material folder.
    pub fn discovered_recipients(&self) -> &RecipientSet {
        &self.discovered
    }

    pub fn keyring(&self) -> &dyn KeyRing {
        self.keyring.as_ref()
    }

    pub fn keyring_home(&self) -> &Path {
        self.keyring.home()
    }

    /// `<s3_path>/backup`
    pub fn target_prefix(&self) -> String {
        join_key(&[&self.s3_path, BACKUP_FOLDER])
    }

    /// `<s3_path>/config/public-keys/`
    pub fn key_material_prefix(&self) -> String {
        key_material_prefix(&self.s3_path)
    }

    /// Object a backup named `dest_path` is stored at.
    pub fn destination_for(&self, dest_path: &str) -> ObjectRef {
        ObjectRef::new(
            self.bucket.as_str(),
            join_key(&[&self.target_prefix(), dest_path]),
        )
    }
}

impl std::fmt::Debug for BackupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupContext")
            .field("config_path", &self.config_path)
            .field("bucket", &self.bucket)
            .field("s3_path", &self.s3_path)
            .field("recipients", self.recipients())
            .field("keyring", &self.keyring.name())
            .finish()
    }
}

fn resolve(resolver: &dyn ConfigResolver, config_path: &str, leaf: &str) -> Result<String> {
    let name = parameter_name(config_path, leaf);
    resolver.get(&name).inspect_err(|e| {
        tracing::error!(parameter = %name, error = %e, "failed to get parameter");
    })
}

/// Full parameter name below a configuration path, keeping its leading `/`.
pub fn parameter_name(config_path: &str, leaf: &str) -> String {
    let joined = join_key(&[config_path, leaf]);
    if config_path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

fn key_material_prefix(s3_path: &str) -> String {
    format!("{}/", join_key(&[s3_path, KEY_MATERIAL_FOLDER]))
}
