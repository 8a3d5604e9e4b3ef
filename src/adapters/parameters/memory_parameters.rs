use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::errors::{BackupError, Result};
use crate::core::services::backup_context::parameter_name;
use crate::core::traits::config_resolver::ConfigResolver;

/// Parameter store held in memory, seeded from the `[parameters]` table of
/// the config file or populated directly by tests.
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Set (or overwrite) one parameter.
    pub fn put(&self, name: &str, value: &str) {
        tracing::debug!(name, value, "putting parameter");
        self.values
            .write()
            .insert(name.to_string(), value.to_string());
    }

    /// Point `config_path` at a backup bucket and base path.
    pub fn set_backup_location(&self, config_path: &str, bucket: &str, s3_path: &str) {
        self.put(&parameter_name(config_path, "s3_bucket"), bucket);
        self.put(&parameter_name(config_path, "s3_path"), s3_path);
    }
}

impl ConfigResolver for MemoryParameterStore {
    fn get(&self, name: &str) -> Result<String> {
        self.values
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BackupError::ParameterNotFound {
                name: name.to_string(),
            })
    }
}
