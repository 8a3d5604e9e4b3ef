use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::adapters::keyrings::KeyRingBackend;
use crate::adapters::parameters::memory_parameters::MemoryParameterStore;
use crate::core::conduit::DEFAULT_CAPACITY;
use crate::core::errors::{BackupError, Result};
use crate::core::services::pipeline::{DEFAULT_CHUNK_SIZE, PipelineOptions};

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "backup.toml";

/// Top-level configuration read from `backup.toml`.
///
/// ```toml
/// [store]
/// root = "buckets"
///
/// [parameters]
/// "/backup_cloud/base_defs/s3_bucket" = "backups"
/// "/backup_cloud/base_defs/s3_path" = "team/db"
///
/// [pipeline]
/// conduit_capacity = 16384
/// chunk_size = 4096
///
/// [keyring]
/// backend = "age"
/// retain = false
///
/// [log]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSection,
    /// Flat parameter table standing in for a parameter service.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub keyring: KeyRingSection,
    #[serde(default)]
    pub log: LogSection,
}

impl AppConfig {
    /// Load and validate the configuration at `path`.
    ///
    /// A relative `[store] root` is resolved against the directory holding
    /// the config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BackupError::InvalidConfig {
                detail: format!(
                    "{} not found. Create it with a [store] root and a [parameters] table, \
                     or point --config at an existing file.",
                    path.display()
                ),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::parse(&content, base_dir)
    }

    /// Parse TOML text, resolving relative paths against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| BackupError::InvalidConfig {
            detail: format!("Failed to parse config: {e}"),
        })?;

        if config.store.root.is_relative() {
            config.store.root = base_dir.join(&config.store.root);
        }
        if config.pipeline.conduit_capacity == 0 {
            return Err(BackupError::InvalidConfig {
                detail: "[pipeline] conduit_capacity must be greater than 0".into(),
            });
        }
        if config.pipeline.chunk_size == 0 {
            return Err(BackupError::InvalidConfig {
                detail: "[pipeline] chunk_size must be greater than 0".into(),
            });
        }
        config.backend()?;

        Ok(config)
    }

    pub fn backend(&self) -> Result<KeyRingBackend> {
        self.keyring.backend.parse()
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            conduit_capacity: self.pipeline.conduit_capacity,
            chunk_size: self.pipeline.chunk_size,
        }
    }

    /// Parameter store seeded from the `[parameters]` table.
    pub fn parameter_store(&self) -> MemoryParameterStore {
        MemoryParameterStore::from_map(self.parameters.clone())
    }
}

/// The `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Directory holding one sub-directory per bucket.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("buckets")
}

/// The `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_conduit_capacity")]
    pub conduit_capacity: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            conduit_capacity: DEFAULT_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_conduit_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// The `[keyring]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRingSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Keep the keyring directory after the process exits.
    #[serde(default)]
    pub retain: bool,
}

impl Default for KeyRingSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            retain: false,
        }
    }
}

fn default_backend() -> String {
    "age".to_string()
}

/// The `[log]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
