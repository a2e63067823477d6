use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which engine backs the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineConfig {
    #[default]
    Memory,
    Sqlite {
        /// Database file. `":memory:"` opens a private in-memory database.
        path: PathBuf,
    },
}

/// Per-store behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Lifetime of a cached read.
    pub cache_ttl_secs: u64,
    /// Deadline applied to every operation. `None` waits indefinitely.
    pub operation_timeout_ms: Option<u64>,
    /// Tombstone entities that support it instead of removing them.
    pub soft_delete: bool,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            operation_timeout_ms: None,
            soft_delete: false,
            default_page_size: 50,
            max_page_size: 1000,
        }
    }
}

impl StoreOptions {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.default_page_size == 0 {
            return Err(StorageError::Config("default_page_size must be at least 1".into()));
        }
        if self.max_page_size < self.default_page_size {
            return Err(StorageError::Config(format!(
                "max_page_size ({}) is below default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        Ok(())
    }
}

/// Storage section of the application config.
///
/// ```toml
/// [engine]
/// kind = "sqlite"
/// path = "data/store.db"
///
/// [store]
/// cache_ttl_secs = 60
/// soft_delete = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub engine: EngineConfig,
    pub store: StoreOptions,
}

impl StorageConfig {
    pub fn from_toml_str(input: &str) -> StorageResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.store.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }
}
