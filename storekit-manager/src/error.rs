//! Error types for managers.

use storekit_storage::StorageError;
use thiserror::Error;

/// A manager could not be assembled. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("required store '{0}' was not supplied")]
    MissingStore(&'static str),

    #[error("invalid manager options: {0}")]
    InvalidOptions(String),

    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("storage setup failed: {0}")]
    Storage(#[from] StorageError),
}

/// Unwraps a required store or reports it missing.
pub fn require<T>(store: Option<T>, name: &'static str) -> Result<T, ConfigurationError> {
    store.ok_or(ConfigurationError::MissingStore(name))
}

/// One store that failed to release.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Position in release order.
    pub position: usize,
    pub entity_type: &'static str,
    pub error: anyhow::Error,
}

/// Every release failure from one disposal, in release order.
#[derive(Debug, Error)]
#[error("{} of {attempted} stores failed to release", failures.len())]
pub struct DisposeError {
    pub attempted: usize,
    pub failures: Vec<ReleaseFailure>,
}
