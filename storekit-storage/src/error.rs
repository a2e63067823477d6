//! Error types for the storage layer.

use storekit_model::SchemaError;
use storekit_types::EntityId;
use thiserror::Error;

/// Result type for backing-context operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a backing context or engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity type was never registered with this engine.
    #[error("entity type not registered: {0}")]
    Unregistered(String),

    /// Schema cannot be mapped onto storage.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// A record with this id already exists.
    #[error("{entity_type} {id} already exists")]
    Duplicate { entity_type: String, id: EntityId },

    /// A uniqueness or other integrity constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Stored data could not be mapped back to a row.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Engine cannot be reached (poisoned lock, closed connection).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Background blocking task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome taxonomy of store operations.
///
/// Everything here is recoverable and is returned, never raised.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A pre-commit rule or a handler hook rejected the entity.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The caller's concurrency stamp is stale. Re-read and retry.
    #[error("concurrency conflict on {entity_type} {id}")]
    ConcurrencyConflict {
        entity_type: &'static str,
        id: EntityId,
    },

    /// No live record with this id.
    #[error("{entity_type} {id} not found")]
    NotFound {
        entity_type: &'static str,
        id: EntityId,
    },

    /// The backing context rejected the operation or was unreachable.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] StorageError),

    /// The deadline elapsed or the scope was cancelled first.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The store was closed by its owner.
    #[error("{entity_type} store is closed")]
    Closed { entity_type: &'static str },
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { .. } | StorageError::Constraint(_) => {
                Self::ValidationFailed(err.to_string())
            }
            other => Self::PersistenceFailed(other),
        }
    }
}

impl StoreError {
    /// Whether the caller can fix this by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Cache entries a store could not invalidate before it was closed.
///
/// The writes themselves committed; the listed ids may be served stale from
/// the cache until their TTL runs out.
#[derive(Debug, Error)]
#[error("{entity_type} store closed with {} stale cache entries", stale.len())]
pub struct CloseError {
    pub entity_type: &'static str,
    pub stale: Vec<EntityId>,
}
