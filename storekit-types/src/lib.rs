//! Core type definitions for StoreKit.
//!
//! This crate defines the leaf types every other StoreKit crate depends on:
//! - Entity identifiers (UUID v7)
//! - Concurrency stamps used as optimistic-lock fences
//! - Partition keys for sharded or tenant-isolated entities
//! - Closed-set [`Enumeration`] values persisted by name
//!
//! Nothing in here performs I/O.

mod enumeration;
mod ids;

pub use enumeration::{Enumeration, EnumerationRegistry, LookupFailed};
pub use ids::{ConcurrencyStamp, EntityId, PartitionKey};

#[doc(hidden)]
pub mod __private {
    pub use serde;
}

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("invalid concurrency stamp: {0}")]
    InvalidStamp(String),

    #[error(transparent)]
    Lookup(#[from] LookupFailed),
}
