//! Error types for the credential hashing layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while producing or parsing credential digests.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Hash parameters were rejected by the algorithm.
    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),

    /// Digest computation failed.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// A stored digest is not a well-formed PHC string.
    #[error("malformed digest: {0}")]
    MalformedDigest(String),
}
