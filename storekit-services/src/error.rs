//! Error types for the domain services.

use storekit_crypto::CryptoError;
use storekit_storage::StoreError;
use storekit_types::LookupFailed;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("credential hashing failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Lookup(#[from] LookupFailed),

    /// A domain rule refused the request.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// A multi-store operation failed and could not be fully undone.
    #[error("{source}; {unrecovered} undo steps also failed")]
    PartiallyApplied {
        #[source]
        source: StoreError,
        unrecovered: usize,
    },
}

impl ServiceError {
    /// The store error underneath, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) | Self::PartiallyApplied { source: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_conflict)
    }
}
