use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// A machine-readable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub code: String,
    pub description: String,
}

impl ErrorDescription {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

/// Caller-facing summary of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub succeeded: bool,
    pub errors: Vec<ErrorDescription>,
}

impl OperationResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<ErrorDescription>) -> Self {
        Self {
            succeeded: false,
            errors,
        }
    }

    pub fn from_outcome<T>(outcome: &StoreResult<T>, describer: &dyn ErrorDescriber) -> Self {
        match outcome {
            Ok(_) => Self::success(),
            Err(err) => Self::failed(vec![describer.describe(err)]),
        }
    }
}

/// Turns store errors into [`ErrorDescription`]s.
///
/// Swap in a custom describer to localize or rephrase messages; the codes
/// should stay stable.
pub trait ErrorDescriber: Send + Sync {
    fn describe(&self, err: &StoreError) -> ErrorDescription;
}

/// English messages with stable codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDescriber;

impl ErrorDescriber for DefaultErrorDescriber {
    fn describe(&self, err: &StoreError) -> ErrorDescription {
        match err {
            StoreError::ValidationFailed(reason) => ErrorDescription::new("ValidationFailed", reason.as_str()),
            StoreError::ConcurrencyConflict { .. } => ErrorDescription::new(
                "ConcurrencyFailure",
                "Optimistic concurrency failure, object has been modified.",
            ),
            StoreError::NotFound { entity_type, id } => {
                ErrorDescription::new("NotFound", format!("No {entity_type} with id {id} exists."))
            }
            StoreError::PersistenceFailed(_) => {
                ErrorDescription::new("PersistenceFailed", "The change could not be saved.")
            }
            StoreError::Cancelled(_) => {
                ErrorDescription::new("Cancelled", "The operation was cancelled before it completed.")
            }
            StoreError::Closed { entity_type } => {
                ErrorDescription::new("StoreClosed", format!("The {entity_type} store has been closed."))
            }
        }
    }
}
