//! Managers for StoreKit.
//!
//! A [`Manager`] owns the stores one domain service needs for one request
//! scope, pushes shared [`ManagerOptions`] into them and releases them in a
//! fixed order when the scope ends.
//!
//! There is no cross-store transaction. Multi-store operations either accept
//! partial completion or keep a [`Compensation`] log.

mod compensation;
mod error;
mod managed;
mod manager;
mod options;

pub use compensation::{Compensation, CompensationReport};
pub use error::{require, ConfigurationError, DisposeError, ReleaseFailure};
pub use managed::{ManagedStore, StoreSet};
pub use manager::Manager;
pub use options::ManagerOptions;
