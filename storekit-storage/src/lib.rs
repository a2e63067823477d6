//! Storage layer for StoreKit.
//!
//! Provides the generic [`Store`] and the engines it persists through.
//!
//! # Architecture
//!
//! - [`BackingContext`] is the only persistence seam. Engines store each
//!   entity as a JSON body beside its id, partition key, concurrency stamp
//!   and tombstone flag.
//! - Concurrency control is a compare-and-swap on the stamp inside the
//!   engine. There is no other lock.
//! - Caching is advisory. A failing cache degrades reads to the backing
//!   context and never fails an operation.
//! - Engines are chosen by [`StorageConfig`] and opened with
//!   [`Database::open`].

mod cancel;
mod config;
mod context;
mod database;
mod describe;
mod error;
mod memory;
mod page;
mod sqlite;
mod store;

pub use cancel::{CancellationSignal, CancellationSource};
pub use config::{EngineConfig, StorageConfig, StoreOptions};
pub use context::{BackingContext, CasOutcome, ScanFilter, StoredRow};
pub use database::{Context, Database};
pub use describe::{DefaultErrorDescriber, ErrorDescriber, ErrorDescription, OperationResult};
pub use error::{CloseError, StorageError, StorageResult, StoreError, StoreResult};
pub use memory::{MemoryContext, MemoryDatabase};
pub use page::{ContinuationToken, Page, PageRequest, Query};
pub use sqlite::{SqliteContext, SqliteDatabase};
pub use store::Store;
