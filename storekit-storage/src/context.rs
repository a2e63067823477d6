//! The persistence seam every store is written against.

use crate::error::StorageResult;
use async_trait::async_trait;
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};

/// One persisted record as the engine sees it.
///
/// The columns outside `data` are authoritative: a store always trusts the
/// row's id and stamp over whatever the serialized body says.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: EntityId,
    pub partition_key: Option<PartitionKey>,
    pub concurrency_stamp: ConcurrencyStamp,
    pub deleted: bool,
    pub data: serde_json::Value,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The record exists but carries a different stamp. Nothing was written.
    StampMismatch,
    /// No record with this id exists.
    Missing,
}

/// Which rows a scan returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub partition: Option<PartitionKey>,
    pub include_deleted: bool,
}

/// Transactional access to one backing engine.
///
/// A context belongs to a single request scope; stores borrow it through an
/// `Arc` and never close it. The stamp comparison inside
/// [`compare_and_swap`](Self::compare_and_swap) and
/// [`compare_and_delete`](Self::compare_and_delete) must be atomic with the
/// write, so that of two writers holding the same stamp exactly one wins.
///
/// Scans return rows ordered by id.
#[async_trait]
pub trait BackingContext: Send + Sync {
    /// Short engine name for logs.
    fn engine(&self) -> &'static str;

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> StorageResult<Option<StoredRow>>;

    /// Fails with [`StorageError::Duplicate`](crate::StorageError::Duplicate)
    /// if the id is taken.
    async fn insert(&self, entity_type: &str, row: StoredRow) -> StorageResult<()>;

    /// Replaces the row with `row.id` only if its stamp equals `expected`.
    async fn compare_and_swap(
        &self,
        entity_type: &str,
        expected: &ConcurrencyStamp,
        row: StoredRow,
    ) -> StorageResult<CasOutcome>;

    /// Removes the row only if its stamp equals `expected`.
    async fn compare_and_delete(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected: &ConcurrencyStamp,
    ) -> StorageResult<CasOutcome>;

    async fn scan(&self, entity_type: &str, filter: &ScanFilter) -> StorageResult<Vec<StoredRow>>;
}
