use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use storekit_model::Entity;
use storekit_types::PartitionKey;

/// Opaque resume point returned with a page that has more results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub(crate) fn at(offset: usize) -> Self {
        Self(format!("o{offset}"))
    }

    pub(crate) fn offset(&self) -> StoreResult<usize> {
        self.0
            .strip_prefix('o')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| StoreError::ValidationFailed(format!("invalid continuation token '{}'", self.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContinuationToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which slice of a result set to return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub continuation: Option<ContinuationToken>,
    /// Falls back to the store's default page size.
    pub size: Option<usize>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn after(token: ContinuationToken) -> Self {
        Self {
            continuation: Some(token),
            size: None,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

/// One page of query results.
///
/// Consumed by iteration. Fetch the next page with
/// [`continuation`](Self::continuation) rather than iterating again.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<E> {
    items: Vec<E>,
    continuation: Option<ContinuationToken>,
}

impl<E> Page<E> {
    pub(crate) fn new(items: Vec<E>, continuation: Option<ContinuationToken>) -> Self {
        Self {
            items,
            continuation,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }

    pub fn continuation(&self) -> Option<&ContinuationToken> {
        self.continuation.as_ref()
    }

    pub fn into_items(self) -> Vec<E> {
        self.items
    }
}

impl<E> IntoIterator for Page<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type Comparator<E> = Box<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// A filtered, ordered, paged read.
///
/// Without an ordering, results come back in id order, which for
/// time-ordered ids is creation order.
pub struct Query<E: Entity> {
    pub(crate) predicate: Option<Predicate<E>>,
    pub(crate) ordering: Option<Comparator<E>>,
    pub(crate) partition: Option<PartitionKey>,
    pub(crate) include_deleted: bool,
    pub(crate) page: PageRequest,
}

impl<E: Entity> Query<E> {
    pub fn all() -> Self {
        Self {
            predicate: None,
            ordering: None,
            partition: None,
            include_deleted: false,
            page: PageRequest::first(),
        }
    }

    pub fn filter(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn order_by(mut self, ordering: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static) -> Self {
        self.ordering = Some(Box::new(ordering));
        self
    }

    /// Restricts the read to one partition.
    pub fn in_partition(mut self, partition: PartitionKey) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Includes soft-deleted tombstones.
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::all()
    }
}
