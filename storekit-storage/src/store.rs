//! The generic store.
//!
//! A [`Store`] serves one entity type for one request scope. Reads go
//! through the cache proxy first; writes always consult the backing context
//! and commit with a compare-and-swap on the concurrency stamp, so two
//! writers holding the same stamp can never both win.
//!
//! ```text
//! caller -> Store -> (cache hit?) -> backing context
//!                 -> handler hook -> CAS commit -> cache invalidate
//! ```

use crate::cancel::CancellationSignal;
use crate::config::StoreOptions;
use crate::context::{BackingContext, CasOutcome, ScanFilter, StoredRow};
use crate::database::Context;
use crate::describe::{DefaultErrorDescriber, ErrorDescriber, OperationResult};
use crate::error::{CloseError, StorageError, StorageResult, StoreError, StoreResult};
use crate::page::{ContinuationToken, Page, Query};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use storekit_model::{
    CacheProxy, Entity, HandlerProxy, MutationContext, MutationKind, NoCache, NoopHandler,
};
use storekit_types::{ConcurrencyStamp, EntityId};
use tracing::{debug, warn};

/// Concurrency-checked CRUD over one entity type.
///
/// The store borrows its backing context; whoever opened the context closes
/// it. Handler and cache proxies are shared handles and may serve many
/// stores at once.
pub struct Store<E: Entity, C: BackingContext = Context> {
    context: Arc<C>,
    options: StoreOptions,
    handler: Arc<dyn HandlerProxy<E>>,
    cache: Arc<dyn CacheProxy<E>>,
    describer: Arc<dyn ErrorDescriber>,
    actor: Option<String>,
    cancellation: Option<CancellationSignal>,
    /// Ids whose cache entry may be stale because a committed write has not
    /// yet been invalidated.
    pending_invalidations: Mutex<HashSet<EntityId>>,
    closed: AtomicBool,
}

impl<E: Entity, C: BackingContext> std::fmt::Debug for Store<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("options", &self.options)
            .field("actor", &self.actor)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<E: Entity, C: BackingContext> Store<E, C> {
    /// A store with default options, no handler and no cache.
    pub fn new(context: Arc<C>) -> Self {
        Self {
            context,
            options: StoreOptions::default(),
            handler: Arc::new(NoopHandler),
            cache: Arc::new(NoCache),
            describer: Arc::new(DefaultErrorDescriber),
            actor: None,
            cancellation: None,
            pending_invalidations: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn HandlerProxy<E>>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheProxy<E>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_describer(mut self, describer: Arc<dyn ErrorDescriber>) -> Self {
        self.describer = describer;
        self
    }

    /// Principal recorded in every [`MutationContext`] this store builds.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut StoreOptions {
        &mut self.options
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn entity_type(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }

    /// Number of ids whose cache entry could not be invalidated yet.
    pub fn pending_invalidations(&self) -> usize {
        self.pending().len()
    }

    /// Summarizes an outcome as `{ succeeded, errors }`.
    pub fn describe<T>(&self, outcome: &StoreResult<T>) -> OperationResult {
        OperationResult::from_outcome(outcome, self.describer.as_ref())
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Persists a new entity.
    ///
    /// Assigns an id when the entity has none and always assigns a fresh
    /// stamp; any stamp the caller supplied is discarded.
    pub async fn create(&self, entity: E) -> StoreResult<E> {
        self.guarded("create", self.create_inner(entity)).await
    }

    /// Loads a live entity, consulting the cache first.
    pub async fn read(&self, id: &EntityId) -> StoreResult<E> {
        self.guarded("read", self.read_inner(*id)).await
    }

    /// Like [`read`](Self::read) but maps `NotFound` to `None`.
    pub async fn find(&self, id: &EntityId) -> StoreResult<Option<E>> {
        match self.read(id).await {
            Ok(entity) => Ok(Some(entity)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Replaces a stored entity.
    ///
    /// The entity's own stamp is the one the caller last observed. A stale
    /// stamp fails with `ConcurrencyConflict` and writes nothing.
    pub async fn update(&self, entity: E) -> StoreResult<E> {
        self.guarded("update", self.update_inner(entity)).await
    }

    /// Removes an entity, or tombstones it when soft delete is enabled and
    /// the entity supports it.
    pub async fn delete(&self, id: &EntityId, expected: &ConcurrencyStamp) -> StoreResult<()> {
        self.guarded("delete", self.delete_inner(*id, expected.clone()))
            .await
    }

    /// Filtered, ordered, paged read straight from the backing context.
    pub async fn query(&self, query: Query<E>) -> StoreResult<Page<E>> {
        self.guarded("query", self.query_inner(query)).await
    }

    /// Retries outstanding cache invalidations and refuses further calls.
    ///
    /// Safe to call more than once. Fails only if some cache entries are
    /// still possibly stale.
    pub async fn close(&self) -> Result<(), CloseError> {
        self.closed.store(true, AtomicOrdering::Release);
        let pending: Vec<EntityId> = self.pending().iter().copied().collect();
        for id in pending {
            self.invalidate(id).await;
        }
        let stale: Vec<EntityId> = self.pending().iter().copied().collect();
        if stale.is_empty() {
            Ok(())
        } else {
            warn!(entity_type = E::ENTITY_TYPE, stale = stale.len(), "Store closed with stale cache entries");
            Err(CloseError {
                entity_type: E::ENTITY_TYPE,
                stale,
            })
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn guarded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        if self.is_closed() {
            return Err(StoreError::Closed {
                entity_type: E::ENTITY_TYPE,
            });
        }
        let bounded = async {
            match self.options.operation_timeout() {
                Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                    Err(StoreError::Cancelled(format!(
                        "{op} on {} exceeded {limit:?}",
                        E::ENTITY_TYPE
                    )))
                }),
                None => fut.await,
            }
        };
        let Some(signal) = &self.cancellation else {
            return bounded.await;
        };
        let mut signal = signal.clone();
        tokio::select! {
            biased;
            () = signal.cancelled() => {
                debug!(entity_type = E::ENTITY_TYPE, op, "Operation cancelled");
                Err(StoreError::Cancelled(format!("{op} on {} was cancelled", E::ENTITY_TYPE)))
            }
            result = bounded => result,
        }
    }

    async fn create_inner(&self, mut entity: E) -> StoreResult<E> {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = EntityId::new();
                entity.set_id(id);
                id
            }
        };
        let stamp = ConcurrencyStamp::generate();
        entity.set_concurrency_stamp(stamp.clone());

        let ctx = self.mutation_context(MutationKind::Create);
        self.handler
            .before_create(&ctx, &mut entity)
            .await
            .map_err(|reason| self.rejected(&ctx, id, reason))?;
        self.ensure_identity(&entity, id)?;
        self.ensure_live(&entity, id)?;
        entity.set_concurrency_stamp(stamp.clone());

        let row = encode(&entity, id, stamp)?;
        self.commit(id, async {
            self.context
                .insert(E::ENTITY_TYPE, row)
                .await
                .map(|()| CasOutcome::Applied)
        })
        .await?;
        debug!(entity_type = E::ENTITY_TYPE, %id, "Created");
        Ok(entity)
    }

    async fn read_inner(&self, id: EntityId) -> StoreResult<E> {
        let use_cache = self.settle_pending(id).await;
        if use_cache {
            match self.cache.get(&id).await {
                Ok(Some(entity)) => {
                    debug!(entity_type = E::ENTITY_TYPE, %id, "Cache hit");
                    return Ok(entity);
                }
                Ok(None) => debug!(entity_type = E::ENTITY_TYPE, %id, "Cache miss"),
                Err(e) => warn!(
                    entity_type = E::ENTITY_TYPE,
                    %id,
                    error = %e,
                    "Cache read failed, falling back to backing context"
                ),
            }
        }

        let entity = decode(self.load_live(id).await?)?;
        if use_cache {
            match self.cache.set(&id, &entity, self.options.cache_ttl()).await {
                Ok(()) => self.revalidate_cached(id, &entity).await,
                Err(e) => warn!(entity_type = E::ENTITY_TYPE, %id, error = %e, "Cache populate failed"),
            }
        }
        Ok(entity)
    }

    async fn update_inner(&self, mut entity: E) -> StoreResult<E> {
        let id = entity.id().ok_or_else(|| {
            StoreError::ValidationFailed(format!("cannot update a {} without an id", E::ENTITY_TYPE))
        })?;
        let expected = entity.concurrency_stamp().cloned().ok_or_else(|| {
            StoreError::ValidationFailed(format!(
                "cannot update {} {id} without its concurrency stamp",
                E::ENTITY_TYPE
            ))
        })?;

        let current = self.load_live(id).await?;
        if current.concurrency_stamp != expected {
            debug!(entity_type = E::ENTITY_TYPE, %id, "Stale stamp on update");
            return Err(self.conflict(id));
        }
        let stored_partition = current.partition_key.clone();
        let previous = decode(current)?;

        let ctx = self.mutation_context(MutationKind::Update);
        self.handler
            .before_update(&ctx, &mut entity, &previous)
            .await
            .map_err(|reason| self.rejected(&ctx, id, reason))?;
        self.ensure_identity(&entity, id)?;
        self.ensure_live(&entity, id)?;
        if stored_partition.as_ref() != entity.partition() {
            return Err(StoreError::ValidationFailed(format!(
                "the partition key of {} {id} cannot change",
                E::ENTITY_TYPE
            )));
        }

        let stamp = ConcurrencyStamp::generate();
        entity.set_concurrency_stamp(stamp.clone());
        let row = encode(&entity, id, stamp)?;
        self.commit(id, self.context.compare_and_swap(E::ENTITY_TYPE, &expected, row))
            .await?;
        debug!(entity_type = E::ENTITY_TYPE, %id, "Updated");
        Ok(entity)
    }

    async fn delete_inner(&self, id: EntityId, expected: ConcurrencyStamp) -> StoreResult<()> {
        let current = self.load_live(id).await?;
        if current.concurrency_stamp != expected {
            debug!(entity_type = E::ENTITY_TYPE, %id, "Stale stamp on delete");
            return Err(self.conflict(id));
        }
        let mut stored = decode(current)?;

        let ctx = self.mutation_context(MutationKind::Delete);
        self.handler
            .before_delete(&ctx, &mut stored)
            .await
            .map_err(|reason| self.rejected(&ctx, id, reason))?;

        let tombstoned = match stored.soft_delete_mut() {
            Some(soft) if self.options.soft_delete => {
                soft.set_deleted_at(Some(ctx.at));
                true
            }
            _ => false,
        };

        if tombstoned {
            let stamp = ConcurrencyStamp::generate();
            stored.set_concurrency_stamp(stamp.clone());
            let mut row = encode(&stored, id, stamp)?;
            row.deleted = true;
            self.commit(id, self.context.compare_and_swap(E::ENTITY_TYPE, &expected, row))
                .await?;
            debug!(entity_type = E::ENTITY_TYPE, %id, "Tombstoned");
        } else {
            self.commit(id, self.context.compare_and_delete(E::ENTITY_TYPE, &id, &expected))
                .await?;
            debug!(entity_type = E::ENTITY_TYPE, %id, "Deleted");
        }
        Ok(())
    }

    async fn query_inner(&self, query: Query<E>) -> StoreResult<Page<E>> {
        let Query {
            predicate,
            ordering,
            partition,
            include_deleted,
            page,
        } = query;

        let offset = match &page.continuation {
            Some(token) => token.offset()?,
            None => 0,
        };
        let size = page
            .size
            .unwrap_or(self.options.default_page_size)
            .clamp(1, self.options.max_page_size.max(1));

        let filter = ScanFilter {
            partition,
            include_deleted,
        };
        let rows = self.context.scan(E::ENTITY_TYPE, &filter).await?;

        let mut matched = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = decode(row)?;
            if predicate.as_ref().is_none_or(|p| p(&entity)) {
                matched.push(entity);
            }
        }
        if let Some(ordering) = &ordering {
            matched.sort_by(|a, b| ordering(a, b));
        }

        let total = matched.len();
        let items: Vec<E> = matched.into_iter().skip(offset).take(size).collect();
        let next = offset + items.len();
        let continuation = (next < total).then(|| ContinuationToken::at(next));
        Ok(Page::new(items, continuation))
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn load_live(&self, id: EntityId) -> StoreResult<StoredRow> {
        match self.context.fetch(E::ENTITY_TYPE, &id).await? {
            Some(row) if !row.deleted => Ok(row),
            _ => Err(StoreError::NotFound {
                entity_type: E::ENTITY_TYPE,
                id,
            }),
        }
    }

    /// Runs a conditional write and invalidates the cache once it commits.
    ///
    /// The id is marked pending before the write so that an interrupted
    /// call still leaves the entry marked stale.
    async fn commit(
        &self,
        id: EntityId,
        write: impl Future<Output = StorageResult<CasOutcome>>,
    ) -> StoreResult<()> {
        let newly_pending = self.pending().insert(id);
        let outcome = write.await;
        debug!(entity_type = E::ENTITY_TYPE, %id, ?outcome, engine = self.context.engine(), "Conditional write");
        match outcome {
            Ok(CasOutcome::Applied) => {
                self.invalidate(id).await;
                Ok(())
            }
            Ok(CasOutcome::StampMismatch) => {
                self.unmark(id, newly_pending);
                Err(self.conflict(id))
            }
            Ok(CasOutcome::Missing) => {
                self.unmark(id, newly_pending);
                Err(StoreError::NotFound {
                    entity_type: E::ENTITY_TYPE,
                    id,
                })
            }
            Err(err @ (StorageError::Duplicate { .. } | StorageError::Constraint(_))) => {
                self.unmark(id, newly_pending);
                Err(err.into())
            }
            // Unknown whether the write landed; keep the entry marked.
            Err(err) => Err(err.into()),
        }
    }

    async fn invalidate(&self, id: EntityId) {
        match self.cache.invalidate(&id).await {
            Ok(()) => {
                self.pending().remove(&id);
            }
            Err(e) => warn!(
                entity_type = E::ENTITY_TYPE,
                %id,
                error = %e,
                "Cache invalidation failed, entry stays pending"
            ),
        }
    }

    /// Returns whether the cache may be trusted for `id`.
    async fn settle_pending(&self, id: EntityId) -> bool {
        let pending = self.pending().contains(&id);
        if !pending {
            return true;
        }
        self.invalidate(id).await;
        let settled = !self.pending().contains(&id);
        if !settled {
            debug!(entity_type = E::ENTITY_TYPE, %id, "Bypassing cache for pending invalidation");
        }
        settled
    }

    /// Drops a freshly cached value if a write committed after it was loaded.
    ///
    /// The cache is written before the stamp is re-fetched, so any writer
    /// that commits later also invalidates after the populate.
    async fn revalidate_cached(&self, id: EntityId, cached: &E) {
        let current = match self.context.fetch(E::ENTITY_TYPE, &id).await {
            Ok(Some(row)) if !row.deleted => Some(row.concurrency_stamp),
            Ok(_) => None,
            Err(e) => {
                warn!(entity_type = E::ENTITY_TYPE, %id, error = %e, "Could not revalidate cached entry");
                None
            }
        };
        if current.as_ref() != cached.concurrency_stamp() {
            debug!(entity_type = E::ENTITY_TYPE, %id, "Cached entry superseded by a concurrent write");
            self.pending().insert(id);
            self.invalidate(id).await;
        }
    }

    fn unmark(&self, id: EntityId, newly_pending: bool) {
        if newly_pending {
            self.pending().remove(&id);
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<EntityId>> {
        self.pending_invalidations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mutation_context(&self, kind: MutationKind) -> MutationContext {
        MutationContext::new(kind, E::ENTITY_TYPE, self.actor.clone())
    }

    fn rejected(&self, ctx: &MutationContext, id: EntityId, reason: String) -> StoreError {
        warn!(
            entity_type = E::ENTITY_TYPE,
            %id,
            kind = ?ctx.kind,
            actor = ctx.actor.as_deref().unwrap_or("-"),
            %reason,
            "Handler rejected mutation"
        );
        StoreError::ValidationFailed(reason)
    }

    fn ensure_identity(&self, entity: &E, id: EntityId) -> StoreResult<()> {
        if entity.id() == Some(id) {
            Ok(())
        } else {
            Err(StoreError::ValidationFailed(format!(
                "a handler changed the id of {} {id}",
                E::ENTITY_TYPE
            )))
        }
    }

    /// Only `delete` may tombstone a record.
    fn ensure_live(&self, entity: &E, id: EntityId) -> StoreResult<()> {
        if entity.is_deleted() {
            Err(StoreError::ValidationFailed(format!(
                "{} {id} is marked deleted; use delete to remove it",
                E::ENTITY_TYPE
            )))
        } else {
            Ok(())
        }
    }

    fn conflict(&self, id: EntityId) -> StoreError {
        StoreError::ConcurrencyConflict {
            entity_type: E::ENTITY_TYPE,
            id,
        }
    }
}

impl<E: Entity, C: BackingContext> Drop for Store<E, C> {
    fn drop(&mut self) {
        let stale = self.pending().len();
        if stale > 0 && !self.is_closed() {
            warn!(entity_type = E::ENTITY_TYPE, stale, "Store dropped with stale cache entries; call close()");
        }
    }
}

/// Rows are always written live; only delete sets the tombstone flag.
fn encode<E: Entity>(entity: &E, id: EntityId, stamp: ConcurrencyStamp) -> StoreResult<StoredRow> {
    Ok(StoredRow {
        id,
        partition_key: entity.partition().cloned(),
        concurrency_stamp: stamp,
        deleted: false,
        data: serde_json::to_value(entity).map_err(StorageError::from)?,
    })
}

/// The row's id and stamp columns win over the serialized body.
fn decode<E: Entity>(row: StoredRow) -> StoreResult<E> {
    let mut entity: E = serde_json::from_value(row.data).map_err(StorageError::from)?;
    entity.set_id(row.id);
    entity.set_concurrency_stamp(row.concurrency_stamp);
    Ok(entity)
}
