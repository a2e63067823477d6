use crate::Entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Which mutation a hook is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Per-call information handed to every hook.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub kind: MutationKind,
    pub entity_type: &'static str,
    /// The acting principal, if the calling scope supplied one.
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
}

impl MutationContext {
    pub fn new(kind: MutationKind, entity_type: &'static str, actor: Option<String>) -> Self {
        Self {
            kind,
            entity_type,
            actor,
            at: Utc::now(),
        }
    }
}

/// Hooks the store runs before committing a mutation.
///
/// A hook may stamp metadata onto the entity it is given, or return
/// `Err(reason)` to veto the write. A veto aborts the whole operation; the
/// store reports it as a validation failure carrying `reason`.
///
/// Implementations are shared across request scopes and must tolerate
/// concurrent calls. Every hook defaults to "proceed".
#[async_trait]
pub trait HandlerProxy<E: Entity>: Send + Sync {
    /// Runs after the id and initial stamp are assigned, before insert.
    async fn before_create(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        let _ = (ctx, entity);
        Ok(())
    }

    /// Runs with the caller's new state and the currently stored state.
    async fn before_update(
        &self,
        ctx: &MutationContext,
        entity: &mut E,
        previous: &E,
    ) -> Result<(), String> {
        let _ = (ctx, entity, previous);
        Ok(())
    }

    /// Runs with the currently stored state. For soft-deleted entities the
    /// mutated value is what gets written as the tombstone.
    async fn before_delete(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        let _ = (ctx, entity);
        Ok(())
    }
}

/// Accepts everything and changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl<E: Entity> HandlerProxy<E> for NoopHandler {}

/// Stamps [`AuditFields`](crate::AuditFields) and optionally enforces
/// ownership.
///
/// With ownership enforced, updates and deletes of a record whose
/// `created_by` is set are rejected unless the acting principal is that
/// owner. Entities without audit fields pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct AuditHandler {
    enforce_ownership: bool,
}

impl AuditHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enforcing_ownership() -> Self {
        Self {
            enforce_ownership: true,
        }
    }

    fn check_owner<E: Entity>(&self, ctx: &MutationContext, stored: &E) -> Result<(), String> {
        if !self.enforce_ownership {
            return Ok(());
        }
        let Some(owner) = stored.audit_fields().and_then(|a| a.created_by.as_deref()) else {
            return Ok(());
        };
        match ctx.actor.as_deref() {
            Some(actor) if actor == owner => Ok(()),
            Some(actor) => Err(format!(
                "{actor} is not the owner of this {}",
                ctx.entity_type
            )),
            None => Err(format!(
                "an anonymous caller cannot modify an owned {}",
                ctx.entity_type
            )),
        }
    }
}

#[async_trait]
impl<E: Entity> HandlerProxy<E> for AuditHandler {
    async fn before_create(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        if let Some(audit) = entity.audit_fields_mut() {
            audit.created_by = ctx.actor.clone();
            audit.created_at = Some(ctx.at);
            audit.modified_by = ctx.actor.clone();
            audit.modified_at = Some(ctx.at);
        }
        Ok(())
    }

    async fn before_update(
        &self,
        ctx: &MutationContext,
        entity: &mut E,
        previous: &E,
    ) -> Result<(), String> {
        self.check_owner(ctx, previous)?;
        let created = previous
            .audit_fields()
            .map(|a| (a.created_by.clone(), a.created_at));
        if let Some(audit) = entity.audit_fields_mut() {
            // Creation metadata is owned by the store, not the caller.
            if let Some((created_by, created_at)) = created {
                audit.created_by = created_by;
                audit.created_at = created_at;
            }
            audit.modified_by = ctx.actor.clone();
            audit.modified_at = Some(ctx.at);
        }
        Ok(())
    }

    async fn before_delete(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        self.check_owner(ctx, entity)?;
        if let Some(audit) = entity.audit_fields_mut() {
            audit.modified_by = ctx.actor.clone();
            audit.modified_at = Some(ctx.at);
        }
        Ok(())
    }
}

/// Runs several handlers in order; the first rejection wins.
pub struct HandlerChain<E: Entity> {
    handlers: Vec<Arc<dyn HandlerProxy<E>>>,
}

impl<E: Entity> Default for HandlerChain<E> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<E: Entity> HandlerChain<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn HandlerProxy<E>>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl<E: Entity> HandlerProxy<E> for HandlerChain<E> {
    async fn before_create(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        for (index, handler) in self.handlers.iter().enumerate() {
            handler.before_create(ctx, entity).await.inspect_err(|reason| {
                debug!(entity_type = ctx.entity_type, index, %reason, "Handler rejected create");
            })?;
        }
        Ok(())
    }

    async fn before_update(
        &self,
        ctx: &MutationContext,
        entity: &mut E,
        previous: &E,
    ) -> Result<(), String> {
        for (index, handler) in self.handlers.iter().enumerate() {
            handler
                .before_update(ctx, entity, previous)
                .await
                .inspect_err(|reason| {
                    debug!(entity_type = ctx.entity_type, index, %reason, "Handler rejected update");
                })?;
        }
        Ok(())
    }

    async fn before_delete(&self, ctx: &MutationContext, entity: &mut E) -> Result<(), String> {
        for (index, handler) in self.handlers.iter().enumerate() {
            handler.before_delete(ctx, entity).await.inspect_err(|reason| {
                debug!(entity_type = ctx.entity_type, index, %reason, "Handler rejected delete");
            })?;
        }
        Ok(())
    }
}
