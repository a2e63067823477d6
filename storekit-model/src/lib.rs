//! Core entity model for StoreKit.
//!
//! Defines the contracts every persisted record and every store collaborator
//! satisfies:
//! - Capability traits ([`HasIdentity`], [`HasConcurrencyStamp`],
//!   [`HasPartitionKey`], [`HasAudit`], [`SoftDelete`]) composed by the
//!   [`Entity`] trait
//! - [`EntitySchema`]: an explicit description of an entity's storage
//!   layout, consumed only by backing-context adapters
//! - [`HandlerProxy`]: hooks run before every mutation to stamp metadata or
//!   veto the write
//! - [`CacheProxy`]: an advisory read cache keyed by entity id
//!
//! The generic store in `storekit-storage` is written entirely against these
//! traits.

mod cache;
mod document;
mod entity;
mod handler;
mod schema;

pub use cache::{CacheError, CacheProxy, CacheResult, MemoryCache, NoCache};
pub use document::Document;
pub use entity::{AuditFields, Entity, HasAudit, HasConcurrencyStamp, HasIdentity, HasPartitionKey, SoftDelete};
pub use handler::{AuditHandler, HandlerChain, HandlerProxy, MutationContext, MutationKind, NoopHandler};
pub use schema::{EntitySchema, FieldType, IndexedField, SchemaError};
