#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use storekit_model::{
    AuditFields, CacheError, CacheProxy, CacheResult, Entity, EntitySchema, HasAudit,
    HasConcurrencyStamp, HasIdentity, HasPartitionKey, IndexedField, MemoryCache, SoftDelete,
};
use storekit_storage::{MemoryContext, MemoryDatabase, Store};
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};

/// Partitioned, audited, soft-deletable test entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<EntityId>,
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    pub folder: PartitionKey,
    pub name: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audit: AuditFields,
}

impl Note {
    pub fn new(folder: &str, name: &str) -> Self {
        Self {
            id: None,
            concurrency_stamp: None,
            folder: PartitionKey::new(folder).unwrap(),
            name: name.into(),
            deleted_at: None,
            audit: AuditFields::default(),
        }
    }
}

impl HasIdentity for Note {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for Note {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasPartitionKey for Note {
    fn partition_key(&self) -> &PartitionKey {
        &self.folder
    }
}

impl HasAudit for Note {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl SoftDelete for Note {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }
}

impl Entity for Note {
    const ENTITY_TYPE: &'static str = "note";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .table("notes")
            .partitioned()
            .index(IndexedField::text("/name"))
    }

    fn partition(&self) -> Option<&PartitionKey> {
        Some(self.partition_key())
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        Some(self.audit())
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        Some(self.audit_mut())
    }

    fn soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        Some(self)
    }

    fn is_deleted(&self) -> bool {
        SoftDelete::is_deleted(self)
    }
}

pub fn memory_db() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.register(&Note::schema()).unwrap();
    db
}

pub fn note_store(db: &MemoryDatabase) -> Store<Note, MemoryContext> {
    Store::new(Arc::new(db.context()))
}

/// A cache whose reads and invalidations can be switched off.
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    pub fail_reads: AtomicBool,
    pub fail_invalidations: AtomicBool,
    pub hits: AtomicUsize,
}

impl FlakyCache {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_failing_reads(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_invalidations(&self, failing: bool) {
        self.fail_invalidations.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl<E: Entity> CacheProxy<E> for FlakyCache {
    async fn get(&self, id: &EntityId) -> CacheResult<Option<E>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("read refused".into()));
        }
        let hit: Option<E> = self.inner.get(id).await?;
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(hit)
    }

    async fn set(&self, id: &EntityId, entity: &E, ttl: Duration) -> CacheResult<()> {
        self.inner.set(id, entity, ttl).await
    }

    async fn invalidate(&self, id: &EntityId) -> CacheResult<()> {
        if self.fail_invalidations.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("invalidate refused".into()));
        }
        CacheProxy::<E>::invalidate(&self.inner, id).await
    }
}
