use crate::context::{BackingContext, CasOutcome, ScanFilter, StoredRow};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use storekit_model::EntitySchema;
use storekit_types::{ConcurrencyStamp, EntityId};
use tracing::info;

type Tables = HashMap<String, BTreeMap<EntityId, StoredRow>>;

/// Process-local engine. Every context handed out shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an entity type available. Registering twice is a no-op.
    pub fn register(&self, schema: &EntitySchema) -> StorageResult<()> {
        schema.validate()?;
        let mut tables = lock(&self.tables)?;
        if !tables.contains_key(&schema.entity_type) {
            tables.insert(schema.entity_type.clone(), BTreeMap::new());
            info!(entity_type = %schema.entity_type, "Registered in-memory table");
        }
        Ok(())
    }

    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            tables: Arc::clone(&self.tables),
        }
    }

    /// Rows held for an entity type, tombstones included.
    pub fn row_count(&self, entity_type: &str) -> usize {
        lock(&self.tables)
            .ok()
            .and_then(|t| t.get(entity_type).map(BTreeMap::len))
            .unwrap_or(0)
    }
}

/// A scope's handle onto a [`MemoryDatabase`].
#[derive(Clone)]
pub struct MemoryContext {
    tables: Arc<Mutex<Tables>>,
}

fn lock(tables: &Mutex<Tables>) -> StorageResult<MutexGuard<'_, Tables>> {
    tables
        .lock()
        .map_err(|_| StorageError::Unavailable("memory engine lock poisoned".into()))
}

fn table<'a>(
    tables: &'a mut Tables,
    entity_type: &str,
) -> StorageResult<&'a mut BTreeMap<EntityId, StoredRow>> {
    tables
        .get_mut(entity_type)
        .ok_or_else(|| StorageError::Unregistered(entity_type.to_string()))
}

#[async_trait]
impl BackingContext for MemoryContext {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> StorageResult<Option<StoredRow>> {
        let mut tables = lock(&self.tables)?;
        Ok(table(&mut tables, entity_type)?.get(id).cloned())
    }

    async fn insert(&self, entity_type: &str, row: StoredRow) -> StorageResult<()> {
        let mut tables = lock(&self.tables)?;
        let rows = table(&mut tables, entity_type)?;
        if rows.contains_key(&row.id) {
            return Err(StorageError::Duplicate {
                entity_type: entity_type.to_string(),
                id: row.id,
            });
        }
        rows.insert(row.id, row);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        entity_type: &str,
        expected: &ConcurrencyStamp,
        row: StoredRow,
    ) -> StorageResult<CasOutcome> {
        let mut tables = lock(&self.tables)?;
        let rows = table(&mut tables, entity_type)?;
        match rows.get_mut(&row.id) {
            None => Ok(CasOutcome::Missing),
            Some(current) if current.concurrency_stamp != *expected => Ok(CasOutcome::StampMismatch),
            Some(current) => {
                *current = row;
                Ok(CasOutcome::Applied)
            }
        }
    }

    async fn compare_and_delete(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected: &ConcurrencyStamp,
    ) -> StorageResult<CasOutcome> {
        let mut tables = lock(&self.tables)?;
        let rows = table(&mut tables, entity_type)?;
        match rows.get(id) {
            None => Ok(CasOutcome::Missing),
            Some(current) if current.concurrency_stamp != *expected => Ok(CasOutcome::StampMismatch),
            Some(_) => {
                rows.remove(id);
                Ok(CasOutcome::Applied)
            }
        }
    }

    async fn scan(&self, entity_type: &str, filter: &ScanFilter) -> StorageResult<Vec<StoredRow>> {
        let mut tables = lock(&self.tables)?;
        Ok(table(&mut tables, entity_type)?
            .values()
            .filter(|r| filter.include_deleted || !r.deleted)
            .filter(|r| match &filter.partition {
                Some(p) => r.partition_key.as_ref() == Some(p),
                None => true,
            })
            .cloned()
            .collect())
    }
}
