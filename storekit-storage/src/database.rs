use crate::config::EngineConfig;
use crate::context::{BackingContext, CasOutcome, ScanFilter, StoredRow};
use crate::error::StorageResult;
use crate::memory::{MemoryContext, MemoryDatabase};
use crate::sqlite::{SqliteContext, SqliteDatabase};
use async_trait::async_trait;
use storekit_model::{Entity, EntitySchema};
use storekit_types::{ConcurrencyStamp, EntityId};

/// An opened engine, chosen by configuration.
#[derive(Clone)]
pub enum Database {
    Memory(MemoryDatabase),
    Sqlite(SqliteDatabase),
}

impl Database {
    pub fn open(config: &EngineConfig) -> StorageResult<Self> {
        match config {
            EngineConfig::Memory => Ok(Self::Memory(MemoryDatabase::new())),
            EngineConfig::Sqlite { path } if path.as_os_str() == ":memory:" => {
                Ok(Self::Sqlite(SqliteDatabase::open_in_memory()?))
            }
            EngineConfig::Sqlite { path } => Ok(Self::Sqlite(SqliteDatabase::open(path)?)),
        }
    }

    pub fn register(&self, schema: &EntitySchema) -> StorageResult<()> {
        match self {
            Self::Memory(db) => db.register(schema),
            Self::Sqlite(db) => db.register(schema),
        }
    }

    /// Registers an entity type using its declared schema.
    pub fn register_entity<E: Entity>(&self) -> StorageResult<()> {
        self.register(&E::schema())
    }

    /// A fresh context for one request scope.
    pub fn context(&self) -> Context {
        match self {
            Self::Memory(db) => Context::Memory(db.context()),
            Self::Sqlite(db) => Context::Sqlite(db.context()),
        }
    }
}

/// A context onto whichever engine was configured.
#[derive(Clone)]
pub enum Context {
    Memory(MemoryContext),
    Sqlite(SqliteContext),
}

#[async_trait]
impl BackingContext for Context {
    fn engine(&self) -> &'static str {
        match self {
            Self::Memory(c) => c.engine(),
            Self::Sqlite(c) => c.engine(),
        }
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> StorageResult<Option<StoredRow>> {
        match self {
            Self::Memory(c) => c.fetch(entity_type, id).await,
            Self::Sqlite(c) => c.fetch(entity_type, id).await,
        }
    }

    async fn insert(&self, entity_type: &str, row: StoredRow) -> StorageResult<()> {
        match self {
            Self::Memory(c) => c.insert(entity_type, row).await,
            Self::Sqlite(c) => c.insert(entity_type, row).await,
        }
    }

    async fn compare_and_swap(
        &self,
        entity_type: &str,
        expected: &ConcurrencyStamp,
        row: StoredRow,
    ) -> StorageResult<CasOutcome> {
        match self {
            Self::Memory(c) => c.compare_and_swap(entity_type, expected, row).await,
            Self::Sqlite(c) => c.compare_and_swap(entity_type, expected, row).await,
        }
    }

    async fn compare_and_delete(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected: &ConcurrencyStamp,
    ) -> StorageResult<CasOutcome> {
        match self {
            Self::Memory(c) => c.compare_and_delete(entity_type, id, expected).await,
            Self::Sqlite(c) => c.compare_and_delete(entity_type, id, expected).await,
        }
    }

    async fn scan(&self, entity_type: &str, filter: &ScanFilter) -> StorageResult<Vec<StoredRow>> {
        match self {
            Self::Memory(c) => c.scan(entity_type, filter).await,
            Self::Sqlite(c) => c.scan(entity_type, filter).await,
        }
    }
}
