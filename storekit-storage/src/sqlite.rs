//! SQLite engine.
//!
//! One table per registered entity type, with the body kept as JSON text
//! and the fence columns (`concurrency_stamp`, `deleted`) kept beside it.
//! Indexed fields become `json_extract` expression indexes.
//!
//! Every call runs on the blocking pool so a slow disk never stalls the
//! async runtime.

use crate::context::{BackingContext, CasOutcome, ScanFilter, StoredRow};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use storekit_model::EntitySchema;
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};
use tracing::{debug, info};

const COLUMNS: &str = "id, partition_key, concurrency_stamp, deleted, data";

/// A SQLite database file (or in-memory database) shared by every scope.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    tables: Arc<RwLock<HashMap<String, String>>>,
}

impl SqliteDatabase {
    /// Opens (or creates) a database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened SQLite database");
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates the table and indexes for an entity type if missing.
    pub fn register(&self, schema: &EntitySchema) -> StorageResult<()> {
        schema.validate()?;
        let ddl = table_ddl(schema);
        {
            let conn = self
                .conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))?;
            conn.execute_batch(&ddl)?;
        }
        self.tables
            .write()
            .map_err(|_| StorageError::Unavailable("table map lock poisoned".into()))?
            .insert(schema.entity_type.clone(), schema.table.clone());
        info!(
            entity_type = %schema.entity_type,
            table = %schema.table,
            indexes = schema.indexed_fields.len(),
            "Registered SQLite table"
        );
        Ok(())
    }

    pub fn context(&self) -> SqliteContext {
        SqliteContext {
            conn: Arc::clone(&self.conn),
            tables: Arc::clone(&self.tables),
        }
    }
}

fn table_ddl(schema: &EntitySchema) -> String {
    let table = &schema.table;
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id TEXT PRIMARY KEY NOT NULL,
            partition_key TEXT,
            concurrency_stamp TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL
        );\n"
    );
    if schema.partitioned {
        ddl.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_partition\" ON \"{table}\"(partition_key);\n"
        ));
    }
    // Index names embed the field path verbatim; validated paths never
    // contain quotes. Unique indexes ignore tombstones.
    for field in &schema.indexed_fields {
        let path = &field.field_path;
        let json_path = format!("$.{}", path[1..].replace('/', "."));
        let (unique, live_only) = if field.unique {
            ("UNIQUE ", " WHERE deleted = 0")
        } else {
            ("", "")
        };
        ddl.push_str(&format!(
            "CREATE {unique}INDEX IF NOT EXISTS \"idx_{table}{path}\" ON \"{table}\"(json_extract(data, '{json_path}')){live_only};\n"
        ));
    }
    ddl
}

/// A scope's handle onto a [`SqliteDatabase`].
#[derive(Clone)]
pub struct SqliteContext {
    conn: Arc<Mutex<Connection>>,
    tables: Arc<RwLock<HashMap<String, String>>>,
}

impl SqliteContext {
    fn table(&self, entity_type: &str) -> StorageResult<String> {
        self.tables
            .read()
            .map_err(|_| StorageError::Unavailable("table map lock poisoned".into()))?
            .get(entity_type)
            .cloned()
            .ok_or_else(|| StorageError::Unregistered(entity_type.to_string()))
    }

    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, String, bool, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_row(raw: (String, Option<String>, String, bool, String)) -> StorageResult<StoredRow> {
    let (id, partition_key, stamp, deleted, data) = raw;
    let invalid = |e: &dyn std::fmt::Display| StorageError::InvalidData(e.to_string());
    Ok(StoredRow {
        id: EntityId::parse(&id).map_err(|e| invalid(&e))?,
        partition_key: partition_key
            .map(PartitionKey::new)
            .transpose()
            .map_err(|e| invalid(&e))?,
        concurrency_stamp: ConcurrencyStamp::parse(&stamp).map_err(|e| invalid(&e))?,
        deleted,
        data: serde_json::from_str(&data)?,
    })
}

fn exists(conn: &Connection, table: &str, id: &str) -> StorageResult<bool> {
    Ok(conn
        .query_row(
            &format!("SELECT 1 FROM \"{table}\" WHERE id = ?1"),
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn constraint_or(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => StorageError::Database(err),
    }
}

#[async_trait]
impl BackingContext for SqliteContext {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> StorageResult<Option<StoredRow>> {
        let table = self.table(entity_type)?;
        let id = id.to_string();
        self.run(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM \"{table}\" WHERE id = ?1"),
                    params![id],
                    read_row,
                )
                .optional()?;
            raw.map(decode_row).transpose()
        })
        .await
    }

    async fn insert(&self, entity_type: &str, row: StoredRow) -> StorageResult<()> {
        let table = self.table(entity_type)?;
        let entity_type = entity_type.to_string();
        self.run(move |conn| {
            let id = row.id.to_string();
            if exists(conn, &table, &id)? {
                return Err(StorageError::Duplicate {
                    entity_type,
                    id: row.id,
                });
            }
            conn.execute(
                &format!("INSERT INTO \"{table}\" ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    id,
                    row.partition_key.as_ref().map(PartitionKey::as_str),
                    row.concurrency_stamp.as_str(),
                    row.deleted,
                    serde_json::to_string(&row.data)?,
                ],
            )
            .map_err(constraint_or)?;
            Ok(())
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        entity_type: &str,
        expected: &ConcurrencyStamp,
        row: StoredRow,
    ) -> StorageResult<CasOutcome> {
        let table = self.table(entity_type)?;
        let expected = expected.as_str().to_string();
        self.run(move |conn| {
            let id = row.id.to_string();
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE \"{table}\" SET partition_key = ?1, concurrency_stamp = ?2, deleted = ?3, data = ?4
                         WHERE id = ?5 AND concurrency_stamp = ?6"
                    ),
                    params![
                        row.partition_key.as_ref().map(PartitionKey::as_str),
                        row.concurrency_stamp.as_str(),
                        row.deleted,
                        serde_json::to_string(&row.data)?,
                        id,
                        expected,
                    ],
                )
                .map_err(constraint_or)?;
            if changed == 1 {
                Ok(CasOutcome::Applied)
            } else if exists(conn, &table, &id)? {
                debug!(table = %table, %id, "Conditional update lost the stamp race");
                Ok(CasOutcome::StampMismatch)
            } else {
                Ok(CasOutcome::Missing)
            }
        })
        .await
    }

    async fn compare_and_delete(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected: &ConcurrencyStamp,
    ) -> StorageResult<CasOutcome> {
        let table = self.table(entity_type)?;
        let id = id.to_string();
        let expected = expected.as_str().to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                &format!("DELETE FROM \"{table}\" WHERE id = ?1 AND concurrency_stamp = ?2"),
                params![id, expected],
            )?;
            if changed == 1 {
                Ok(CasOutcome::Applied)
            } else if exists(conn, &table, &id)? {
                Ok(CasOutcome::StampMismatch)
            } else {
                Ok(CasOutcome::Missing)
            }
        })
        .await
    }

    async fn scan(&self, entity_type: &str, filter: &ScanFilter) -> StorageResult<Vec<StoredRow>> {
        let table = self.table(entity_type)?;
        let partition = filter.partition.as_ref().map(|p| p.as_str().to_string());
        let include_deleted = filter.include_deleted;
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM \"{table}\"
                 WHERE (?1 IS NULL OR partition_key = ?1) AND (?2 OR deleted = 0)
                 ORDER BY id"
            ))?;
            let raw = stmt
                .query_map(params![partition, include_deleted], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(decode_row).collect()
        })
        .await
    }
}
