mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{memory_db, note_store, Note};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use storekit_model::{AuditHandler, Document, Entity, HandlerProxy, MutationContext};
use storekit_storage::{
    ErrorDescriber, ErrorDescription, MemoryDatabase, OperationResult, Query, Store, StoreError,
    StoreOptions,
};
use storekit_types::{ConcurrencyStamp, EntityId, PartitionKey};

fn soft_delete_options() -> StoreOptions {
    StoreOptions {
        soft_delete: true,
        ..StoreOptions::default()
    }
}

// ── Create / Read ────────────────────────────────────────────────

#[tokio::test]
async fn create_then_read_round_trips() {
    let db = memory_db();
    let store = note_store(&db);

    let created = store.create(Note::new("inbox", "A")).await.unwrap();
    let id = created.id.expect("id assigned");
    assert!(created.concurrency_stamp.is_some());

    let read = store.read(&id).await.unwrap();
    assert_eq!(read, created);
}

#[tokio::test]
async fn create_keeps_a_caller_supplied_id() {
    let db = memory_db();
    let store = note_store(&db);
    let id = EntityId::new();
    let mut note = Note::new("inbox", "A");
    note.id = Some(id);

    let created = store.create(note).await.unwrap();
    assert_eq!(created.id, Some(id));
}

#[tokio::test]
async fn create_replaces_a_caller_supplied_stamp() {
    let db = memory_db();
    let store = note_store(&db);
    let forged = ConcurrencyStamp::parse("forged").unwrap();
    let mut note = Note::new("inbox", "A");
    note.concurrency_stamp = Some(forged.clone());

    let created = store.create(note).await.unwrap();
    assert_ne!(created.concurrency_stamp, Some(forged));
}

#[tokio::test]
async fn create_with_a_taken_id_is_a_validation_failure() {
    let db = memory_db();
    let store = note_store(&db);
    let created = store.create(Note::new("inbox", "A")).await.unwrap();

    let mut twin = Note::new("inbox", "B");
    twin.id = created.id;
    let err = store.create(twin).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(_)), "{err:?}");
    assert_eq!(store.read(&created.id.unwrap()).await.unwrap().name, "A");
}

#[tokio::test]
async fn read_of_unknown_id_is_not_found() {
    let db = memory_db();
    let store = note_store(&db);
    let err = store.read(&EntityId::new()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.find(&EntityId::new()).await.unwrap(), None);
}

#[tokio::test]
async fn unregistered_entity_type_is_a_persistence_failure() {
    let db = MemoryDatabase::new();
    let store: Store<Document, _> = Store::new(Arc::new(db.context()));
    let err = store.create(Document::new(json!({}))).await.unwrap_err();
    assert!(matches!(err, StoreError::PersistenceFailed(_)), "{err:?}");
}

// ── Update ───────────────────────────────────────────────────────

#[tokio::test]
async fn stale_update_conflicts_and_keeps_the_winner() {
    let db = memory_db();
    let store = note_store(&db);

    let a = store.create(Note::new("inbox", "A")).await.unwrap();
    let s1 = a.concurrency_stamp.clone().unwrap();
    let id = a.id.unwrap();

    let mut b = a.clone();
    b.name = "B".into();
    let b = store.update(b).await.unwrap();
    let s2 = b.concurrency_stamp.clone().unwrap();
    assert_ne!(s1, s2);

    let read = store.read(&id).await.unwrap();
    assert_eq!((read.name.as_str(), read.concurrency_stamp.as_ref()), ("B", Some(&s2)));

    let mut c = a.clone();
    c.name = "C".into();
    let err = store.update(c).await.unwrap_err();
    assert!(err.is_conflict(), "{err:?}");

    let read = store.read(&id).await.unwrap();
    assert_eq!(read, b);
}

#[tokio::test]
async fn update_without_id_or_stamp_is_rejected() {
    let db = memory_db();
    let store = note_store(&db);

    let err = store.update(Note::new("inbox", "no id")).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(_)));

    let mut created = store.create(Note::new("inbox", "A")).await.unwrap();
    created.concurrency_stamp = None;
    let err = store.update(created).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(_)));
}

#[tokio::test]
async fn update_of_missing_entity_is_not_found() {
    let db = memory_db();
    let store = note_store(&db);
    let mut ghost = Note::new("inbox", "ghost");
    ghost.id = Some(EntityId::new());
    ghost.concurrency_stamp = Some(ConcurrencyStamp::generate());
    assert!(store.update(ghost).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn partition_key_cannot_move() {
    let db = memory_db();
    let store = note_store(&db);
    let mut note = store.create(Note::new("inbox", "A")).await.unwrap();
    note.folder = storekit_types::PartitionKey::new("archive").unwrap();

    let err = store.update(note.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(ref r) if r.contains("partition")));
    assert_eq!(store.read(&note.id.unwrap()).await.unwrap().folder.as_str(), "inbox");
}

#[tokio::test]
async fn create_refuses_an_entity_marked_deleted() {
    let db = memory_db();
    let store = note_store(&db);
    let mut note = Note::new("inbox", "A");
    note.deleted_at = Some(Utc::now());

    let err = store.create(note).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(ref r) if r.contains("marked deleted")));
    assert_eq!(db.row_count(Note::ENTITY_TYPE), 0);
}

#[tokio::test]
async fn update_cannot_tombstone_a_record() {
    let db = memory_db();
    let store = note_store(&db);
    let note = store.create(Note::new("inbox", "A")).await.unwrap();

    let mut edit = note.clone();
    edit.deleted_at = Some(Utc::now());
    let err = store.update(edit).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(_)));

    let read = store.read(&note.id.unwrap()).await.unwrap();
    assert_eq!(read, note);
    assert_eq!(store.query(Query::all()).await.unwrap().len(), 1);
}

// ── Delete ───────────────────────────────────────────────────────

#[tokio::test]
async fn delete_with_stale_stamp_conflicts() {
    let db = memory_db();
    let store = note_store(&db);
    let a = store.create(Note::new("inbox", "A")).await.unwrap();
    let id = a.id.unwrap();

    let err = store.delete(&id, &ConcurrencyStamp::generate()).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(store.read(&id).await.is_ok());
}

#[tokio::test]
async fn hard_delete_removes_the_row() {
    let db = memory_db();
    let store = note_store(&db);
    let a = store.create(Note::new("inbox", "A")).await.unwrap();
    let id = a.id.unwrap();

    store.delete(&id, a.concurrency_stamp.as_ref().unwrap()).await.unwrap();
    assert!(store.read(&id).await.unwrap_err().is_not_found());
    assert_eq!(db.row_count(Note::ENTITY_TYPE), 0);
}

#[tokio::test]
async fn soft_delete_leaves_a_tombstone() {
    let db = memory_db();
    let store = note_store(&db).with_options(soft_delete_options());
    let a = store.create(Note::new("inbox", "A")).await.unwrap();
    let id = a.id.unwrap();

    store.delete(&id, a.concurrency_stamp.as_ref().unwrap()).await.unwrap();
    assert!(store.read(&id).await.unwrap_err().is_not_found());
    assert_eq!(db.row_count(Note::ENTITY_TYPE), 1);

    let visible = store.query(Query::all()).await.unwrap();
    assert!(visible.is_empty());

    let all: Vec<Note> = store.query(Query::all().with_deleted()).await.unwrap().into_items();
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted_at.is_some());
}

#[tokio::test]
async fn deleting_a_tombstone_is_not_found() {
    let db = memory_db();
    let store = note_store(&db).with_options(soft_delete_options());
    let a = store.create(Note::new("inbox", "A")).await.unwrap();
    let id = a.id.unwrap();
    let stamp = a.concurrency_stamp.unwrap();

    store.delete(&id, &stamp).await.unwrap();
    assert!(store.delete(&id, &stamp).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn entities_without_soft_delete_are_removed_even_when_enabled() {
    let db = MemoryDatabase::new();
    db.register(&Document::schema()).unwrap();
    let store: Store<Document, _> =
        Store::new(Arc::new(db.context())).with_options(soft_delete_options());

    let doc = store.create(Document::new(json!({"n": 1}))).await.unwrap();
    store
        .delete(&doc.id.unwrap(), doc.concurrency_stamp.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(db.row_count(Document::ENTITY_TYPE), 0);
}

// ── Handler interception ─────────────────────────────────────────

struct RejectNamed(&'static str);

#[async_trait]
impl HandlerProxy<Note> for RejectNamed {
    async fn before_create(&self, _ctx: &MutationContext, note: &mut Note) -> Result<(), String> {
        if note.name == self.0 {
            Err(format!("'{}' is a reserved name", self.0))
        } else {
            Ok(())
        }
    }

    async fn before_update(
        &self,
        ctx: &MutationContext,
        note: &mut Note,
        _previous: &Note,
    ) -> Result<(), String> {
        self.before_create(ctx, note).await
    }
}

struct Hijack;

#[async_trait]
impl HandlerProxy<Note> for Hijack {
    async fn before_create(&self, _ctx: &MutationContext, note: &mut Note) -> Result<(), String> {
        note.id = Some(EntityId::new());
        Ok(())
    }
}

#[tokio::test]
async fn handler_rejection_aborts_create_with_reason() {
    let db = memory_db();
    let store = note_store(&db).with_handler(Arc::new(RejectNamed("root")));

    let err = store.create(Note::new("inbox", "root")).await.unwrap_err();
    match err {
        StoreError::ValidationFailed(reason) => assert_eq!(reason, "'root' is a reserved name"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(db.row_count(Note::ENTITY_TYPE), 0);
}

#[tokio::test]
async fn handler_rejection_aborts_update_without_writing() {
    let db = memory_db();
    let store = note_store(&db).with_handler(Arc::new(RejectNamed("root")));
    let a = store.create(Note::new("inbox", "A")).await.unwrap();

    let mut renamed = a.clone();
    renamed.name = "root".into();
    assert!(store.update(renamed).await.is_err());
    assert_eq!(store.read(&a.id.unwrap()).await.unwrap(), a);
}

#[tokio::test]
async fn handlers_may_not_change_the_id() {
    let db = memory_db();
    let store = note_store(&db).with_handler(Arc::new(Hijack));
    let err = store.create(Note::new("inbox", "A")).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(_)));
    assert_eq!(db.row_count(Note::ENTITY_TYPE), 0);
}

struct Relocate;

#[async_trait]
impl HandlerProxy<Note> for Relocate {
    async fn before_update(
        &self,
        _ctx: &MutationContext,
        note: &mut Note,
        _previous: &Note,
    ) -> Result<(), String> {
        note.folder = PartitionKey::new("elsewhere").map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[tokio::test]
async fn handlers_may_not_move_the_partition() {
    let db = memory_db();
    let store = note_store(&db).with_handler(Arc::new(Relocate));
    let note = store.create(Note::new("inbox", "A")).await.unwrap();

    let mut renamed = note.clone();
    renamed.name = "B".into();
    let err = store.update(renamed).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(ref r) if r.contains("partition")));

    let read = store.read(&note.id.unwrap()).await.unwrap();
    assert_eq!(read.folder.as_str(), "inbox");
    assert_eq!(read.name, "A");
}

#[tokio::test]
async fn actor_flows_into_audit_fields() {
    let db = memory_db();
    let alice = note_store(&db)
        .with_handler(Arc::new(AuditHandler::enforcing_ownership()))
        .with_actor("alice");
    let bob = note_store(&db)
        .with_handler(Arc::new(AuditHandler::enforcing_ownership()))
        .with_actor("bob");

    let note = alice.create(Note::new("inbox", "A")).await.unwrap();
    assert_eq!(note.audit.created_by.as_deref(), Some("alice"));

    let mut edit = note.clone();
    edit.name = "B".into();
    let err = bob.update(edit.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationFailed(ref r) if r.contains("not the owner")));

    let edited = alice.update(edit).await.unwrap();
    assert_eq!(edited.audit.modified_by.as_deref(), Some("alice"));
    assert_eq!(edited.audit.created_at, note.audit.created_at);
}

// ── Structured results ───────────────────────────────────────────

struct Terse;

impl ErrorDescriber for Terse {
    fn describe(&self, err: &StoreError) -> ErrorDescription {
        ErrorDescription::new("E", err.to_string())
    }
}

#[tokio::test]
async fn describe_summarizes_outcomes() {
    let db = memory_db();
    let store = note_store(&db);
    let a = store.create(Note::new("inbox", "A")).await.unwrap();

    let ok = store.describe(&Ok::<_, StoreError>(()));
    assert_eq!(ok, OperationResult::success());

    let stale = store.delete(&a.id.unwrap(), &ConcurrencyStamp::generate()).await;
    let result = store.describe(&stale);
    assert!(!result.succeeded);
    assert_eq!(result.errors[0].code, "ConcurrencyFailure");

    let terse = note_store(&db).with_describer(Arc::new(Terse));
    let missing = terse.read(&EntityId::new()).await;
    assert_eq!(terse.describe(&missing).errors[0].code, "E");
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn closed_store_refuses_operations() {
    let db = memory_db();
    let store = note_store(&db);
    store.close().await.unwrap();
    assert!(store.is_closed());
    let err = store.create(Note::new("inbox", "A")).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed { entity_type: "note" }));
}
