mod common;

use common::{memory_db, note_store, Note};
use std::sync::Arc;
use storekit_storage::{StoreError, StoreOptions};

// ── Same stamp, separate scopes ──────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_writers_with_one_stamp_exactly_one_wins() {
    let db = memory_db();
    let seed = note_store(&db).create(Note::new("inbox", "A")).await.unwrap();
    let id = seed.id.unwrap();

    let mut left = seed.clone();
    left.name = "left".into();
    let mut right = seed.clone();
    right.name = "right".into();

    let (l, r) = tokio::join!(
        {
            let store = note_store(&db);
            async move { store.update(left).await }
        },
        {
            let store = note_store(&db);
            async move { store.update(right).await }
        }
    );

    let (winner, loser) = match (l, r) {
        (Ok(w), Err(e)) | (Err(e), Ok(w)) => (w, e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(loser.is_conflict(), "{loser:?}");
    assert_ne!(winner.concurrency_stamp, seed.concurrency_stamp);

    let stored = note_store(&db).read(&id).await.unwrap();
    assert_eq!(stored, winner);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_spawned_writers_produce_one_commit() {
    let db = memory_db();
    let seed = note_store(&db).create(Note::new("inbox", "A")).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..16 {
        let store = Arc::new(note_store(&db));
        let mut edit = seed.clone();
        edit.name = format!("writer-{n}");
        tasks.push(tokio::spawn(async move { store.update(edit).await }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected {e:?}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_racing_delete_never_both_commit() {
    let db = memory_db();
    let seed = note_store(&db).create(Note::new("inbox", "A")).await.unwrap();
    let id = seed.id.unwrap();
    let stamp = seed.concurrency_stamp.clone().unwrap();

    let mut edit = seed.clone();
    edit.name = "edited".into();

    let updater = note_store(&db);
    let deleter = note_store(&db).with_options(StoreOptions {
        soft_delete: false,
        ..StoreOptions::default()
    });
    let (updated, deleted) = tokio::join!(updater.update(edit), deleter.delete(&id, &stamp));

    match (updated, deleted) {
        (Ok(_), Err(e)) => {
            assert!(e.is_conflict());
            assert_eq!(note_store(&db).read(&id).await.unwrap().name, "edited");
        }
        (Err(e), Ok(())) => {
            assert!(e.is_conflict() || e.is_not_found(), "{e:?}");
            assert!(matches!(
                note_store(&db).read(&id).await,
                Err(StoreError::NotFound { .. })
            ));
        }
        other => panic!("expected exactly one winner, got {other:?}"),
    }
}
