//! Integration tests for the `PostgreSQL` stores.
//!
//! Run with `DATABASE_URL` pointing at a scratch server and `--ignored`.

use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use sqlx::PgPool;

use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::event::DomainEvent;
use eventide_core::filter::{EventFilter, StreamReadingDirection};
use eventide_core::snapshot::{SnapshotEnvelope, SnapshotStore};
use eventide_core::store::EventStore;
use eventide_core::stream::EventStream;
use eventide_event_store::{PgEventStore, PgSnapshotStore};
use eventide_test_support::{AccountCredited, AccountOpened, FixedClock, account_event_map};

async fn started_store(pool: PgPool) -> PgEventStore {
    let store = PgEventStore::new(pool, Arc::new(account_event_map()))
        .with_clock(Arc::new(FixedClock::on(2026, 3, 1)));
    store.start().await.unwrap();
    store
}

fn credits(n: i64) -> Vec<Box<dyn DomainEvent>> {
    (1..=n)
        .map(|amount| Box::new(AccountCredited { amount }) as Box<dyn DomainEvent>)
        .collect()
}

async fn read_versions(store: &PgEventStore, stream: &EventStream, filter: EventFilter) -> Vec<Vec<i64>> {
    store
        .get_envelopes(stream, filter)
        .map_ok(|chunk| chunk.iter().map(|e| e.version()).collect())
        .try_collect()
        .await
        .unwrap()
}

// --- provisioning ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_start_is_idempotent(pool: PgPool) {
    let store = started_store(pool).await;

    let collection = store.start().await.unwrap();

    assert_eq!(collection, "events");
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_append_to_unprovisioned_pool_fails(pool: PgPool) {
    let store = started_store(pool).await;
    let stream = EventStream::new("account", "a-1");

    let result = store
        .append_events(&stream, 3, &credits(3), Some("not-a-pool"))
        .await;

    assert!(matches!(
        result,
        Err(EventSourcingError::Persistence {
            source: StoreFailure::MissingCollection,
            ..
        })
    ));
}

// --- append + read round-trip ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_append_and_read_forward_and_backward(pool: PgPool) {
    let store = started_store(pool).await;
    let stream = EventStream::new("account", "a-1");
    store.append_events(&stream, 3, &credits(3), None).await.unwrap();
    store.append_events(&stream, 6, &credits(3), None).await.unwrap();

    let forward = read_versions(&store, &stream, EventFilter::new().batch(4)).await;
    let backward = read_versions(
        &store,
        &stream,
        EventFilter::new()
            .direction(StreamReadingDirection::Backward)
            .from_version(4),
    )
    .await;

    assert_eq!(forward, vec![vec![1, 2, 3, 4], vec![5, 6]]);
    assert_eq!(backward, vec![vec![6, 5, 4]]);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_custom_serializer_round_trip(pool: PgPool) {
    let store = started_store(pool).await;
    let stream = EventStream::new("account", "a-1");
    let opened = AccountOpened {
        owner: "ada".into(),
        opened_on: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
    };
    let events: Vec<Box<dyn DomainEvent>> = vec![Box::new(opened.clone())];
    store.append_events(&stream, 1, &events, None).await.unwrap();

    let envelope = store.get_envelope(&stream, 1, None).await.unwrap();
    let event = store.get_event(&stream, 1, None).await.unwrap();

    assert_eq!(envelope.payload()["openedOn"], "01/03/2026");
    assert_eq!(event.downcast_ref::<AccountOpened>(), Some(&opened));
}

// --- concurrency ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_expected_version_leaves_stream_untouched(pool: PgPool) {
    let store = started_store(pool).await;
    let stream = EventStream::new("account", "a-1");
    store.append_events(&stream, 3, &credits(3), None).await.unwrap();

    let result = store.append_events(&stream, 3, &credits(3), None).await;

    assert!(result.unwrap_err().is_concurrency_conflict());
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![vec![1, 2, 3]]);
}

// --- point lookups ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_version_is_not_found(pool: PgPool) {
    let store = started_store(pool).await;
    let stream = EventStream::new("account", "a-1");
    store.append_events(&stream, 3, &credits(3), None).await.unwrap();

    let result = store.get_event(&stream, 99, None).await;

    assert!(matches!(
        result,
        Err(EventSourcingError::EventNotFound { version: 99, .. })
    ));
}

// --- snapshots ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_snapshots_are_monotonic(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    store.start().await.unwrap();
    let stream = EventStream::new("account", "a-1");
    let at = |version: i64| {
        SnapshotEnvelope::new(&stream, "account", version, serde_json::json!({ "v": version }), Utc::now())
    };
    store.save(&stream, at(10), None).await.unwrap();

    let stale = store.save(&stream, at(5), None).await;
    let loaded = store.load(&stream, None).await.unwrap().unwrap();

    assert!(matches!(
        stale,
        Err(EventSourcingError::StaleSnapshot {
            version: 5,
            latest: 10,
            ..
        })
    ));
    assert_eq!(loaded.version(), 10);
}
