//! Integration tests for `InMemoryEventStore`.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;

use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::event::DomainEvent;
use eventide_core::filter::{EventFilter, StreamReadingDirection};
use eventide_core::store::EventStore;
use eventide_core::stream::EventStream;
use eventide_event_store::InMemoryEventStore;
use eventide_test_support::{AccountClosed, AccountCredited, FixedClock, account_event_map};

async fn started_store() -> InMemoryEventStore {
    let store = InMemoryEventStore::new(Arc::new(account_event_map()))
        .with_clock(Arc::new(FixedClock::on(2026, 3, 1)));
    store.start().await.unwrap();
    store
}

fn account_stream(id: &str) -> EventStream {
    EventStream::new("account", id)
}

/// Credits with amounts 1..=n, so each amount equals its stream version.
fn credits(n: i64) -> Vec<Box<dyn DomainEvent>> {
    (1..=n)
        .map(|amount| Box::new(AccountCredited { amount }) as Box<dyn DomainEvent>)
        .collect()
}

async fn seeded_store(stream: &EventStream, n: i64) -> InMemoryEventStore {
    let store = started_store().await;
    store.append_events(stream, n, &credits(n), None).await.unwrap();
    store
}

/// Reads events and returns their credit amounts per chunk.
async fn read_amounts(
    store: &InMemoryEventStore,
    stream: &EventStream,
    filter: EventFilter,
) -> Vec<Vec<i64>> {
    store
        .get_events(stream, filter)
        .map_ok(|chunk| {
            chunk
                .iter()
                .map(|event| event.downcast_ref::<AccountCredited>().unwrap().amount)
                .collect()
        })
        .try_collect()
        .await
        .unwrap()
}

async fn read_versions(
    store: &InMemoryEventStore,
    stream: &EventStream,
    filter: EventFilter,
) -> Vec<i64> {
    let chunks: Vec<Vec<i64>> = store
        .get_envelopes(stream, filter)
        .map_ok(|chunk| chunk.iter().map(|e| e.version()).collect())
        .try_collect()
        .await
        .unwrap();
    chunks.concat()
}

// --- append ---

#[tokio::test]
async fn test_append_assigns_versions_ending_at_expected_version() {
    let store = started_store().await;
    let stream = account_stream("a-1");

    let envelopes = store.append_events(&stream, 3, &credits(3), None).await.unwrap();

    let versions: Vec<i64> = envelopes.iter().map(|e| e.version()).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(envelopes.iter().all(|e| e.event() == "account-credited"));
    assert!(envelopes.iter().all(|e| e.metadata().aggregate_id == "a-1"));
}

#[tokio::test]
async fn test_envelope_metadata_comes_from_clock() {
    let store = started_store().await;
    let stream = account_stream("a-1");

    let envelopes = store.append_events(&stream, 1, &credits(1), None).await.unwrap();

    let metadata = envelopes[0].metadata();
    assert_eq!(
        metadata.occurred_on,
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(metadata.event_id.date(), metadata.occurred_on);
    assert!(metadata.correlation_id.is_none());
}

#[tokio::test]
async fn test_sequential_appends_with_correct_expected_version() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let envelopes = store.append_events(&stream, 6, &credits(3), None).await.unwrap();

    assert_eq!(envelopes[0].version(), 4);
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_append_empty_events_is_noop() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 2).await;

    let envelopes = store.append_events(&stream, 99, &[], None).await.unwrap();

    assert!(envelopes.is_empty());
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2]);
}

// --- concurrency ---

#[tokio::test]
async fn test_stale_expected_version_fails_without_partial_write() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let result = store.append_events(&stream, 3, &credits(3), None).await;

    let err = result.unwrap_err();
    assert!(err.is_concurrency_conflict());
    assert!(matches!(
        err,
        EventSourcingError::Persistence {
            ref collection,
            source: StoreFailure::VersionConflict {
                expected_head: 0,
                actual_head: 3,
                ..
            },
        } if collection == "events"
    ));
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_append_that_would_leave_a_gap_is_rejected() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let result = store.append_events(&stream, 7, &credits(2), None).await;

    assert!(result.unwrap_err().is_concurrency_conflict());
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_expected_version_below_batch_length_is_rejected() {
    let store = started_store().await;
    let stream = account_stream("a-1");

    let result = store.append_events(&stream, 1, &credits(3), None).await;

    assert!(result.unwrap_err().is_concurrency_conflict());
    assert!(read_versions(&store, &stream, EventFilter::new()).await.is_empty());
}

#[tokio::test]
async fn test_expected_version_at_upper_bound_is_rejected() {
    let store = started_store().await;
    let stream = account_stream("a-1");

    let result = store.append_events(&stream, i64::MAX, &credits(1), None).await;

    assert!(result.unwrap_err().is_concurrency_conflict());
    assert!(read_versions(&store, &stream, EventFilter::new()).await.is_empty());
}

#[tokio::test]
async fn test_event_ids_increase_with_version() {
    let store = InMemoryEventStore::new(Arc::new(account_event_map()));
    store.start().await.unwrap();
    let stream = account_stream("a-1");

    let mut envelopes = store.append_events(&stream, 200, &credits(200), None).await.unwrap();
    envelopes.extend(store.append_events(&stream, 250, &credits(50), None).await.unwrap());

    let out_of_order = envelopes
        .windows(2)
        .filter(|pair| pair[0].metadata().event_id >= pair[1].metadata().event_id)
        .count();
    assert_eq!(envelopes.len(), 250);
    assert_eq!(out_of_order, 0);
}

#[tokio::test]
async fn test_event_ids_from_fixed_clock_keep_its_instant() {
    let store = started_store().await;
    let stream = account_stream("a-1");
    let opened = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let envelopes = store.append_events(&stream, 50, &credits(50), None).await.unwrap();

    assert!(envelopes.windows(2).all(|pair| {
        pair[0].metadata().event_id < pair[1].metadata().event_id
    }));
    assert!(envelopes.iter().all(|e| e.metadata().event_id.date() == opened));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_concurrent_writer_wins() {
    let store = Arc::new(started_store().await);
    let stream = account_stream("a-1");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let stream = stream.clone();
        tasks.push(tokio::spawn(async move {
            store.append_events(&stream, 2, &credits(2), None).await
        }));
    }
    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) if err.is_concurrency_conflict() => conflicts += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2]);
}

// --- reads ---

#[tokio::test]
async fn test_forward_read_returns_append_order() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 5).await;

    let chunks = read_amounts(&store, &stream, EventFilter::new()).await;

    assert_eq!(chunks, vec![vec![1, 2, 3, 4, 5]]);
}

#[tokio::test]
async fn test_backward_read_returns_reverse_order() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 5).await;

    let filter = EventFilter::new().direction(StreamReadingDirection::Backward);
    let chunks = read_amounts(&store, &stream, filter).await;

    assert_eq!(chunks, vec![vec![5, 4, 3, 2, 1]]);
}

#[tokio::test]
async fn test_from_version_bounds_forward_read() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 6).await;

    let versions = read_versions(&store, &stream, EventFilter::new().from_version(3)).await;

    assert_eq!(versions, vec![3, 4, 5, 6]);
}

#[tokio::test]
async fn test_from_version_bounds_backward_read_from_below() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 6).await;

    let filter = EventFilter::new()
        .direction(StreamReadingDirection::Backward)
        .from_version(4);
    let versions = read_versions(&store, &stream, filter).await;

    assert_eq!(versions, vec![6, 5, 4]);
}

#[tokio::test]
async fn test_limit_caps_result_in_both_directions() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 6).await;

    let forward = read_versions(&store, &stream, EventFilter::new().limit(3)).await;
    let backward = read_versions(
        &store,
        &stream,
        EventFilter::new()
            .direction(StreamReadingDirection::Backward)
            .limit(3),
    )
    .await;

    assert_eq!(forward, vec![1, 2, 3]);
    assert_eq!(backward, vec![6, 5, 4]);
}

#[tokio::test]
async fn test_batch_sizes_chunks_except_last() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 5).await;

    let chunks = read_amounts(&store, &stream, EventFilter::new().batch(2)).await;

    assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn test_batch_and_limit_combine() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 10).await;

    let filter = EventFilter::new()
        .direction(StreamReadingDirection::Backward)
        .batch(3)
        .limit(4);
    let chunks = read_amounts(&store, &stream, filter).await;

    assert_eq!(chunks, vec![vec![10, 9, 8], vec![7]]);
}

#[tokio::test]
async fn test_reading_unknown_stream_yields_no_chunks() {
    let store = started_store().await;

    let chunks = read_amounts(&store, &account_stream("nobody"), EventFilter::new()).await;

    assert!(chunks.is_empty());
}

#[tokio::test]
async fn test_stopping_iteration_early_is_safe() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 6).await;

    let mut chunks = store.get_events(&stream, EventFilter::new().batch(2));
    let first = chunks.try_next().await.unwrap().unwrap();
    drop(chunks);

    assert_eq!(first.len(), 2);
    store.append_events(&stream, 7, &credits(1), None).await.unwrap();
}

// --- point lookups ---

#[tokio::test]
async fn test_get_event_returns_typed_event() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let event = store.get_event(&stream, 2, None).await.unwrap();

    assert_eq!(event.downcast_ref::<AccountCredited>(), Some(&AccountCredited { amount: 2 }));
}

#[tokio::test]
async fn test_get_envelope_keeps_metadata() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let envelope = store.get_envelope(&stream, 3, None).await.unwrap();

    assert_eq!(envelope.version(), 3);
    assert_eq!(envelope.event(), "account-credited");
    assert_eq!(envelope.payload(), &serde_json::json!({ "amount": 3 }));
}

#[tokio::test]
async fn test_missing_version_is_not_found() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let result = store.get_event(&stream, 99, None).await;

    assert!(matches!(
        result,
        Err(EventSourcingError::EventNotFound { ref stream_id, version: 99 })
            if stream_id == "account-a-1"
    ));
}

#[tokio::test]
async fn test_version_zero_is_not_found() {
    let stream = account_stream("a-1");
    let store = seeded_store(&stream, 3).await;

    let result = store.get_envelope(&stream, 0, None).await;

    assert!(matches!(
        result,
        Err(EventSourcingError::EventNotFound { version: 0, .. })
    ));
}

// --- registration ---

#[tokio::test]
async fn test_unregistered_event_fails_before_writing() {
    #[derive(Debug, Clone)]
    struct Unknown;

    impl eventide_core::event::Event for Unknown {
        const NAME: &'static str = "unknown";
    }

    let store = started_store().await;
    let stream = account_stream("a-1");
    let events: Vec<Box<dyn DomainEvent>> = vec![Box::new(AccountClosed), Box::new(Unknown)];

    let result = store.append_events(&stream, 2, &events, None).await;

    assert!(matches!(result, Err(EventSourcingError::UnregisteredEvent(_))));
    assert!(read_versions(&store, &stream, EventFilter::new()).await.is_empty());
}

// --- pools ---

#[tokio::test]
async fn test_append_to_unprovisioned_pool_fails() {
    let store = started_store().await;
    let stream = account_stream("a-1");

    let result = store
        .append_events(&stream, 3, &credits(3), Some("not-a-pool"))
        .await;

    assert!(matches!(
        result,
        Err(EventSourcingError::Persistence {
            ref collection,
            source: StoreFailure::MissingCollection,
        }) if collection == "not-a-pool-events"
    ));
}

#[tokio::test]
async fn test_invalid_pool_name_is_rejected() {
    let store = started_store().await;

    let result = store.ensure_collection(Some("no spaces")).await;

    assert!(matches!(
        result,
        Err(EventSourcingError::Persistence {
            source: StoreFailure::InvalidPool(_),
            ..
        })
    ));
}

#[tokio::test]
async fn test_pools_are_isolated() {
    let store = started_store().await;
    store.ensure_collection(Some("tenant")).await.unwrap();
    let stream = account_stream("a-1");
    store.append_events(&stream, 2, &credits(2), Some("tenant")).await.unwrap();

    let default_pool = read_versions(&store, &stream, EventFilter::new()).await;
    let tenant_pool = read_versions(&store, &stream, EventFilter::new().pool("tenant")).await;

    assert!(default_pool.is_empty());
    assert_eq!(tenant_pool, vec![1, 2]);
}

#[tokio::test]
async fn test_streams_are_isolated() {
    let store = started_store().await;
    let first = account_stream("a-1");
    let second = account_stream("a-2");
    store.append_events(&first, 3, &credits(3), None).await.unwrap();

    let envelopes = store.append_events(&second, 1, &credits(1), None).await.unwrap();

    assert_eq!(envelopes[0].version(), 1);
    assert_eq!(read_versions(&store, &first, EventFilter::new()).await, vec![1, 2, 3]);
}

// --- end to end ---

#[tokio::test]
async fn test_append_read_and_reject_stale_writer() {
    let store = started_store().await;
    let stream = account_stream("e2e");
    store.append_events(&stream, 3, &credits(3), None).await.unwrap();

    let tail = read_amounts(&store, &stream, EventFilter::new().from_version(2)).await;
    let stale = store.append_events(&stream, 3, &credits(3), None).await;
    let missing = store.get_event(&stream, 99, None).await;

    assert_eq!(tail, vec![vec![2, 3]]);
    assert!(stale.unwrap_err().is_concurrency_conflict());
    assert_eq!(read_versions(&store, &stream, EventFilter::new()).await, vec![1, 2, 3]);
    assert!(matches!(
        missing,
        Err(EventSourcingError::EventNotFound { version: 99, .. })
    ));
}
