//! `PostgreSQL` implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use eventide_core::clock::{Clock, SystemClock};
use eventide_core::collection::EventCollection;
use eventide_core::envelope::{EnvelopeMetadata, EventEnvelope};
use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::event::DomainEvent;
use eventide_core::event_id::{EventId, EventIdGenerator};
use eventide_core::event_map::EventMap;
use eventide_core::filter::{EventFilter, Page, StreamReadingDirection, paginate};
use eventide_core::store::{EnvelopeChunks, EventStore, first_version};
use eventide_core::stream::EventStream;

use crate::append::seal_envelopes;
use crate::schema::create_events_table;

/// SQLSTATE raised when a query names a table that does not exist.
const UNDEFINED_TABLE: &str = "42P01";

const SELECT_COLUMNS: &str =
    "event, payload, event_id, aggregate_id, version, occurred_on, correlation_id, causation_id";

/// PostgreSQL-backed event store.
///
/// Each pool maps to its own table. Appends run in a transaction that checks
/// the stream head before inserting; the `(stream_id, version)` primary key
/// rejects whichever of two racing writers commits second.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    event_map: Arc<EventMap>,
    clock: Arc<dyn Clock>,
    ids: Arc<EventIdGenerator>,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool, event_map: Arc<EventMap>) -> Self {
        Self {
            pool,
            event_map,
            clock: Arc::new(SystemClock),
            ids: Arc::new(EventIdGenerator::new()),
        }
    }

    /// Stamps new event IDs with `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.ids = Arc::new(EventIdGenerator::new());
        self
    }

    async fn head_version<'e, E>(
        executor: E,
        collection: &str,
        stream_id: &str,
    ) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let sql = format!(r#"SELECT MAX(version) FROM "{collection}" WHERE stream_id = $1"#);
        let head: Option<i64> = sqlx::query_scalar(&sql)
            .bind(stream_id)
            .fetch_one(executor)
            .await?;
        Ok(head.unwrap_or(0))
    }

    async fn fetch_page(
        &self,
        collection: &str,
        stream_id: &str,
        page: Page,
    ) -> Result<Vec<EventEnvelope>, EventSourcingError> {
        let order = match page.direction {
            StreamReadingDirection::Forward => "ASC",
            StreamReadingDirection::Backward => "DESC",
        };
        let sql = format!(
            r#"SELECT {SELECT_COLUMNS} FROM "{collection}"
               WHERE stream_id = $1 AND version BETWEEN $2 AND $3
               ORDER BY version {order}
               LIMIT $4"#
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(stream_id)
            .bind(page.lower)
            .bind(page.upper)
            .bind(i64::try_from(page.size).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error(collection, e))?;

        rows.into_iter()
            .map(|row| row.into_envelope(collection))
            .collect()
    }

    async fn insert(
        &self,
        collection: &str,
        stream: &EventStream,
        expected_head: i64,
        envelopes: &[EventEnvelope],
    ) -> Result<(), EventSourcingError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error(collection, e))?;

        let actual_head = Self::head_version(&mut *tx, collection, stream.stream_id())
            .await
            .map_err(|e| store_error(collection, e))?;
        if actual_head != expected_head {
            return Err(version_conflict(collection, stream, expected_head, actual_head));
        }

        let mut insert = QueryBuilder::<Postgres>::new(format!(
            r#"INSERT INTO "{collection}" (stream_id, version, event, payload, event_id, aggregate_id, occurred_on, correlation_id, causation_id) "#
        ));
        insert.push_values(envelopes, |mut row, envelope| {
            let metadata = envelope.metadata();
            row.push_bind(stream.stream_id())
                .push_bind(metadata.version)
                .push_bind(envelope.event())
                .push_bind(envelope.payload())
                .push_bind(metadata.event_id.as_uuid())
                .push_bind(metadata.aggregate_id.as_str())
                .push_bind(metadata.occurred_on)
                .push_bind(metadata.correlation_id.as_deref())
                .push_bind(metadata.causation_id.as_deref());
        });

        if let Err(err) = insert.build().execute(&mut *tx).await {
            let unique_violation = matches!(
                &err,
                sqlx::Error::Database(db) if db.is_unique_violation()
            );
            if !unique_violation {
                return Err(store_error(collection, err));
            }
            // A concurrent writer committed between our head check and insert.
            drop(tx);
            let actual_head = Self::head_version(&self.pool, collection, stream.stream_id())
                .await
                .map_err(|e| store_error(collection, e))?;
            return Err(version_conflict(collection, stream, expected_head, actual_head));
        }

        tx.commit().await.map_err(|e| store_error(collection, e))
    }
}

impl std::fmt::Debug for PgEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventStore")
            .field("pool", &self.pool)
            .field("event_map", &self.event_map)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn start(&self) -> Result<String, EventSourcingError> {
        self.ensure_collection(None).await
    }

    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = EventCollection::get(pool)?;
        sqlx::query(&create_events_table(&collection))
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&collection, e))?;
        info!(%collection, "provisioned event table");
        Ok(collection)
    }

    async fn stop(&self) -> Result<(), EventSourcingError> {
        self.pool.close().await;
        debug!("postgres event store stopped");
        Ok(())
    }

    fn event_map(&self) -> &EventMap {
        &self.event_map
    }

    #[instrument(skip(self, events), fields(stream_id = %stream, count = events.len()))]
    async fn append_events(
        &self,
        stream: &EventStream,
        expected_aggregate_version: i64,
        events: &[Box<dyn DomainEvent>],
        pool: Option<&str>,
    ) -> Result<Vec<EventEnvelope>, EventSourcingError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let collection = EventCollection::get(pool)?;
        let envelopes = seal_envelopes(
            &self.event_map,
            self.clock.as_ref(),
            &self.ids,
            stream,
            expected_aggregate_version,
            events,
        )?;
        let expected_head = first_version(expected_aggregate_version, events.len()) - 1;

        if let Err(err) = self
            .insert(&collection, stream, expected_head, &envelopes)
            .await
        {
            if err.is_concurrency_conflict() {
                warn!(expected_head, "rejected append on version conflict");
            }
            return Err(err);
        }

        debug!(%collection, version = expected_aggregate_version, "appended events");
        Ok(envelopes)
    }

    async fn get_envelope(
        &self,
        stream: &EventStream,
        version: i64,
        pool: Option<&str>,
    ) -> Result<EventEnvelope, EventSourcingError> {
        let collection = EventCollection::get(pool)?;
        let sql = format!(
            r#"SELECT {SELECT_COLUMNS} FROM "{collection}" WHERE stream_id = $1 AND version = $2"#
        );
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(stream.stream_id())
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&collection, e))?;

        match row {
            Some(row) => row.into_envelope(&collection),
            None => Err(EventSourcingError::EventNotFound {
                stream_id: stream.stream_id().to_owned(),
                version,
            }),
        }
    }

    fn get_envelopes<'a>(&'a self, stream: &EventStream, filter: EventFilter) -> EnvelopeChunks<'a> {
        let collection = match EventCollection::get(filter.pool.as_deref()) {
            Ok(collection) => collection,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let stream_id = stream.stream_id().to_owned();
        paginate(
            &filter,
            move |page| {
                let collection = collection.clone();
                let stream_id = stream_id.clone();
                async move { self.fetch_page(&collection, &stream_id, page).await }
            },
            EventEnvelope::version,
        )
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event: String,
    payload: Value,
    event_id: Uuid,
    aggregate_id: String,
    version: i64,
    occurred_on: DateTime<Utc>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
}

impl EventRow {
    fn into_envelope(self, collection: &str) -> Result<EventEnvelope, EventSourcingError> {
        let event_id = EventId::from_uuid(self.event_id).ok_or_else(|| {
            let message = format!("stored event id {} is not a v7 UUID", self.event_id);
            EventSourcingError::persistence(collection, StoreFailure::Backend(message.into()))
        })?;
        Ok(EventEnvelope::from_parts(
            self.event,
            self.payload,
            EnvelopeMetadata {
                event_id,
                aggregate_id: self.aggregate_id,
                version: self.version,
                occurred_on: self.occurred_on,
                correlation_id: self.correlation_id,
                causation_id: self.causation_id,
            },
        ))
    }
}

fn version_conflict(
    collection: &str,
    stream: &EventStream,
    expected_head: i64,
    actual_head: i64,
) -> EventSourcingError {
    EventSourcingError::persistence(
        collection,
        StoreFailure::VersionConflict {
            stream_id: stream.stream_id().to_owned(),
            expected_head,
            actual_head,
        },
    )
}

/// Maps a driver error to a persistence failure on `collection`.
pub(crate) fn store_error(collection: &str, err: sqlx::Error) -> EventSourcingError {
    let missing = matches!(
        &err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE)
    );
    let failure = if missing {
        StoreFailure::MissingCollection
    } else {
        StoreFailure::Backend(Box::new(err))
    };
    EventSourcingError::persistence(collection, failure)
}
