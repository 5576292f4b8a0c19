//! In-memory reference implementation of the `EventStore` contract.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use eventide_core::clock::{Clock, SystemClock};
use eventide_core::collection::EventCollection;
use eventide_core::envelope::EventEnvelope;
use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::event::DomainEvent;
use eventide_core::event_id::EventIdGenerator;
use eventide_core::event_map::EventMap;
use eventide_core::filter::{EventFilter, Page, StreamReadingDirection, paginate};
use eventide_core::store::{EnvelopeChunks, EventStore, first_version};
use eventide_core::stream::EventStream;

use crate::append::seal_envelopes;

/// (collection, stream ID)
type StreamKey = (String, String);

/// Event store keeping every stream in process memory.
///
/// Streams live in a concurrent map keyed by collection and stream ID. The
/// head check and the append happen under the stream's entry lock, so two
/// writers racing on one stream are serialized while writers on different
/// streams proceed independently.
pub struct InMemoryEventStore {
    event_map: Arc<EventMap>,
    clock: Arc<dyn Clock>,
    ids: Arc<EventIdGenerator>,
    collections: DashSet<String>,
    streams: DashMap<StreamKey, Vec<EventEnvelope>>,
}

impl InMemoryEventStore {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new(event_map: Arc<EventMap>) -> Self {
        Self {
            event_map,
            clock: Arc::new(SystemClock),
            ids: Arc::new(EventIdGenerator::new()),
            collections: DashSet::new(),
            streams: DashMap::new(),
        }
    }

    /// Stamps new event IDs with `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.ids = Arc::new(EventIdGenerator::new());
        self
    }

    fn provisioned(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = EventCollection::get(pool)?;
        if !self.collections.contains(&collection) {
            return Err(EventSourcingError::persistence(
                collection,
                StoreFailure::MissingCollection,
            ));
        }
        Ok(collection)
    }

    fn page(&self, key: &StreamKey, page: Page) -> Vec<EventEnvelope> {
        let Some(envelopes) = self.streams.get(key) else {
            return Vec::new();
        };
        // Versions are gap-free from 1, so version v sits at index v - 1.
        let len = envelopes.len();
        let start = usize::try_from(page.lower.saturating_sub(1))
            .unwrap_or(0)
            .min(len);
        let end = usize::try_from(page.upper).unwrap_or(usize::MAX).min(len);
        let Some(window) = envelopes.get(start..end) else {
            return Vec::new();
        };
        match page.direction {
            StreamReadingDirection::Forward => window.iter().take(page.size).cloned().collect(),
            StreamReadingDirection::Backward => {
                window.iter().rev().take(page.size).cloned().collect()
            }
        }
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("collections", &self.collections.len())
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn start(&self) -> Result<String, EventSourcingError> {
        self.ensure_collection(None).await
    }

    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = EventCollection::get(pool)?;
        if self.collections.insert(collection.clone()) {
            info!(%collection, "provisioned in-memory event collection");
        }
        Ok(collection)
    }

    async fn stop(&self) -> Result<(), EventSourcingError> {
        debug!("in-memory event store stopped");
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
        let collection = self.provisioned(pool)?;
        let envelopes = seal_envelopes(
            &self.event_map,
            self.clock.as_ref(),
            &self.ids,
            stream,
            expected_aggregate_version,
            events,
        )?;
        let expected_head = first_version(expected_aggregate_version, events.len()) - 1;

        let entry = self
            .streams
            .entry((collection.clone(), stream.stream_id().to_owned()));
        let actual_head = match &entry {
            Entry::Occupied(written) => i64::try_from(written.get().len()).unwrap_or(i64::MAX),
            Entry::Vacant(_) => 0,
        };
        if actual_head != expected_head {
            drop(entry);
            warn!(expected_head, actual_head, "rejected append on version conflict");
            return Err(EventSourcingError::persistence(
                collection,
                StoreFailure::VersionConflict {
                    stream_id: stream.stream_id().to_owned(),
                    expected_head,
                    actual_head,
                },
            ));
        }
        match entry {
            Entry::Occupied(mut written) => written.get_mut().extend(envelopes.iter().cloned()),
            Entry::Vacant(empty) => {
                empty.insert(envelopes.clone());
            }
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
        let collection = self.provisioned(pool)?;
        let key = (collection, stream.stream_id().to_owned());
        let not_found = || EventSourcingError::EventNotFound {
            stream_id: stream.stream_id().to_owned(),
            version,
        };
        let index = usize::try_from(version.saturating_sub(1)).map_err(|_| not_found())?;
        self.streams
            .get(&key)
            .and_then(|envelopes| envelopes.get(index).cloned())
            .ok_or_else(not_found)
    }

    fn get_envelopes<'a>(&'a self, stream: &EventStream, filter: EventFilter) -> EnvelopeChunks<'a> {
        let collection = match self.provisioned(filter.pool.as_deref()) {
            Ok(collection) => collection,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let key = (collection, stream.stream_id().to_owned());
        paginate(
            &filter,
            move |page| {
                let rows = self.page(&key, page);
                async move { Ok(rows) }
            },
            EventEnvelope::version,
        )
    }
}
