//! Event store doubles for error-path tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use eventide_core::envelope::EventEnvelope;
use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::event::DomainEvent;
use eventide_core::event_map::EventMap;
use eventide_core::filter::EventFilter;
use eventide_core::store::{EnvelopeChunks, EventStore};
use eventide_core::stream::EventStream;

const COLLECTION: &str = "events";

fn connection_refused() -> EventSourcingError {
    EventSourcingError::persistence(COLLECTION, StoreFailure::Backend("connection refused".into()))
}

/// An event store whose every operation fails with a backend persistence
/// error. Useful for testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingEventStore {
    event_map: EventMap,
}

impl FailingEventStore {
    /// Creates a failing store with an empty event map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn start(&self) -> Result<String, EventSourcingError> {
        Err(connection_refused())
    }

    async fn ensure_collection(&self, _pool: Option<&str>) -> Result<String, EventSourcingError> {
        Err(connection_refused())
    }

    async fn stop(&self) -> Result<(), EventSourcingError> {
        Ok(())
    }

    fn event_map(&self) -> &EventMap {
        &self.event_map
    }

    async fn append_events(
        &self,
        _stream: &EventStream,
        _expected_aggregate_version: i64,
        _events: &[Box<dyn DomainEvent>],
        _pool: Option<&str>,
    ) -> Result<Vec<EventEnvelope>, EventSourcingError> {
        Err(connection_refused())
    }

    async fn get_envelope(
        &self,
        _stream: &EventStream,
        _version: i64,
        _pool: Option<&str>,
    ) -> Result<EventEnvelope, EventSourcingError> {
        Err(connection_refused())
    }

    fn get_envelopes<'a>(&'a self, _stream: &EventStream, _filter: EventFilter) -> EnvelopeChunks<'a> {
        stream::once(async { Err(connection_refused()) }).boxed()
    }
}
