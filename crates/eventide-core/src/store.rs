//! Event store abstraction.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::envelope::EventEnvelope;
use crate::error::EventSourcingError;
use crate::event::DomainEvent;
use crate::event_map::EventMap;
use crate::filter::EventFilter;
use crate::stream::EventStream;

/// Lazy sequence of event chunks produced by [`EventStore::get_events`].
pub type EventChunks<'a> = BoxStream<'a, Result<Vec<Box<dyn DomainEvent>>, EventSourcingError>>;

/// Lazy sequence of envelope chunks produced by [`EventStore::get_envelopes`].
pub type EnvelopeChunks<'a> = BoxStream<'a, Result<Vec<EventEnvelope>, EventSourcingError>>;

/// Storage contract implemented by every event store backend.
///
/// Within one stream versions are 1-based, gap-free and unique. Appends are
/// all-or-nothing: a batch either lands completely or not at all.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Provisions the default collection and returns its name. Idempotent.
    async fn start(&self) -> Result<String, EventSourcingError>;

    /// Provisions the collection backing `pool` and returns its name.
    /// Idempotent.
    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError>;

    /// Releases connections held by the store.
    async fn stop(&self) -> Result<(), EventSourcingError>;

    /// The registry used to (de)serialize payloads.
    fn event_map(&self) -> &EventMap;

    /// Appends `events` so that the last one lands at
    /// `expected_aggregate_version`.
    ///
    /// Event `i` (0-based) receives version
    /// `expected_aggregate_version - events.len() + 1 + i`. The write is
    /// rejected as a whole if the stream head is not exactly the version
    /// before the first proposed one, or if any proposed version exists.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` (with `VersionConflict` for optimistic
    /// concurrency rejections), `UnregisteredEvent` or `Serialization`.
    async fn append_events(
        &self,
        stream: &EventStream,
        expected_aggregate_version: i64,
        events: &[Box<dyn DomainEvent>],
        pool: Option<&str>,
    ) -> Result<Vec<EventEnvelope>, EventSourcingError>;

    /// Returns the envelope stored at `version`.
    ///
    /// # Errors
    ///
    /// Returns `EventNotFound` if the stream has no such version.
    async fn get_envelope(
        &self,
        stream: &EventStream,
        version: i64,
        pool: Option<&str>,
    ) -> Result<EventEnvelope, EventSourcingError>;

    /// Reads envelopes in chunks according to `filter`.
    fn get_envelopes<'a>(&'a self, stream: &EventStream, filter: EventFilter) -> EnvelopeChunks<'a>;

    /// Returns the event stored at `version`.
    ///
    /// # Errors
    ///
    /// Returns `EventNotFound` if the stream has no such version, or the
    /// event map's error if the payload cannot be decoded.
    async fn get_event(
        &self,
        stream: &EventStream,
        version: i64,
        pool: Option<&str>,
    ) -> Result<Box<dyn DomainEvent>, EventSourcingError> {
        let envelope = self.get_envelope(stream, version, pool).await?;
        self.event_map().deserialize_envelope(&envelope)
    }

    /// Reads deserialized events in chunks according to `filter`.
    fn get_events<'a>(&'a self, stream: &EventStream, filter: EventFilter) -> EventChunks<'a> {
        let event_map = self.event_map();
        self.get_envelopes(stream, filter)
            .map(move |chunk| {
                chunk?
                    .iter()
                    .map(|envelope| event_map.deserialize_envelope(envelope))
                    .collect()
            })
            .boxed()
    }
}

/// Computes the version assigned to the first event of an append batch.
#[must_use]
pub fn first_version(expected_aggregate_version: i64, batch_len: usize) -> i64 {
    let len = i64::try_from(batch_len).unwrap_or(i64::MAX);
    expected_aggregate_version.saturating_sub(len).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_version_of_fresh_stream() {
        assert_eq!(first_version(3, 3), 1);
    }

    #[test]
    fn test_first_version_after_existing_events() {
        assert_eq!(first_version(6, 3), 4);
    }

    #[test]
    fn test_first_version_underflow_is_not_positive() {
        assert!(first_version(1, 3) < 1);
    }
}
