//! Envelope construction shared by every backend's append path.

use eventide_core::clock::Clock;
use eventide_core::envelope::{EventEnvelope, NewEnvelope};
use eventide_core::error::EventSourcingError;
use eventide_core::event::DomainEvent;
use eventide_core::event_id::EventIdGenerator;
use eventide_core::event_map::EventMap;
use eventide_core::store::first_version;
use eventide_core::stream::EventStream;

/// Serializes `events` and assigns their stream versions and event IDs.
///
/// Nothing is written here, so a serializer failure leaves the stream
/// untouched. Versions end at `expected_aggregate_version`; a batch that
/// cannot start at version 1 or later is left for the head check to reject.
pub(crate) fn seal_envelopes(
    event_map: &EventMap,
    clock: &dyn Clock,
    ids: &EventIdGenerator,
    stream: &EventStream,
    expected_aggregate_version: i64,
    events: &[Box<dyn DomainEvent>],
) -> Result<Vec<EventEnvelope>, EventSourcingError> {
    let first = first_version(expected_aggregate_version, events.len());
    events
        .iter()
        .zip(first..=expected_aggregate_version)
        .map(|(event, version)| {
            let event = event.as_ref();
            let name = event_map.get_name(event)?;
            let payload = event_map.serialize_event(event)?;
            Ok(EventEnvelope::create(
                name,
                payload,
                NewEnvelope {
                    aggregate_id: stream.aggregate_id().to_owned(),
                    version,
                    event_id: Some(ids.generate_at(clock.now())),
                    ..NewEnvelope::default()
                },
            ))
        })
        .collect()
}
