//! Persisted representation of one event occurrence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event_id::EventId;

/// Positional and identity metadata carried by every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Unique, time-ordered event identifier.
    pub event_id: EventId,
    /// Aggregate instance the event belongs to.
    pub aggregate_id: String,
    /// 1-based position of the event within its stream.
    pub version: i64,
    /// Creation instant of the event.
    pub occurred_on: DateTime<Utc>,
    /// Correlation ID for tracing a request through its effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// ID of the message that caused this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

/// Metadata supplied when a store creates a fresh envelope.
#[derive(Debug, Clone, Default)]
pub struct NewEnvelope {
    /// Aggregate instance the event belongs to.
    pub aggregate_id: String,
    /// Stream version assigned to the event.
    pub version: i64,
    /// Pre-generated identifier; a new one is generated when absent.
    pub event_id: Option<EventId>,
    /// Correlation ID for tracing.
    pub correlation_id: Option<String>,
    /// Causation ID.
    pub causation_id: Option<String>,
}

/// Immutable envelope wrapping one serialized event.
///
/// Envelopes are created by a store on append ([`EventEnvelope::create`]) or
/// rebuilt from storage on read ([`EventEnvelope::from_parts`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event: String,
    payload: Value,
    metadata: EnvelopeMetadata,
}

impl EventEnvelope {
    /// Creates a new envelope. `occurred_on` is taken from the event ID.
    #[must_use]
    pub fn create(event: impl Into<String>, payload: Value, metadata: NewEnvelope) -> Self {
        let event_id = metadata.event_id.unwrap_or_else(EventId::generate);
        Self {
            event: event.into(),
            payload,
            metadata: EnvelopeMetadata {
                event_id,
                aggregate_id: metadata.aggregate_id,
                version: metadata.version,
                occurred_on: event_id.date(),
                correlation_id: metadata.correlation_id,
                causation_id: metadata.causation_id,
            },
        }
    }

    /// Rebuilds an envelope from stored parts.
    #[must_use]
    pub fn from_parts(event: impl Into<String>, payload: Value, metadata: EnvelopeMetadata) -> Self {
        Self {
            event: event.into(),
            payload,
            metadata,
        }
    }

    /// Registered name of the wrapped event.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Serialized payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Envelope metadata.
    #[must_use]
    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    /// Shortcut for `metadata().version`.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.metadata.version
    }

    /// Consumes the envelope, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (String, Value, EnvelopeMetadata) {
        (self.event, self.payload, self.metadata)
    }
}
