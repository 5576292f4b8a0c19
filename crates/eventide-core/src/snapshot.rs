//! Snapshots: periodic captures of aggregate state used to shorten replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::Aggregate;
use crate::error::EventSourcingError;
use crate::stream::EventStream;

/// Events per snapshot when an aggregate does not override its policy.
pub const DEFAULT_SNAPSHOT_INTERVAL: i64 = 10;

/// Captured state of one aggregate at a fully replayed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    stream_id: String,
    aggregate_name: String,
    version: i64,
    payload: Value,
    occurred_on: DateTime<Utc>,
}

impl SnapshotEnvelope {
    /// Creates a snapshot envelope.
    #[must_use]
    pub fn new(
        stream: &EventStream,
        aggregate_name: impl Into<String>,
        version: i64,
        payload: Value,
        occurred_on: DateTime<Utc>,
    ) -> Self {
        Self {
            stream_id: stream.stream_id().to_owned(),
            aggregate_name: aggregate_name.into(),
            version,
            payload,
            occurred_on,
        }
    }

    /// Rebuilds an envelope from stored parts.
    #[must_use]
    pub fn from_parts(
        stream_id: String,
        aggregate_name: String,
        version: i64,
        payload: Value,
        occurred_on: DateTime<Utc>,
    ) -> Self {
        Self {
            stream_id,
            aggregate_name,
            version,
            payload,
            occurred_on,
        }
    }

    /// Stream the snapshot belongs to.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Aggregate type name.
    #[must_use]
    pub fn aggregate_name(&self) -> &str {
        &self.aggregate_name
    }

    /// Aggregate version at capture time.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Serialized aggregate state.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Capture instant.
    #[must_use]
    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }
}

/// How often an aggregate type is snapshotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    interval: i64,
}

impl SnapshotPolicy {
    /// Snapshot every `interval` events. Non-positive intervals disable
    /// snapshotting.
    #[must_use]
    pub fn every(interval: i64) -> Self {
        Self { interval }
    }

    /// Events per snapshot.
    #[must_use]
    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Returns `true` unless the interval disables snapshotting.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.interval > 0
    }

    /// Returns `true` if moving from `previous_version` to `current_version`
    /// crosses a multiple of the interval.
    #[must_use]
    pub fn is_due(&self, previous_version: i64, current_version: i64) -> bool {
        self.is_enabled()
            && current_version > previous_version
            && current_version / self.interval > previous_version / self.interval
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

/// Aggregates whose state can be captured in and restored from a snapshot.
pub trait SnapshotAggregate: Aggregate {
    /// Serializable state representation.
    type Snapshot: Serialize + DeserializeOwned + Send + Sync;

    /// Returns the policy for this aggregate type.
    fn snapshot_policy() -> SnapshotPolicy {
        SnapshotPolicy::default()
    }

    /// Captures current state.
    fn create_snapshot(&self) -> Self::Snapshot;

    /// Restores state from a snapshot. The version is set by the caller.
    fn load_snapshot(&mut self, snapshot: Self::Snapshot);

    /// Wraps current state into an envelope at the current version.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the snapshot cannot be encoded.
    fn to_snapshot_envelope(
        &self,
        occurred_on: DateTime<Utc>,
    ) -> Result<SnapshotEnvelope, EventSourcingError> {
        let payload = serde_json::to_value(self.create_snapshot()).map_err(|e| {
            EventSourcingError::Serialization {
                event: Self::STREAM_NAME.to_owned(),
                source: Box::new(e),
            }
        })?;
        Ok(SnapshotEnvelope::new(
            &EventStream::for_aggregate::<Self>(self.id()),
            Self::STREAM_NAME,
            self.version(),
            payload,
            occurred_on,
        ))
    }

    /// Seeds state from `snapshot` (if any), then replays `events`.
    ///
    /// With a snapshot the resulting version is `snapshot.version()` plus the
    /// number of events; without one it is the number of events.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the snapshot payload cannot be decoded.
    fn load_from_history_with_snapshot<I>(
        &mut self,
        snapshot: Option<&SnapshotEnvelope>,
        events: I,
    ) -> Result<(), EventSourcingError>
    where
        I: IntoIterator<Item = Self::Event>,
    {
        if let Some(envelope) = snapshot {
            let state: Self::Snapshot = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| EventSourcingError::Serialization {
                    event: envelope.aggregate_name().to_owned(),
                    source: Box::new(e),
                })?;
            self.load_snapshot(state);
            self.state_mut().set_version(envelope.version());
        }
        self.load_from_history(events);
        Ok(())
    }
}

/// Storage contract for snapshots, keyed like event streams.
///
/// Snapshots are monotonic per stream: saving one older than the stored
/// snapshot fails with `StaleSnapshot`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Provisions the default snapshot collection and returns its name.
    async fn start(&self) -> Result<String, EventSourcingError>;

    /// Provisions the snapshot collection backing `pool`.
    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError>;

    /// Releases connections held by the store.
    async fn stop(&self) -> Result<(), EventSourcingError>;

    /// Stores `snapshot` as the latest snapshot of `stream`.
    ///
    /// # Errors
    ///
    /// Returns `StaleSnapshot` if a newer snapshot is stored, or
    /// `Persistence` on backend failure.
    async fn save(
        &self,
        stream: &EventStream,
        snapshot: SnapshotEnvelope,
        pool: Option<&str>,
    ) -> Result<(), EventSourcingError>;

    /// Returns the latest snapshot of `stream`, if any.
    async fn load(
        &self,
        stream: &EventStream,
        pool: Option<&str>,
    ) -> Result<Option<SnapshotEnvelope>, EventSourcingError>;
}
