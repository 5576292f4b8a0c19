//! Error types for event registration, storage and replay.

use thiserror::Error;

/// Boxed error used to carry backend and serializer causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the event sourcing core.
#[derive(Debug, Error)]
pub enum EventSourcingError {
    /// An event type was registered without a declared name.
    #[error("event type {type_name} has no declared event name")]
    MissingEventMetadata {
        /// Rust type name of the offending event.
        type_name: &'static str,
    },

    /// Two registrations claimed the same event name.
    #[error("event name {name:?} is already registered")]
    DuplicateEventName {
        /// The contested name.
        name: String,
    },

    /// Lookup by an unknown event name, type or instance.
    #[error("event {0} is not registered")]
    UnregisteredEvent(String),

    /// Point lookup for a version that does not exist in the stream.
    #[error("event with version {version} not found in stream {stream_id}")]
    EventNotFound {
        /// Stream that was searched.
        stream_id: String,
        /// Requested version.
        version: i64,
    },

    /// Append, read or provisioning failure at the storage backend.
    #[error("persistence failure on collection {collection}: {source}")]
    Persistence {
        /// Physical collection the operation targeted.
        collection: String,
        /// Underlying cause.
        #[source]
        source: StoreFailure,
    },

    /// A serializer failed to encode or decode an event payload.
    #[error("failed to (de)serialize event {event}: {source}")]
    Serialization {
        /// Event name or snapshot aggregate name.
        event: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A replayed event is not part of the aggregate's event set.
    #[error("event {event} in stream {stream_id} is not handled by the aggregate")]
    UnexpectedEvent {
        /// Stream being replayed.
        stream_id: String,
        /// Name of the foreign event.
        event: String,
    },

    /// A snapshot older than the stored one was offered.
    #[error(
        "snapshot for stream {stream_id} at version {version} is older than stored version {latest}"
    )]
    StaleSnapshot {
        /// Stream the snapshot belongs to.
        stream_id: String,
        /// Version of the rejected snapshot.
        version: i64,
        /// Version already stored.
        latest: i64,
    },
}

impl EventSourcingError {
    /// Wraps a backend failure together with the collection it targeted.
    pub fn persistence(collection: impl Into<String>, source: StoreFailure) -> Self {
        Self::Persistence {
            collection: collection.into(),
            source,
        }
    }

    /// Returns `true` if this error rejected an append because another writer
    /// already claimed the proposed versions.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            Self::Persistence {
                source: StoreFailure::VersionConflict { .. },
                ..
            }
        )
    }
}

/// Cause of an [`EventSourcingError::Persistence`] failure.
#[derive(Debug, Error)]
pub enum StoreFailure {
    /// Optimistic concurrency rejection.
    #[error(
        "version conflict on stream {stream_id}: expected head version {expected_head}, found {actual_head}"
    )]
    VersionConflict {
        /// Stream that was written to.
        stream_id: String,
        /// Head version the writer assumed.
        expected_head: i64,
        /// Head version actually stored.
        actual_head: i64,
    },

    /// The target collection was never provisioned.
    #[error("collection does not exist")]
    MissingCollection,

    /// The pool name cannot be mapped to a collection.
    #[error("invalid pool name {0:?}")]
    InvalidPool(String),

    /// Any other backend error.
    #[error(transparent)]
    Backend(BoxError),
}
