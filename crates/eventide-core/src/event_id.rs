//! Time-ordered event identifiers.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{ContextV7, NoContext, Timestamp, Uuid, Version};

/// Globally unique, time-ordered identifier of one event occurrence.
///
/// Backed by a UUIDv7, so identifiers sort by creation instant and the
/// instant itself (millisecond precision) can be read back with
/// [`EventId::date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a new identifier stamped with the current system time.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Generates a new identifier stamped with `instant`.
    ///
    /// Two identifiers generated for the same millisecond are not ordered
    /// relative to each other; use an [`EventIdGenerator`] for that.
    #[must_use]
    pub fn generate_at(instant: DateTime<Utc>) -> Self {
        let (seconds, nanos) = unix_parts(instant);
        Self(Uuid::new_v7(Timestamp::from_unix(NoContext, seconds, nanos)))
    }

    /// Wraps an existing UUID. Returns `None` unless it is a UUIDv7.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        (uuid.get_version() == Some(Version::SortRand)).then_some(Self(uuid))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns the creation instant embedded in the identifier.
    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.0
            .get_timestamp()
            .and_then(|ts| {
                let (seconds, nanos) = ts.to_unix();
                DateTime::from_timestamp(i64::try_from(seconds).ok()?, nanos)
            })
            .unwrap_or_default()
    }
}

fn unix_parts(instant: DateTime<Utc>) -> (u64, u32) {
    let seconds = u64::try_from(instant.timestamp()).unwrap_or(0);
    (seconds, instant.timestamp_subsec_nanos())
}

/// Issues strictly increasing identifiers.
///
/// Identifiers stamped with the same millisecond are ordered by a counter.
/// An instant earlier than the last one issued keeps the last timestamp.
#[derive(Debug)]
pub struct EventIdGenerator {
    context: Mutex<ContextV7>,
}

impl EventIdGenerator {
    /// Creates a generator that has issued nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            context: Mutex::new(ContextV7::new()),
        }
    }

    /// Generates the next identifier, stamped with `instant`.
    #[must_use]
    pub fn generate_at(&self, instant: DateTime<Utc>) -> EventId {
        let (seconds, nanos) = unix_parts(instant);
        EventId(Uuid::new_v7(Timestamp::from_unix(&self.context, seconds, nanos)))
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
