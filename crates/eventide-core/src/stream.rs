//! Stream identity of an aggregate instance.

use std::fmt;

use crate::aggregate::Aggregate;

/// Partition key of one aggregate instance's history.
///
/// `stream_id` is always `"{stream_name}-{aggregate_id}"`; the value is
/// derived, never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventStream {
    stream_id: String,
    aggregate_id: String,
}

impl EventStream {
    /// Builds the stream of aggregate `aggregate_id` of type `stream_name`.
    #[must_use]
    pub fn new(stream_name: &str, aggregate_id: impl fmt::Display) -> Self {
        let aggregate_id = aggregate_id.to_string();
        Self {
            stream_id: format!("{stream_name}-{aggregate_id}"),
            aggregate_id,
        }
    }

    /// Builds the stream of aggregate type `A` with the given ID.
    #[must_use]
    pub fn for_aggregate<A: Aggregate>(id: &A::Id) -> Self {
        Self::new(A::STREAM_NAME, id)
    }

    /// The partition key.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The aggregate instance ID.
    #[must_use]
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }
}

impl fmt::Display for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stream_id)
    }
}
