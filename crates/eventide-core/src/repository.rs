//! Aggregate repository: replays aggregates from a store and commits them
//! back with optimistic concurrency.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, info};

use crate::aggregate::{Aggregate, AggregateEvent};
use crate::clock::{Clock, SystemClock};
use crate::envelope::EventEnvelope;
use crate::error::EventSourcingError;
use crate::event::DomainEvent;
use crate::filter::EventFilter;
use crate::snapshot::{SnapshotAggregate, SnapshotEnvelope, SnapshotPolicy, SnapshotStore};
use crate::store::EventStore;
use crate::stream::EventStream;

/// Loads and saves aggregates of type `A`.
pub struct AggregateRepository<A> {
    event_store: Arc<dyn EventStore>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    snapshot_policy: Option<SnapshotPolicy>,
    clock: Arc<dyn Clock>,
    pool: Option<String>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateRepository<A> {
    /// Creates a repository over `event_store` using the default pool.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self {
            event_store,
            snapshot_store: None,
            snapshot_policy: None,
            clock: Arc::new(SystemClock),
            pool: None,
            _aggregate: PhantomData,
        }
    }

    /// Reads and writes through `pool` instead of the default collection.
    #[must_use]
    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Uses `clock` to timestamp snapshots.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replays the aggregate with the given ID from its full history.
    ///
    /// Returns `None` if the stream has no events.
    ///
    /// # Errors
    ///
    /// Returns the store's read errors, or `UnexpectedEvent` if the stream
    /// contains an event outside the aggregate's event set.
    pub async fn load(&self, id: &A::Id) -> Result<Option<A>, EventSourcingError> {
        let mut aggregate = A::with_id(id.clone());
        let replayed = self.replay(&mut aggregate, 1).await?;
        Ok((replayed > 0).then_some(aggregate))
    }

    /// Commits the aggregate's pending events.
    ///
    /// The aggregate's current version is the expected version of the
    /// append. Returns the stored envelopes; nothing is written if no
    /// events are pending.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store rejects the append, in which case
    /// the caller must reload the aggregate and retry the command.
    pub async fn save(&self, aggregate: &mut A) -> Result<Vec<EventEnvelope>, EventSourcingError> {
        let events = aggregate.commit();
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let stream = EventStream::for_aggregate::<A>(aggregate.id());
        let events: Vec<Box<dyn DomainEvent>> = events
            .into_iter()
            .map(AggregateEvent::into_domain_event)
            .collect();

        let envelopes = self
            .event_store
            .append_events(&stream, aggregate.version(), &events, self.pool.as_deref())
            .await?;

        info!(
            stream_id = %stream,
            version = aggregate.version(),
            event_count = envelopes.len(),
            "committed aggregate events"
        );
        Ok(envelopes)
    }

    async fn replay(&self, aggregate: &mut A, from_version: i64) -> Result<usize, EventSourcingError> {
        let stream = EventStream::for_aggregate::<A>(aggregate.id());
        let mut filter = EventFilter::new().from_version(from_version);
        filter.pool.clone_from(&self.pool);

        let mut chunks = self.event_store.get_events(&stream, filter);
        let mut replayed = 0;
        while let Some(chunk) = chunks.try_next().await? {
            for event in chunk {
                let name = event.event_name();
                let event = A::Event::from_domain_event(event).ok_or_else(|| {
                    EventSourcingError::UnexpectedEvent {
                        stream_id: stream.stream_id().to_owned(),
                        event: name.to_owned(),
                    }
                })?;
                aggregate.apply_event(event, true);
                replayed += 1;
            }
        }

        debug!(stream_id = %stream, replayed, version = aggregate.version(), "replayed aggregate");
        Ok(replayed)
    }
}

impl<A: SnapshotAggregate> AggregateRepository<A> {
    /// Enables snapshot-based loading and periodic snapshotting.
    #[must_use]
    pub fn with_snapshots(mut self, snapshot_store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self
    }

    /// Overrides the aggregate type's snapshot policy for this repository.
    #[must_use]
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = Some(policy);
        self
    }

    fn policy(&self) -> SnapshotPolicy {
        self.snapshot_policy.unwrap_or_else(A::snapshot_policy)
    }

    /// Replays the aggregate starting from its latest snapshot, reading only
    /// the events stored after the snapshot version. Stored snapshots are
    /// ignored while the policy disables snapshotting.
    ///
    /// Returns `None` if there is neither a snapshot nor any event.
    ///
    /// # Errors
    ///
    /// Returns read errors from either store, or `Serialization` if the
    /// snapshot cannot be decoded.
    pub async fn load_snapshotted(&self, id: &A::Id) -> Result<Option<A>, EventSourcingError> {
        let snapshot = self.latest_snapshot(id).await?;
        let mut aggregate = A::with_id(id.clone());
        let from_version = match &snapshot {
            Some(envelope) => {
                aggregate.load_from_history_with_snapshot(Some(envelope), Vec::new())?;
                envelope.version() + 1
            }
            None => 1,
        };

        let replayed = self.replay(&mut aggregate, from_version).await?;
        Ok((snapshot.is_some() || replayed > 0).then_some(aggregate))
    }

    /// Commits pending events and stores a snapshot when the commit crosses
    /// the aggregate type's snapshot interval.
    ///
    /// # Errors
    ///
    /// See [`AggregateRepository::save`]; snapshot failures are returned
    /// after the events have been stored.
    pub async fn save_snapshotted(
        &self,
        aggregate: &mut A,
    ) -> Result<Vec<EventEnvelope>, EventSourcingError> {
        let pending = i64::try_from(aggregate.pending_events().len()).unwrap_or(i64::MAX);
        let previous_version = aggregate.version() - pending;
        let envelopes = self.save(aggregate).await?;

        if let Some(store) = &self.snapshot_store {
            if self.policy().is_due(previous_version, aggregate.version()) {
                let stream = EventStream::for_aggregate::<A>(aggregate.id());
                let snapshot = aggregate.to_snapshot_envelope(self.clock.now())?;
                store.save(&stream, snapshot, self.pool.as_deref()).await?;
                debug!(stream_id = %stream, version = aggregate.version(), "stored snapshot");
            }
        }
        Ok(envelopes)
    }

    async fn latest_snapshot(
        &self,
        id: &A::Id,
    ) -> Result<Option<SnapshotEnvelope>, EventSourcingError> {
        match &self.snapshot_store {
            Some(store) if self.policy().is_enabled() => {
                let stream = EventStream::for_aggregate::<A>(id);
                store.load(&stream, self.pool.as_deref()).await
            }
            _ => Ok(None),
        }
    }
}
