//! Aggregate root abstraction.

use std::fmt;

use crate::event::DomainEvent;

/// The closed set of events an aggregate produces and consumes.
///
/// Usually an enum with one variant per event type. Conversions to and from
/// `Box<dyn DomainEvent>` connect the enum to the event store; see
/// [`EventCast`](crate::event::EventCast) for the reverse direction.
pub trait AggregateEvent: Sized + Send + Sync + fmt::Debug {
    /// Registered name of the wrapped event.
    fn event_name(&self) -> &'static str;

    /// Erases the variant for storage.
    fn into_domain_event(self) -> Box<dyn DomainEvent>;

    /// Recovers the variant from a stored event. Returns `None` for events
    /// that are not part of this set.
    fn from_domain_event(event: Box<dyn DomainEvent>) -> Option<Self>;
}

/// Version counter and pending-event buffer shared by every aggregate.
#[derive(Debug, Clone)]
pub struct AggregateState<E> {
    version: i64,
    pending: Vec<E>,
}

impl<E> Default for AggregateState<E> {
    fn default() -> Self {
        Self {
            version: 0,
            pending: Vec::new(),
        }
    }
}

impl<E> AggregateState<E> {
    /// Creates an empty state at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events applied so far (replayed or new).
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Events applied since the last commit.
    #[must_use]
    pub fn pending(&self) -> &[E] {
        &self.pending
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.pending)
    }
}

/// Trait for aggregate roots that reconstitute from event history.
///
/// Implementors provide storage for an [`AggregateState`] and a `handle`
/// dispatch that matches on the event enum; variants that do not change
/// state fall through a wildcard arm.
pub trait Aggregate: Send + Sync + Sized {
    /// Name of the aggregate type, used as the stream ID prefix.
    const STREAM_NAME: &'static str;

    /// Aggregate identifier type.
    type Id: fmt::Display + Clone + Send + Sync;

    /// The event set this aggregate produces and consumes.
    type Event: AggregateEvent;

    /// Creates an empty aggregate at version 0.
    fn with_id(id: Self::Id) -> Self;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the shared version/pending state.
    fn state(&self) -> &AggregateState<Self::Event>;

    /// Returns the shared version/pending state mutably.
    fn state_mut(&mut self) -> &mut AggregateState<Self::Event>;

    /// Mutates in-memory state for one event.
    fn handle(&mut self, event: &Self::Event);

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64 {
        self.state().version()
    }

    /// Returns uncommitted events produced by domain operations.
    fn pending_events(&self) -> &[Self::Event] {
        self.state().pending()
    }

    /// Applies a newly produced event: bumps the version, buffers the event
    /// for the next commit and runs its handler.
    fn apply(&mut self, event: Self::Event) {
        self.apply_event(event, false);
    }

    /// Applies an event, buffering it unless it is replayed from history.
    ///
    /// The handler observes the already incremented version.
    fn apply_event(&mut self, event: Self::Event, from_history: bool) {
        self.state_mut().bump();
        self.handle(&event);
        if !from_history {
            self.state_mut().push(event);
        }
    }

    /// Replays stored events in stream order without buffering them.
    fn load_from_history<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Self::Event>,
    {
        for event in events {
            self.apply_event(event, true);
        }
    }

    /// Drains the pending buffer in apply order.
    fn commit(&mut self) -> Vec<Self::Event> {
        self.state_mut().drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventCast};

    #[derive(Debug, Clone, PartialEq)]
    struct Incremented(i64);

    impl Event for Incremented {
        const NAME: &'static str = "incremented";
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Noted;

    impl Event for Noted {
        const NAME: &'static str = "noted";
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Incremented(Incremented),
        Noted(Noted),
    }

    impl AggregateEvent for CounterEvent {
        fn event_name(&self) -> &'static str {
            match self {
                Self::Incremented(_) => Incremented::NAME,
                Self::Noted(_) => Noted::NAME,
            }
        }

        fn into_domain_event(self) -> Box<dyn DomainEvent> {
            match self {
                Self::Incremented(e) => Box::new(e),
                Self::Noted(e) => Box::new(e),
            }
        }

        fn from_domain_event(event: Box<dyn DomainEvent>) -> Option<Self> {
            EventCast::new(event)
                .case(Self::Incremented)
                .case(Self::Noted)
                .finish()
        }
    }

    #[derive(Debug)]
    struct Counter {
        id: u32,
        total: i64,
        seen_versions: Vec<i64>,
        state: AggregateState<CounterEvent>,
    }

    impl Aggregate for Counter {
        const STREAM_NAME: &'static str = "counter";
        type Id = u32;
        type Event = CounterEvent;

        fn with_id(id: u32) -> Self {
            Self {
                id,
                total: 0,
                seen_versions: Vec::new(),
                state: AggregateState::new(),
            }
        }

        fn id(&self) -> &u32 {
            &self.id
        }

        fn state(&self) -> &AggregateState<CounterEvent> {
            &self.state
        }

        fn state_mut(&mut self) -> &mut AggregateState<CounterEvent> {
            &mut self.state
        }

        fn handle(&mut self, event: &CounterEvent) {
            self.seen_versions.push(self.version());
            match event {
                CounterEvent::Incremented(Incremented(by)) => self.total += by,
                CounterEvent::Noted(_) => {}
            }
        }
    }

    fn inc(by: i64) -> CounterEvent {
        CounterEvent::Incremented(Incremented(by))
    }

    #[test]
    fn test_apply_bumps_version_buffers_and_handles() {
        let mut counter = Counter::with_id(1);

        counter.apply(inc(2));
        counter.apply(inc(3));

        assert_eq!(counter.version(), 2);
        assert_eq!(counter.total, 5);
        assert_eq!(counter.pending_events(), &[inc(2), inc(3)]);
        assert_eq!(counter.seen_versions, vec![1, 2]);
    }

    #[test]
    fn test_load_from_history_does_not_buffer() {
        let mut counter = Counter::with_id(1);

        counter.load_from_history(vec![inc(1), inc(1), inc(1)]);

        assert_eq!(counter.version(), 3);
        assert_eq!(counter.total, 3);
        assert!(counter.pending_events().is_empty());
    }

    #[test]
    fn test_events_without_state_change_still_count() {
        let mut counter = Counter::with_id(1);

        counter.load_from_history(vec![inc(4), CounterEvent::Noted(Noted)]);
        counter.apply(CounterEvent::Noted(Noted));

        assert_eq!(counter.version(), 3);
        assert_eq!(counter.total, 4);
        assert_eq!(counter.pending_events().len(), 1);
    }

    #[test]
    fn test_commit_drains_pending_in_apply_order_and_keeps_version() {
        let mut counter = Counter::with_id(1);
        counter.load_from_history(vec![inc(1)]);
        counter.apply(inc(2));
        counter.apply(CounterEvent::Noted(Noted));

        let committed = counter.commit();

        assert_eq!(committed, vec![inc(2), CounterEvent::Noted(Noted)]);
        assert!(counter.pending_events().is_empty());
        assert!(counter.commit().is_empty());
        assert_eq!(counter.version(), 3);
    }

    #[test]
    fn test_event_set_round_trips_through_domain_event() {
        let erased = inc(7).into_domain_event();

        assert_eq!(erased.event_name(), "incremented");
        assert_eq!(CounterEvent::from_domain_event(erased), Some(inc(7)));
    }
}
