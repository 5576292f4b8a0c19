//! Domain event abstractions.

use std::any::Any;
use std::fmt;

/// Trait that all registrable domain events implement.
///
/// `NAME` is the unique wire name stored alongside every payload. An empty
/// name means the type never declared one and is rejected at registration.
pub trait Event: Any + Clone + Send + Sync + fmt::Debug {
    /// The event name used for serialization routing.
    const NAME: &'static str;
}

/// Object-safe view of an [`Event`], used wherever events of different types
/// travel together (store reads, appends, the event map).
pub trait DomainEvent: Any + Send + Sync + fmt::Debug + 'static {
    /// Returns the declared event name.
    fn event_name(&self) -> &'static str;

    /// Returns the Rust type name of the concrete event.
    fn type_name(&self) -> &'static str;

    /// Returns `self` as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts the boxed event into a boxed `Any` for owned downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    /// Clones the event behind the trait object.
    fn clone_event(&self) -> Box<dyn DomainEvent>;
}

impl<E: Event> DomainEvent for E {
    fn event_name(&self) -> &'static str {
        E::NAME
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn clone_event(&self) -> Box<dyn DomainEvent> {
        Box::new(self.clone())
    }
}

impl dyn DomainEvent {
    /// Returns `true` if the event is of type `E`.
    #[must_use]
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Returns a reference to the concrete event if it is of type `E`.
    #[must_use]
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

impl Clone for Box<dyn DomainEvent> {
    fn clone(&self) -> Self {
        self.clone_event()
    }
}

/// Converts a type-erased event into one variant of an aggregate's event
/// enum by trying each candidate type in turn.
///
/// ```
/// # use eventide_core::event::{DomainEvent, Event, EventCast};
/// #[derive(Debug, Clone)]
/// struct Opened;
/// impl Event for Opened { const NAME: &'static str = "opened"; }
///
/// #[derive(Debug, Clone)]
/// struct Closed;
/// impl Event for Closed { const NAME: &'static str = "closed"; }
///
/// #[derive(Debug)]
/// enum Lifecycle { Opened(Opened), Closed(Closed) }
///
/// let erased: Box<dyn DomainEvent> = Box::new(Closed);
/// let event = EventCast::new(erased)
///     .case(Lifecycle::Opened)
///     .case(Lifecycle::Closed)
///     .finish();
/// assert!(matches!(event, Some(Lifecycle::Closed(_))));
/// ```
pub struct EventCast<T> {
    state: Result<T, Box<dyn Any + Send>>,
}

impl<T> EventCast<T> {
    /// Starts a cast of `event`.
    #[must_use]
    pub fn new(event: Box<dyn DomainEvent>) -> Self {
        Self {
            state: Err(event.into_any()),
        }
    }

    /// Maps the event with `variant` if it is of type `E` and no earlier case
    /// matched.
    #[must_use]
    pub fn case<E: Event>(self, variant: impl FnOnce(E) -> T) -> Self {
        match self.state {
            Err(any) => match any.downcast::<E>() {
                Ok(event) => Self {
                    state: Ok(variant(*event)),
                },
                Err(any) => Self { state: Err(any) },
            },
            matched @ Ok(_) => Self { state: matched },
        }
    }

    /// Returns the converted value, or `None` if no case matched.
    pub fn finish(self) -> Option<T> {
        self.state.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct AccountOpened {
        owner: String,
    }

    impl Event for AccountOpened {
        const NAME: &'static str = "account-opened";
    }

    #[derive(Debug, Clone, PartialEq)]
    struct AccountClosed;

    impl Event for AccountClosed {
        const NAME: &'static str = "account-closed";
    }

    #[derive(Debug, PartialEq)]
    enum AccountEvent {
        Opened(AccountOpened),
        Closed(AccountClosed),
    }

    #[test]
    fn test_domain_event_exposes_declared_name() {
        let event: Box<dyn DomainEvent> = Box::new(AccountClosed);

        assert_eq!(event.event_name(), "account-closed");
        assert!(event.is::<AccountClosed>());
        assert!(!event.is::<AccountOpened>());
    }

    #[test]
    fn test_downcast_ref_returns_concrete_event() {
        let event: Box<dyn DomainEvent> = Box::new(AccountOpened {
            owner: "ada".to_owned(),
        });

        let opened = event.downcast_ref::<AccountOpened>().unwrap();

        assert_eq!(opened.owner, "ada");
        assert!(event.downcast_ref::<AccountClosed>().is_none());
    }

    #[test]
    fn test_event_cast_picks_matching_variant() {
        let event: Box<dyn DomainEvent> = Box::new(AccountOpened {
            owner: "ada".to_owned(),
        });

        let cast = EventCast::new(event)
            .case(AccountEvent::Closed)
            .case(AccountEvent::Opened)
            .finish();

        assert_eq!(
            cast,
            Some(AccountEvent::Opened(AccountOpened {
                owner: "ada".to_owned()
            }))
        );
    }

    #[test]
    fn test_event_cast_without_matching_case_returns_none() {
        let event: Box<dyn DomainEvent> = Box::new(AccountClosed);

        let cast = EventCast::new(event).case(AccountEvent::Opened).finish();

        assert!(cast.is_none());
    }

    #[test]
    fn test_boxed_events_clone_through_trait_object() {
        let event: Box<dyn DomainEvent> = Box::new(AccountClosed);

        let cloned = event.clone();

        assert!(cloned.is::<AccountClosed>());
    }
}
