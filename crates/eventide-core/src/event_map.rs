//! Registry binding event names to their types and serializers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::EventEnvelope;
use crate::error::{BoxError, EventSourcingError};
use crate::event::{DomainEvent, Event};

/// Converts one event type to and from its stored payload.
pub trait EventSerializer<E>: Send + Sync {
    /// Encodes `event` into a payload.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error if the event cannot be represented.
    fn serialize(&self, event: &E) -> Result<Value, BoxError>;

    /// Decodes a payload back into the event.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error if the payload is malformed.
    fn deserialize(&self, payload: Value) -> Result<E, BoxError>;
}

/// Default serializer: a field-for-field structural copy through serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventSerializer;

impl<E> EventSerializer<E> for JsonEventSerializer
where
    E: Serialize + DeserializeOwned,
{
    fn serialize(&self, event: &E) -> Result<Value, BoxError> {
        Ok(serde_json::to_value(event)?)
    }

    fn deserialize(&self, payload: Value) -> Result<E, BoxError> {
        Ok(serde_json::from_value(payload)?)
    }
}

/// Describes a registered event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType {
    /// Registered event name.
    pub name: &'static str,
    /// Rust type identity.
    pub type_id: TypeId,
    /// Rust type name, for diagnostics.
    pub type_name: &'static str,
}

impl EventType {
    /// Describes event type `E`.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self {
            name: E::NAME,
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }
}

/// A lookup key: an event name, an event type, or (via `From`) an instance.
#[derive(Debug, Clone, Copy)]
pub enum EventKey<'a> {
    /// Lookup by registered name.
    Name(&'a str),
    /// Lookup by Rust type.
    Type {
        /// Rust type identity.
        type_id: TypeId,
        /// Rust type name, reported when the type is unregistered.
        type_name: &'static str,
    },
}

impl EventKey<'_> {
    /// Key for event type `E`.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self::Type {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }

    fn unregistered(&self) -> EventSourcingError {
        match self {
            Self::Name(name) => EventSourcingError::UnregisteredEvent((*name).to_owned()),
            Self::Type { type_name, .. } => {
                EventSourcingError::UnregisteredEvent((*type_name).to_owned())
            }
        }
    }
}

impl<'a> From<&'a str> for EventKey<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for EventKey<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a dyn DomainEvent> for EventKey<'a> {
    fn from(event: &'a dyn DomainEvent) -> Self {
        Self::Type {
            type_id: event.as_any().type_id(),
            type_name: event.type_name(),
        }
    }
}

trait ErasedCodec: Send + Sync {
    fn serialize(&self, event: &dyn DomainEvent) -> Result<Value, BoxError>;
    fn deserialize(&self, payload: Value) -> Result<Box<dyn DomainEvent>, BoxError>;
    fn as_any(&self) -> &dyn Any;
}

struct Codec<E> {
    serializer: Arc<dyn EventSerializer<E>>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> ErasedCodec for Codec<E> {
    fn serialize(&self, event: &dyn DomainEvent) -> Result<Value, BoxError> {
        let event = event
            .downcast_ref::<E>()
            .ok_or_else(|| format!("expected an instance of {}", std::any::type_name::<E>()))?;
        self.serializer.serialize(event)
    }

    fn deserialize(&self, payload: Value) -> Result<Box<dyn DomainEvent>, BoxError> {
        Ok(Box::new(self.serializer.deserialize(payload)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Registration {
    event_type: EventType,
    codec: Box<dyn ErasedCodec>,
}

/// Process-wide registry of event types.
///
/// Populated once during initialization and shared read-only (usually behind
/// an `Arc`) with stores and repositories afterwards.
#[derive(Default)]
pub struct EventMap {
    by_name: HashMap<&'static str, Registration>,
    by_type: HashMap<TypeId, &'static str>,
}

impl EventMap {
    /// Creates an empty event map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` with the default JSON serializer.
    ///
    /// # Errors
    ///
    /// Returns `MissingEventMetadata` if `E::NAME` is blank and
    /// `DuplicateEventName` if the name or the type is already registered.
    pub fn register<E>(&mut self) -> Result<(), EventSourcingError>
    where
        E: Event + Serialize + DeserializeOwned,
    {
        self.register_with::<E>(JsonEventSerializer)
    }

    /// Registers `E` with a custom serializer.
    ///
    /// # Errors
    ///
    /// Returns `MissingEventMetadata` if `E::NAME` is blank and
    /// `DuplicateEventName` if the name or the type is already registered.
    pub fn register_with<E: Event>(
        &mut self,
        serializer: impl EventSerializer<E> + 'static,
    ) -> Result<(), EventSourcingError> {
        let event_type = EventType::of::<E>();
        if event_type.name.trim().is_empty() {
            return Err(EventSourcingError::MissingEventMetadata {
                type_name: event_type.type_name,
            });
        }
        if let Some(existing) = self.by_type.get(&event_type.type_id) {
            return Err(EventSourcingError::DuplicateEventName {
                name: (*existing).to_owned(),
            });
        }
        if self.by_name.contains_key(event_type.name) {
            return Err(EventSourcingError::DuplicateEventName {
                name: event_type.name.to_owned(),
            });
        }

        self.by_type.insert(event_type.type_id, event_type.name);
        self.by_name.insert(
            event_type.name,
            Registration {
                event_type,
                codec: Box::new(Codec::<E> {
                    serializer: Arc::new(serializer),
                    _event: PhantomData,
                }),
            },
        );
        Ok(())
    }

    /// Returns `true` if the key resolves to a registered event.
    pub fn has<'a>(&self, key: impl Into<EventKey<'a>>) -> bool {
        self.resolve(&key.into()).is_ok()
    }

    /// Returns the registered name for a name, type or instance.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if the key is unknown.
    pub fn get_name<'a>(&self, key: impl Into<EventKey<'a>>) -> Result<&'static str, EventSourcingError> {
        self.resolve(&key.into()).map(|r| r.event_type.name)
    }

    /// Returns the registered type for a name, type or instance.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if the key is unknown.
    pub fn get_type<'a>(&self, key: impl Into<EventKey<'a>>) -> Result<EventType, EventSourcingError> {
        self.resolve(&key.into()).map(|r| r.event_type)
    }

    /// Returns the serializer registered for `E`.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if `E` is unknown.
    pub fn get_serializer<E: Event>(&self) -> Result<Arc<dyn EventSerializer<E>>, EventSourcingError> {
        let key = EventKey::of::<E>();
        let registration = self.resolve(&key)?;
        registration
            .codec
            .as_any()
            .downcast_ref::<Codec<E>>()
            .map(|codec| Arc::clone(&codec.serializer))
            .ok_or_else(|| key.unregistered())
    }

    /// Serializes an event instance into its payload.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if the event's type is unknown and
    /// `Serialization` if the serializer fails.
    pub fn serialize_event(&self, event: &dyn DomainEvent) -> Result<Value, EventSourcingError> {
        let registration = self.resolve(&EventKey::from(event))?;
        registration
            .codec
            .serialize(event)
            .map_err(|source| EventSourcingError::Serialization {
                event: registration.event_type.name.to_owned(),
                source,
            })
    }

    /// Deserializes a payload stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if the name is unknown and `Serialization`
    /// if the payload cannot be decoded.
    pub fn deserialize_event(
        &self,
        name: &str,
        payload: Value,
    ) -> Result<Box<dyn DomainEvent>, EventSourcingError> {
        let registration = self.resolve(&EventKey::Name(name))?;
        registration
            .codec
            .deserialize(payload)
            .map_err(|source| EventSourcingError::Serialization {
                event: name.to_owned(),
                source,
            })
    }

    /// Deserializes a payload directly into `E`.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredEvent` if `E` is unknown and `Serialization` if
    /// the payload cannot be decoded.
    pub fn deserialize<E: Event>(&self, payload: Value) -> Result<E, EventSourcingError> {
        self.get_serializer::<E>()?
            .deserialize(payload)
            .map_err(|source| EventSourcingError::Serialization {
                event: E::NAME.to_owned(),
                source,
            })
    }

    /// Deserializes the event carried by an envelope.
    ///
    /// # Errors
    ///
    /// See [`EventMap::deserialize_event`].
    pub fn deserialize_envelope(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<Box<dyn DomainEvent>, EventSourcingError> {
        self.deserialize_event(envelope.event(), envelope.payload().clone())
    }

    /// Returns the registered event names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_name.keys().copied()
    }

    /// Returns the number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn resolve(&self, key: &EventKey<'_>) -> Result<&Registration, EventSourcingError> {
        let name = match key {
            EventKey::Name(name) => Some(*name),
            EventKey::Type { type_id, .. } => self.by_type.get(type_id).copied(),
        };
        name.and_then(|name| self.by_name.get(name))
            .ok_or_else(|| key.unregistered())
    }
}

impl fmt::Debug for EventMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("EventMap").field("events", &names).finish()
    }
}
