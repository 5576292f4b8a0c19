//! Shared test fixtures for the eventide event store.

mod account;
mod clock;
mod store;

pub use account::{
    Account, AccountClosed, AccountCredited, AccountDebited, AccountEvent, AccountOpened,
    AccountOpenedSerializer, AccountSnapshot, account_event_map,
};
pub use clock::FixedClock;
pub use store::FailingEventStore;
