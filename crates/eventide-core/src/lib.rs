//! Event sourcing abstractions for eventide.
//!
//! This crate defines the event registry, the persisted envelope model, the
//! storage contracts every backend implements, and the aggregate replay
//! logic. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod collection;
pub mod envelope;
pub mod error;
pub mod event;
pub mod event_id;
pub mod event_map;
pub mod filter;
pub mod repository;
pub mod snapshot;
pub mod store;
pub mod stream;
