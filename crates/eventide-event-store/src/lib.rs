//! Storage backends for the eventide event and snapshot store contracts.
//!
//! The in-memory backend is the reference implementation; the `PostgreSQL`
//! backend persists each pool in its own pair of tables. [`connect`] builds
//! whichever pair a [`StoreConfig`] selects.

mod append;
pub mod config;
pub mod in_memory_event_store;
pub mod in_memory_snapshot_store;
pub mod pg_event_store;
pub mod pg_snapshot_store;
pub mod schema;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use eventide_core::clock::Clock;
use eventide_core::error::EventSourcingError;
use eventide_core::event_map::EventMap;
use eventide_core::snapshot::SnapshotStore;
use eventide_core::store::EventStore;

pub use config::{ConfigError, StoreConfig, StoreDriver};
pub use in_memory_event_store::InMemoryEventStore;
pub use in_memory_snapshot_store::InMemorySnapshotStore;
pub use pg_event_store::PgEventStore;
pub use pg_snapshot_store::PgSnapshotStore;

/// Errors raised while opening the configured stores.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The database could not be reached.
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    /// Provisioning a collection failed.
    #[error(transparent)]
    Store(#[from] EventSourcingError),
}

/// An event store and snapshot store sharing one backend.
#[derive(Clone)]
pub struct Stores {
    /// Event store.
    pub events: Arc<dyn EventStore>,
    /// Snapshot store.
    pub snapshots: Arc<dyn SnapshotStore>,
}

/// Opens and provisions the stores selected by `config`.
///
/// Both default collections are provisioned, plus the collections of
/// `config.pool` when set.
///
/// # Errors
///
/// Returns `ConnectError` if the database is unreachable or provisioning
/// fails.
pub async fn connect(
    config: &StoreConfig,
    event_map: Arc<EventMap>,
    clock: Arc<dyn Clock>,
) -> Result<Stores, ConnectError> {
    let stores = match config.driver {
        StoreDriver::Memory => Stores {
            events: Arc::new(InMemoryEventStore::new(event_map).with_clock(clock)),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
        },
        StoreDriver::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            Stores {
                events: Arc::new(PgEventStore::new(pool.clone(), event_map).with_clock(clock)),
                snapshots: Arc::new(PgSnapshotStore::new(pool)),
            }
        }
    };

    stores.events.start().await?;
    stores.snapshots.start().await?;
    if let Some(pool) = config.pool.as_deref() {
        stores.events.ensure_collection(Some(pool)).await?;
        stores.snapshots.ensure_collection(Some(pool)).await?;
    }
    info!(driver = %config.driver, pool = ?config.pool, "event stores ready");
    Ok(stores)
}
