//! Operator CLI for eventide stores.

pub mod cli;
pub mod commands;
pub mod error;

use std::io::Write;
use std::sync::Arc;

use eventide_core::clock::SystemClock;
use eventide_core::event_map::EventMap;
use eventide_event_store::{StoreDriver, connect};

use crate::cli::{Cli, Command};
use crate::error::AdminError;

/// Runs the parsed command against the configured stores, writing its
/// output to `out`.
///
/// Envelopes are dumped in their stored form, so no event types need to be
/// registered.
///
/// # Errors
///
/// Returns `AdminError::EphemeralDriver` for the in-memory driver, whose
/// stores would start empty and vanish on exit. Returns other `AdminError`
/// variants if configuration, connection or the command fails.
pub async fn run(cli: Cli, out: &mut impl Write) -> Result<(), AdminError> {
    let config = cli.store_config()?;
    if config.driver == StoreDriver::Memory {
        return Err(AdminError::EphemeralDriver(config.driver));
    }
    let stores = connect(&config, Arc::new(EventMap::new()), Arc::new(SystemClock)).await?;

    let result = match &cli.command {
        Command::Provision => commands::provision(&stores, config.pool.as_deref(), out).await,
        Command::Dump(args) => {
            commands::dump(stores.events.as_ref(), args, config.pool.as_deref(), out)
                .await
                .map(|_| ())
        }
    };

    stores.events.stop().await?;
    stores.snapshots.stop().await?;
    result
}
