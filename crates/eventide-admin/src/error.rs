//! Admin CLI error types.

use eventide_core::error::EventSourcingError;
use eventide_event_store::{ConfigError, ConnectError, StoreDriver};
use thiserror::Error;

/// Errors surfaced by admin commands.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Store configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The configured driver keeps nothing beyond this process.
    #[error("the {0} driver does not persist between runs; set --driver postgres")]
    EphemeralDriver(StoreDriver),

    /// The configured stores could not be opened.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] EventSourcingError),

    /// Writing command output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// An envelope could not be encoded as JSON.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}
