//! Store configuration read from the environment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Selects the backend driver (`memory` or `postgres`).
pub const DRIVER_VAR: &str = "EVENTIDE_DRIVER";
/// `PostgreSQL` connection string, required by the `postgres` driver.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Upper bound of the connection pool.
pub const MAX_CONNECTIONS_VAR: &str = "DATABASE_MAX_CONNECTIONS";
/// Extra pool provisioned at startup besides the default collection.
pub const POOL_VAR: &str = "EVENTIDE_POOL";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The driver name is not recognised.
    #[error("unknown store driver {0:?}; expected \"memory\" or \"postgres\"")]
    UnknownDriver(String),

    /// The `postgres` driver was selected without a connection string.
    #[error("DATABASE_URL environment variable must be set for the postgres driver")]
    MissingDatabaseUrl,

    /// The pool size is not a positive integer.
    #[error("DATABASE_MAX_CONNECTIONS must be a positive integer, got {0:?}")]
    InvalidMaxConnections(String),
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    /// Process-local maps; data is lost on exit.
    #[default]
    Memory,
    /// `PostgreSQL` via sqlx.
    Postgres,
}

impl FromStr for StoreDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownDriver(other.to_owned())),
        }
    }
}

impl fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Postgres => f.write_str("postgres"),
        }
    }
}

/// Typed store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backend driver.
    pub driver: StoreDriver,
    /// Connection string; always set for the `postgres` driver.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub max_connections: u32,
    /// Extra pool to provision on connect.
    pub pool: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            pool: None,
        }
    }
}

impl StoreConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a variable holds an invalid value or the
    /// `postgres` driver lacks `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// See [`StoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let driver = non_empty(DRIVER_VAR)
            .map(|v| v.parse::<StoreDriver>())
            .transpose()?
            .unwrap_or_default();
        let database_url = non_empty(DATABASE_URL_VAR);
        if driver == StoreDriver::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        let max_connections = match non_empty(MAX_CONNECTIONS_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidMaxConnections(raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            driver,
            database_url,
            max_connections,
            pool: non_empty(POOL_VAR),
        })
    }
}
