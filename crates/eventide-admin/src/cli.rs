//! Command-line arguments.

use clap::{Args, Parser, Subcommand};

use eventide_core::filter::{EventFilter, StreamReadingDirection};
use eventide_core::stream::EventStream;
use eventide_event_store::config::{
    DATABASE_URL_VAR, DRIVER_VAR, MAX_CONNECTIONS_VAR, POOL_VAR,
};
use eventide_event_store::{ConfigError, StoreConfig};

#[derive(Debug, Parser)]
#[command(
    name = "eventide-admin",
    version,
    about = "Provision and audit eventide event stores",
    propagate_version = true
)]
pub struct Cli {
    /// Storage driver; commands need a persistent one (postgres)
    #[arg(long, global = true, env = DRIVER_VAR)]
    pub driver: Option<String>,

    /// PostgreSQL connection string
    #[arg(long, global = true, env = DATABASE_URL_VAR, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Connection pool size
    #[arg(long, global = true, env = MAX_CONNECTIONS_VAR)]
    pub max_connections: Option<String>,

    /// Pool whose collections are used instead of the defaults
    #[arg(long, global = true, env = POOL_VAR)]
    pub pool: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the event and snapshot collections if they do not exist
    Provision,
    /// Print the envelopes of one stream as JSON lines
    Dump(DumpArgs),
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Aggregate type name (the stream ID prefix)
    pub stream_name: String,

    /// Aggregate instance ID
    pub aggregate_id: String,

    /// Lowest version to print
    #[arg(long = "from", value_name = "VERSION")]
    pub from_version: Option<i64>,

    /// Print newest events first
    #[arg(long)]
    pub backward: bool,

    /// Maximum number of envelopes to print
    #[arg(long)]
    pub limit: Option<usize>,

    /// Envelopes fetched per query
    #[arg(long)]
    pub batch: Option<usize>,
}

impl Cli {
    /// Builds the store configuration from flags, falling back to the
    /// environment through clap.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for invalid values.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        StoreConfig::from_lookup(|name| match name {
            DRIVER_VAR => self.driver.clone(),
            DATABASE_URL_VAR => self.database_url.clone(),
            MAX_CONNECTIONS_VAR => self.max_connections.clone(),
            POOL_VAR => self.pool.clone(),
            _ => None,
        })
    }
}

impl DumpArgs {
    /// The stream to dump.
    #[must_use]
    pub fn stream(&self) -> EventStream {
        EventStream::new(&self.stream_name, &self.aggregate_id)
    }

    /// The read filter described by the flags.
    #[must_use]
    pub fn filter(&self, pool: Option<&str>) -> EventFilter {
        EventFilter {
            from_version: self.from_version,
            direction: if self.backward {
                StreamReadingDirection::Backward
            } else {
                StreamReadingDirection::Forward
            },
            limit: self.limit,
            batch: self.batch,
            pool: pool.map(str::to_owned),
        }
    }
}
