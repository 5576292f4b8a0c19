//! Event store database schema.
//!
//! Every pool gets its own pair of tables, named after its collection. Table
//! names come from `EventCollection` / `SnapshotCollection`, whose pool
//! charset makes them safe to quote verbatim.

/// SQL creating the events table for `collection`.
#[must_use]
pub fn create_events_table(collection: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{collection}" (
    stream_id      TEXT NOT NULL,
    version        BIGINT NOT NULL,
    event          TEXT NOT NULL,
    payload        JSONB NOT NULL,
    event_id       UUID NOT NULL UNIQUE,
    aggregate_id   TEXT NOT NULL,
    occurred_on    TIMESTAMPTZ NOT NULL,
    correlation_id TEXT,
    causation_id   TEXT,
    PRIMARY KEY (stream_id, version)
)
"#
    )
}

/// SQL creating the snapshots table for `collection`. One row per stream.
#[must_use]
pub fn create_snapshots_table(collection: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{collection}" (
    stream_id      TEXT PRIMARY KEY,
    aggregate_name TEXT NOT NULL,
    version        BIGINT NOT NULL,
    payload        JSONB NOT NULL,
    occurred_on    TIMESTAMPTZ NOT NULL
)
"#
    )
}
