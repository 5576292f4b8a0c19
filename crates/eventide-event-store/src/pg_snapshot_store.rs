//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use eventide_core::collection::SnapshotCollection;
use eventide_core::error::EventSourcingError;
use eventide_core::snapshot::{SnapshotEnvelope, SnapshotStore};
use eventide_core::stream::EventStream;

use crate::pg_event_store::store_error;
use crate::schema::create_snapshots_table;

/// PostgreSQL-backed snapshot store keeping the latest snapshot per stream.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_row(
        &self,
        collection: &str,
        stream_id: &str,
    ) -> Result<Option<SnapshotRow>, EventSourcingError> {
        let sql = format!(
            r#"SELECT stream_id, aggregate_name, version, payload, occurred_on
               FROM "{collection}" WHERE stream_id = $1"#
        );
        sqlx::query_as(&sql)
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(collection, e))
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn start(&self) -> Result<String, EventSourcingError> {
        self.ensure_collection(None).await
    }

    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = SnapshotCollection::get(pool)?;
        sqlx::query(&create_snapshots_table(&collection))
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&collection, e))?;
        info!(%collection, "provisioned snapshot table");
        Ok(collection)
    }

    async fn stop(&self) -> Result<(), EventSourcingError> {
        self.pool.close().await;
        Ok(())
    }

    async fn save(
        &self,
        stream: &EventStream,
        snapshot: SnapshotEnvelope,
        pool: Option<&str>,
    ) -> Result<(), EventSourcingError> {
        let collection = SnapshotCollection::get(pool)?;
        // The conditional update keeps the stored snapshot when it is newer.
        let sql = format!(
            r#"INSERT INTO "{collection}" (stream_id, aggregate_name, version, payload, occurred_on)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (stream_id) DO UPDATE SET
                   aggregate_name = EXCLUDED.aggregate_name,
                   version = EXCLUDED.version,
                   payload = EXCLUDED.payload,
                   occurred_on = EXCLUDED.occurred_on
               WHERE "{collection}".version <= EXCLUDED.version"#
        );
        let result = sqlx::query(&sql)
            .bind(stream.stream_id())
            .bind(snapshot.aggregate_name())
            .bind(snapshot.version())
            .bind(snapshot.payload())
            .bind(snapshot.occurred_on())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&collection, e))?;

        if result.rows_affected() == 0 {
            let latest = self
                .load_row(&collection, stream.stream_id())
                .await?
                .map_or(0, |row| row.version);
            return Err(EventSourcingError::StaleSnapshot {
                stream_id: stream.stream_id().to_owned(),
                version: snapshot.version(),
                latest,
            });
        }
        debug!(stream_id = %stream, version = snapshot.version(), "saved snapshot");
        Ok(())
    }

    async fn load(
        &self,
        stream: &EventStream,
        pool: Option<&str>,
    ) -> Result<Option<SnapshotEnvelope>, EventSourcingError> {
        let collection = SnapshotCollection::get(pool)?;
        let row = self.load_row(&collection, stream.stream_id()).await?;
        Ok(row.map(SnapshotRow::into_envelope))
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    stream_id: String,
    aggregate_name: String,
    version: i64,
    payload: Value,
    occurred_on: DateTime<Utc>,
}

impl SnapshotRow {
    fn into_envelope(self) -> SnapshotEnvelope {
        SnapshotEnvelope::from_parts(
            self.stream_id,
            self.aggregate_name,
            self.version,
            self.payload,
            self.occurred_on,
        )
    }
}
