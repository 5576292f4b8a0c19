//! In-memory `SnapshotStore` keeping only the latest snapshot per stream.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

use eventide_core::collection::SnapshotCollection;
use eventide_core::error::{EventSourcingError, StoreFailure};
use eventide_core::snapshot::{SnapshotEnvelope, SnapshotStore};
use eventide_core::stream::EventStream;

/// Snapshot store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    collections: DashSet<String>,
    snapshots: DashMap<(String, String), SnapshotEnvelope>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn provisioned(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = SnapshotCollection::get(pool)?;
        if !self.collections.contains(&collection) {
            return Err(EventSourcingError::persistence(
                collection,
                StoreFailure::MissingCollection,
            ));
        }
        Ok(collection)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn start(&self) -> Result<String, EventSourcingError> {
        self.ensure_collection(None).await
    }

    async fn ensure_collection(&self, pool: Option<&str>) -> Result<String, EventSourcingError> {
        let collection = SnapshotCollection::get(pool)?;
        if self.collections.insert(collection.clone()) {
            info!(%collection, "provisioned in-memory snapshot collection");
        }
        Ok(collection)
    }

    async fn stop(&self) -> Result<(), EventSourcingError> {
        Ok(())
    }

    async fn save(
        &self,
        stream: &EventStream,
        snapshot: SnapshotEnvelope,
        pool: Option<&str>,
    ) -> Result<(), EventSourcingError> {
        let collection = self.provisioned(pool)?;
        let version = snapshot.version();
        match self.snapshots.entry((collection, stream.stream_id().to_owned())) {
            Entry::Occupied(mut stored) => {
                let latest = stored.get().version();
                if version < latest {
                    return Err(EventSourcingError::StaleSnapshot {
                        stream_id: stream.stream_id().to_owned(),
                        version,
                        latest,
                    });
                }
                stored.insert(snapshot);
            }
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
            }
        }
        debug!(stream_id = %stream, version, "saved snapshot");
        Ok(())
    }

    async fn load(
        &self,
        stream: &EventStream,
        pool: Option<&str>,
    ) -> Result<Option<SnapshotEnvelope>, EventSourcingError> {
        let collection = self.provisioned(pool)?;
        Ok(self
            .snapshots
            .get(&(collection, stream.stream_id().to_owned()))
            .map(|snapshot| snapshot.clone()))
    }
}
