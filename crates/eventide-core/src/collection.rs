//! Mapping of pool names to physical collections.

use crate::error::{EventSourcingError, StoreFailure};

/// Collection holding events of the default pool.
pub const DEFAULT_EVENT_COLLECTION: &str = "events";

/// Collection holding snapshots of the default pool.
pub const DEFAULT_SNAPSHOT_COLLECTION: &str = "snapshots";

/// Resolves event collection names.
#[derive(Debug, Clone, Copy)]
pub struct EventCollection;

impl EventCollection {
    /// Returns the event collection for `pool` (`events` or `{pool}-events`).
    ///
    /// # Errors
    ///
    /// Returns a persistence error with `InvalidPool` if the pool name
    /// contains anything but ASCII alphanumerics, `_` or `-`.
    pub fn get(pool: Option<&str>) -> Result<String, EventSourcingError> {
        collection_name(pool, DEFAULT_EVENT_COLLECTION)
    }
}

/// Resolves snapshot collection names.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCollection;

impl SnapshotCollection {
    /// Returns the snapshot collection for `pool` (`snapshots` or
    /// `{pool}-snapshots`).
    ///
    /// # Errors
    ///
    /// Returns a persistence error with `InvalidPool` for malformed pools.
    pub fn get(pool: Option<&str>) -> Result<String, EventSourcingError> {
        collection_name(pool, DEFAULT_SNAPSHOT_COLLECTION)
    }
}

fn collection_name(pool: Option<&str>, suffix: &str) -> Result<String, EventSourcingError> {
    let Some(pool) = pool else {
        return Ok(suffix.to_owned());
    };
    let valid = !pool.is_empty()
        && pool
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(EventSourcingError::persistence(
            pool,
            StoreFailure::InvalidPool(pool.to_owned()),
        ));
    }
    Ok(format!("{pool}-{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_maps_to_plain_collection() {
        assert_eq!(EventCollection::get(None).unwrap(), "events");
        assert_eq!(SnapshotCollection::get(None).unwrap(), "snapshots");
    }

    #[test]
    fn test_named_pool_is_prefixed() {
        assert_eq!(EventCollection::get(Some("tenant_a")).unwrap(), "tenant_a-events");
        assert_eq!(
            SnapshotCollection::get(Some("tenant_a")).unwrap(),
            "tenant_a-snapshots"
        );
    }

    #[test]
    fn test_pool_with_quote_is_rejected() {
        let err = EventCollection::get(Some("x\"; DROP TABLE events")).unwrap_err();

        assert!(matches!(
            err,
            EventSourcingError::Persistence {
                source: StoreFailure::InvalidPool(_),
                ..
            }
        ));
    }
}
