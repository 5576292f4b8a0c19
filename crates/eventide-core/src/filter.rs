//! Stream read filters and keyset pagination.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::EventSourcingError;

/// Number of events per chunk when a filter does not specify `batch`.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Order in which a stream is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamReadingDirection {
    /// Ascending by version.
    #[default]
    Forward,
    /// Descending by version.
    Backward,
}

/// Options for batched stream reads.
///
/// Zero or negative values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Lowest version to return, in either direction.
    pub from_version: Option<i64>,
    /// Read order.
    #[serde(default)]
    pub direction: StreamReadingDirection,
    /// Maximum number of events returned overall.
    pub limit: Option<usize>,
    /// Chunk size.
    pub batch: Option<usize>,
    /// Alternate pool to read from.
    pub pool: Option<String>,
}

impl EventFilter {
    /// A filter reading the whole stream forward from the default pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only return events with `version >= from_version`.
    #[must_use]
    pub fn from_version(mut self, from_version: i64) -> Self {
        self.from_version = Some(from_version);
        self
    }

    /// Sets the read order.
    #[must_use]
    pub fn direction(mut self, direction: StreamReadingDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Caps the number of returned events.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Reads from `pool` instead of the default collection.
    #[must_use]
    pub fn pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Effective chunk size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch.filter(|b| *b > 0).unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// One page request issued by a [`ReadCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Inclusive lower version bound.
    pub lower: i64,
    /// Inclusive upper version bound.
    pub upper: i64,
    /// Read order within the bounds.
    pub direction: StreamReadingDirection,
    /// Maximum rows to fetch.
    pub size: usize,
}

/// Keyset cursor turning an [`EventFilter`] into successive page requests.
#[derive(Debug, Clone)]
pub struct ReadCursor {
    direction: StreamReadingDirection,
    lower: i64,
    upper: i64,
    remaining: usize,
    batch: usize,
    exhausted: bool,
}

impl ReadCursor {
    /// Creates a cursor positioned before the first matching event.
    #[must_use]
    pub fn new(filter: &EventFilter) -> Self {
        Self {
            direction: filter.direction,
            lower: filter.from_version.filter(|v| *v > 0).unwrap_or(1),
            upper: i64::MAX,
            remaining: filter.limit.filter(|l| *l > 0).unwrap_or(usize::MAX),
            batch: filter.batch_size(),
            exhausted: false,
        }
    }

    /// Returns the next page to fetch, or `None` once the read is complete.
    #[must_use]
    pub fn next_page(&self) -> Option<Page> {
        if self.exhausted || self.remaining == 0 || self.lower > self.upper {
            return None;
        }
        Some(Page {
            lower: self.lower,
            upper: self.upper,
            direction: self.direction,
            size: self.batch.min(self.remaining),
        })
    }

    /// Moves past a fetched page of `fetched` rows ending at `last_version`.
    pub fn advance(&mut self, page: &Page, fetched: usize, last_version: Option<i64>) {
        self.remaining = self.remaining.saturating_sub(fetched);
        match last_version {
            Some(last) if fetched == page.size => match self.direction {
                StreamReadingDirection::Forward => self.lower = last.saturating_add(1),
                StreamReadingDirection::Backward => self.upper = last.saturating_sub(1),
            },
            _ => self.exhausted = true,
        }
    }
}

/// Turns a page fetcher into a lazy stream of chunks.
///
/// `fetch` runs once per chunk, only when the consumer polls for it, so
/// dropping the stream early never touches the backend again.
pub fn paginate<'a, T, F, Fut>(
    filter: &EventFilter,
    fetch: F,
    version_of: fn(&T) -> i64,
) -> BoxStream<'a, Result<Vec<T>, EventSourcingError>>
where
    T: Send + 'a,
    F: FnMut(Page) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Vec<T>, EventSourcingError>> + Send + 'a,
{
    let cursor = ReadCursor::new(filter);
    stream::try_unfold((cursor, fetch), move |(mut cursor, mut fetch)| async move {
        let Some(page) = cursor.next_page() else {
            return Ok(None);
        };
        let rows = fetch(page).await?;
        cursor.advance(&page, rows.len(), rows.last().map(version_of));
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some((rows, (cursor, fetch))))
    })
    .boxed()
}
