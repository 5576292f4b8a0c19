//! Admin command handlers.

use std::io::Write;

use futures::TryStreamExt;
use tracing::info;

use eventide_core::store::EventStore;
use eventide_event_store::Stores;

use crate::cli::DumpArgs;
use crate::error::AdminError;

/// Provisions the default collections and those of `pool`, printing one
/// collection name per line.
///
/// # Errors
///
/// Returns `AdminError::Store` if a collection cannot be created.
pub async fn provision(
    stores: &Stores,
    pool: Option<&str>,
    out: &mut impl Write,
) -> Result<(), AdminError> {
    let mut collections = vec![stores.events.start().await?, stores.snapshots.start().await?];
    if pool.is_some() {
        collections.push(stores.events.ensure_collection(pool).await?);
        collections.push(stores.snapshots.ensure_collection(pool).await?);
    }
    for collection in &collections {
        writeln!(out, "{collection}")?;
    }
    info!(count = collections.len(), "provisioned collections");
    Ok(())
}

/// Streams the envelopes selected by `args` to `out`, one JSON document per
/// line. Returns the number of envelopes written.
///
/// # Errors
///
/// Returns `AdminError::Store` if reading fails and `AdminError::Output` if
/// writing fails; envelopes already written stay written.
pub async fn dump(
    events: &dyn EventStore,
    args: &DumpArgs,
    pool: Option<&str>,
    out: &mut impl Write,
) -> Result<usize, AdminError> {
    let stream = args.stream();
    let mut chunks = events.get_envelopes(&stream, args.filter(pool));
    let mut written = 0;
    while let Some(chunk) = chunks.try_next().await? {
        for envelope in &chunk {
            serde_json::to_writer(&mut *out, envelope)?;
            writeln!(out)?;
        }
        written += chunk.len();
    }
    out.flush()?;
    info!(stream_id = %stream, written, "dumped stream");
    Ok(written)
}
