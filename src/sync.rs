//! Header synchronizer: extends the local replica toward the remote head in
//! bounded, contiguity-verified batches.
use crate::block::{BlockHash, BlockHeader};
use crate::provider::ChainProvider;
use crate::retry::{with_backoff, Backoff};
use crate::store::Store;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Default cap on headers appended per call.
pub const DEFAULT_MAX_BATCH_SIZE: u64 = 256;
/// Default number of header fetches in flight.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Tuning for [`sync_headers`].
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Cap on headers appended per call.
    pub max_batch_size: u64,
    /// Concurrent header fetches per batch.
    pub fetch_concurrency: usize,
    /// Retry policy for provider calls.
    pub backoff: Backoff,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            backoff: Backoff::default(),
        }
    }
}

/// Result of one synchronizer pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Headers were appended (possibly zero, when already at the remote head).
    Synced {
        /// Headers appended this pass.
        blocks_added: u64,
        /// The batch cap clamped the range; call again without waiting.
        more_blocks: bool,
    },
    /// A reorg raced the pass; run reorg detection and try again.
    Retry,
}

/// Extend the replica toward the remote head by at most one batch.
///
/// Fetches the missing headers with bounded concurrency (results are
/// reassembled in height order), verifies strict `parent_hash` chaining
/// against the local head, and appends the whole batch or none of it.
pub async fn sync_headers<S, P>(
    store: &S,
    provider: &P,
    cfg: &SyncConfig,
) -> anyhow::Result<SyncOutcome>
where
    S: Store + ?Sized,
    P: ChainProvider + ?Sized,
{
    let local_head = store.latest_head().await?;
    let remote_head = with_backoff(&cfg.backoff, "latest_header", || provider.latest_header()).await?;

    if let Some(local) = &local_head {
        if local.number == remote_head.number {
            if local.hash == remote_head.hash {
                return Ok(SyncOutcome::Synced {
                    blocks_added: 0,
                    more_blocks: false,
                });
            }
            // Same height, different hash: the chain already reorganized at
            // our head. Appending would corrupt the replica.
            debug!(height = local.number, "remote head hash differs at local height");
            return Ok(SyncOutcome::Retry);
        }
        if local.number > remote_head.number {
            // Remote briefly behind (restarted or load-balanced provider).
            debug!(local = local.number, remote = remote_head.number, "remote head behind local");
            return Ok(SyncOutcome::Retry);
        }
    }

    let min_block = local_head.as_ref().map_or(0, |h| h.number + 1);
    let mut max_block = remote_head.number;
    let mut more_blocks = false;
    let batch_end = min_block + cfg.max_batch_size.max(1) - 1;
    if max_block > batch_end {
        max_block = batch_end;
        more_blocks = true;
    }

    // Out-of-order fetch, in-order reassembly: `buffered` yields results in
    // stream order regardless of completion order.
    let fetched: Vec<Option<BlockHeader>> = stream::iter(min_block..=max_block)
        .map(|number| async move {
            with_backoff(&cfg.backoff, "header_by_number", || {
                provider.header_by_number(number)
            })
            .await
        })
        .buffered(cfg.fetch_concurrency.max(1))
        .try_collect()
        .await?;

    let mut batch: Vec<BlockHeader> = Vec::with_capacity(fetched.len());
    for (offset, header) in fetched.into_iter().enumerate() {
        let number = min_block + offset as u64;
        let Some(header) = header else {
            // The advertised head vanished under us mid-fetch.
            debug!(number, "header missing during batch fetch");
            return Ok(SyncOutcome::Retry);
        };
        let expected_parent = match batch.last() {
            Some(prev) => prev.hash,
            None => local_head.as_ref().map_or(BlockHash::ZERO, |h| h.hash),
        };
        if header.number != number || header.parent_hash != expected_parent {
            debug!(number, "non-contiguous header batch, discarding");
            return Ok(SyncOutcome::Retry);
        }
        batch.push(header);
    }

    let blocks_added = batch.len() as u64;
    store.append_headers(batch).await?;
    info!(blocks_added, more_blocks, head = max_block, "headers appended");
    Ok(SyncOutcome::Synced {
        blocks_added,
        more_blocks,
    })
}
