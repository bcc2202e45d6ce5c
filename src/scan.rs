//! Safe/volatile log-query partitioner.
//!
//! Number-addressed log queries against heights near the remote head can
//! silently return data from a different fork if a reorg lands mid-query.
//! The partitioner queries the finalized tail by number range (cheap) and
//! every reorg-prone height by the exact block hash held in the local
//! replica, so a racing reorg surfaces as a provider error instead of wrong
//! data.
use crate::block::{BlockRange, LogEntry, LogFilter};
use crate::provider::ChainProvider;
use crate::retry::{with_backoff, Backoff};
use crate::store::Store;
use anyhow::Context;
use tracing::debug;

/// Default distance from the remote head below which heights count as safe.
pub const DEFAULT_SAFETY_MARGIN: u64 = 10;

/// Fetch all logs matching `filter` in `range`.
///
/// Heights at most `remote_head - safety_margin` are fetched with one
/// number-range query; the remainder is resolved to locally stored header
/// hashes and fetched one hash-addressed query per block. Every volatile
/// height must already be in the header replica (run header sync first).
///
/// Order is preserved within each sub-query but not across the boundary;
/// use [`crate::block::sort_logs`] for total order.
pub async fn scan_logs<S, P>(
    store: &S,
    provider: &P,
    filter: &LogFilter,
    range: BlockRange,
    safety_margin: u64,
    backoff: &Backoff,
) -> anyhow::Result<Vec<LogEntry>>
where
    S: Store + ?Sized,
    P: ChainProvider + ?Sized,
{
    let remote_head = with_backoff(backoff, "latest_header", || provider.latest_header()).await?;
    // None when the whole chain is younger than the margin: every height is
    // reorg-prone and must be queried by hash.
    let last_safe_block = remote_head.number.checked_sub(safety_margin);

    let mut out = Vec::new();

    if let Some(last_safe_block) = last_safe_block {
        let safe_max = range.max.min(last_safe_block);
        if range.min <= safe_max {
            let mut logs = with_backoff(backoff, "logs_in_range", || {
                provider.logs_in_range(filter, range.min, safe_max)
            })
            .await?;
            debug!(min = range.min, max = safe_max, count = logs.len(), "safe range scanned");
            out.append(&mut logs);
        }
    }

    let volatile_min = match last_safe_block {
        Some(last_safe_block) => range.min.max(last_safe_block + 1),
        None => range.min,
    };
    if volatile_min <= range.max {
        for number in volatile_min..=range.max {
            let header = store
                .header_by_number(number)
                .await?
                .with_context(|| {
                    format!("volatile block {number} not in local replica; sync headers first")
                })?;
            let mut logs = with_backoff(backoff, "logs_in_block", || {
                provider.logs_in_block(filter, &header.hash)
            })
            .await?;
            out.append(&mut logs);
        }
        debug!(min = volatile_min, max = range.max, "volatile range scanned by hash");
    }

    Ok(out)
}
