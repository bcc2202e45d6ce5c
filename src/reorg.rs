//! Reorg detection and rollback.
//!
//! Detection compares the local head against the remote chain at the same
//! height and, on divergence, walks the remote chain backward to the last
//! common ancestor. Rollback then discards every local block above that
//! ancestor, unwinding job state newest block first.
use crate::error::ChainError;
use crate::jobs::JobRegistry;
use crate::provider::ChainProvider;
use crate::retry::{with_backoff, Backoff};
use crate::store::{Store, WriteBatch};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Default bound on how far back the merge-base walk searches.
pub const DEFAULT_MAX_REORG_DEPTH: u64 = 20;

/// Tuning for [`check_reorg`].
#[derive(Clone, Debug)]
pub struct ReorgConfig {
    /// Merge-base search depth; exceeding it is fatal.
    pub max_reorg_depth: u64,
    /// Retry policy for provider calls.
    pub backoff: Backoff,
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self {
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
            backoff: Backoff::default(),
        }
    }
}

/// Result of one detection pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReorgOutcome {
    /// Local chain is still a prefix of the remote chain.
    Clean,
    /// Divergence found and rolled back; header sync may now extend again.
    RolledBack {
        /// Lowest height that was discarded.
        first_bad_height: u64,
        /// Number of headers deleted.
        blocks_discarded: u64,
    },
    /// A needed remote block disappeared mid-walk; restart detection.
    Retry,
}

/// Compare the local head to the remote chain and roll back if they diverge.
///
/// Fatal outcomes, surfaced as [`ChainError`]: the remote chain missing a
/// height the replica has recorded, and divergence deeper than
/// `max_reorg_depth`.
pub async fn check_reorg<S, P>(
    store: &S,
    provider: &P,
    registry: &JobRegistry,
    cfg: &ReorgConfig,
) -> anyhow::Result<ReorgOutcome>
where
    S: Store + ?Sized,
    P: ChainProvider + ?Sized,
{
    let Some(local_head) = store.latest_head().await? else {
        return Ok(ReorgOutcome::Clean);
    };

    let remote_peer = with_backoff(&cfg.backoff, "header_by_number", || {
        provider.header_by_number(local_head.number)
    })
    .await?
    .ok_or(ChainError::RemotePeerMissing {
        height: local_head.number,
    })?;

    if remote_peer.hash == local_head.hash {
        return Ok(ReorgOutcome::Clean);
    }

    warn!(
        height = local_head.number,
        local = %local_head.hash,
        remote = %remote_peer.hash,
        "local head diverges from remote chain"
    );

    // Walk the remote chain backward until an ancestor is already stored
    // locally. That ancestor is the merge base; everything above it is bad.
    let mut cursor = remote_peer;
    for _ in 0..cfg.max_reorg_depth {
        if cursor.number == 0 {
            // Divergence at genesis: the chains share no history at all.
            return Err(ChainError::ReorgTooDeep {
                local_head: local_head.number,
                max_depth: cfg.max_reorg_depth,
            }
            .into());
        }
        if store.contains(&cursor.parent_hash).await? {
            let first_bad_height = cursor.number;
            let blocks_discarded = rollback(store, registry, first_bad_height).await?;
            return Ok(ReorgOutcome::RolledBack {
                first_bad_height,
                blocks_discarded,
            });
        }
        let parent = with_backoff(&cfg.backoff, "header_by_hash", || {
            provider.header_by_hash(&cursor.parent_hash)
        })
        .await?;
        let Some(parent) = parent else {
            // The remote chain moved again while we were walking it.
            debug!(missing = %cursor.parent_hash, "ancestor unavailable mid-walk");
            return Ok(ReorgOutcome::Retry);
        };
        cursor = parent;
    }

    Err(ChainError::ReorgTooDeep {
        local_head: local_head.number,
        max_depth: cfg.max_reorg_depth,
    }
    .into())
}

/// Discard every stored block with `number >= first_bad_height`, unwinding
/// job state in lockstep.
///
/// Headers are processed highest first; a job cannot be rolled back past a
/// block while a later block it has processed still exists. For each doomed
/// block, every job whose cursor sits exactly on it gets `down()` plus a
/// one-block cursor decrement in a single transaction; jobs behind the block
/// are skipped; a job ahead of it is an invariant violation.
///
/// Returns the number of headers deleted.
pub async fn rollback<S>(
    store: &S,
    registry: &JobRegistry,
    first_bad_height: u64,
) -> anyhow::Result<u64>
where
    S: Store + ?Sized,
{
    let doomed = store.headers_since(first_bad_height).await?;
    for header in &doomed {
        for (job_id, job) in registry.iter() {
            let Some(cursor) = store.job_cursor(job_id).await? else {
                continue;
            };
            match cursor.cmp(&(header.number as i64)) {
                Ordering::Less => continue,
                Ordering::Greater => {
                    return Err(ChainError::JobAheadOfRollback {
                        job: job.name().to_string(),
                        cursor,
                        block: header.number,
                    }
                    .into());
                }
                Ordering::Equal => {
                    let mut writes = WriteBatch::new();
                    job.down(&mut writes, header).await?;
                    store
                        .commit_job_step(job_id, header.number as i64 - 1, writes)
                        .await?;
                    debug!(job = job.name(), block = header.number, "job unwound one block");
                }
            }
        }
        store.remove_header(&header.hash).await?;
    }
    info!(
        first_bad_height,
        blocks_discarded = doomed.len(),
        "orphaned blocks rolled back"
    );
    Ok(doomed.len() as u64)
}
