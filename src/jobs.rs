//! Extraction jobs: the `Job` trait, the fixed positional registry, and the
//! application engine that advances each job's cursor toward the local head.
use crate::block::{BlockHeader, BlockRange};
use crate::store::{Store, WriteBatch};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Default number of blocks a job advances per cycle.
pub const DEFAULT_BLOCK_BATCH: u64 = 100;

/// One pluggable extraction job deriving application tables from the ledger.
///
/// Jobs never touch their cursor or the header replica directly: they queue
/// private-table statements on the [`WriteBatch`] and the engine commits
/// those together with the cursor move in one transaction. `up()` over a
/// range that failed to commit will be re-invoked with the same range next
/// cycle; a successfully committed range is never re-applied.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable human-readable name, for logs.
    fn name(&self) -> &str;

    /// First block this job cares about.
    fn start_block(&self) -> u64 {
        0
    }

    /// Upper bound on blocks handled per `up()` call.
    fn block_batch_size(&self) -> u64 {
        DEFAULT_BLOCK_BATCH
    }

    /// DDL for the job's private tables, executed once at registration.
    /// Statements should be `IF NOT EXISTS`-safe.
    fn schema(&self) -> Vec<String> {
        Vec::new()
    }

    /// Derive and queue the writes for `range` (both bounds inclusive).
    async fn up(&self, writes: &mut WriteBatch, range: BlockRange) -> anyhow::Result<()>;

    /// Undo whatever `up()` derived from `block`, which is being discarded
    /// by a reorg. Invoked once per block, newest first.
    async fn down(&self, writes: &mut WriteBatch, block: &BlockHeader) -> anyhow::Result<()>;
}

/// Fixed, ordered set of jobs. The job id is the position in this list and
/// must never be reassigned; append new jobs at the end.
///
/// Built once at startup and passed by reference into the coordinator.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Vec<Arc<dyn Job>>,
}

impl JobRegistry {
    /// Build a registry from an ordered job list.
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        Self { jobs }
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Iterate `(job_id, job)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<dyn Job>)> {
        self.jobs.iter().enumerate()
    }

    /// Job by positional id.
    pub fn get(&self, job_id: usize) -> Option<&Arc<dyn Job>> {
        self.jobs.get(job_id)
    }
}

/// Result of one [`apply_jobs`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Some job was clamped by its batch size and has more blocks pending.
    pub more_jobs: bool,
    /// Jobs whose `up()` failed this pass; their cursors are unchanged.
    pub failed_jobs: usize,
}

impl ApplyOutcome {
    /// Whether the outer loop should re-enter without waiting.
    pub fn needs_retry(&self) -> bool {
        self.more_jobs || self.failed_jobs > 0
    }
}

/// Ensure every job has a cursor row and its private tables exist.
///
/// Newly seen jobs get `last_block = start_block - 1` ("not yet started"),
/// committed atomically with their schema DDL. Already-registered jobs are
/// left untouched.
pub async fn register_jobs<S>(store: &S, registry: &JobRegistry) -> anyhow::Result<()>
where
    S: Store + ?Sized,
{
    for (job_id, job) in registry.iter() {
        if store.job_cursor(job_id).await?.is_some() {
            continue;
        }
        let mut ddl = WriteBatch::new();
        for sql in job.schema() {
            ddl.execute(sql, Vec::new());
        }
        let initial = job.start_block() as i64 - 1;
        store
            .commit_job_step(job_id, initial, ddl)
            .await
            .with_context(|| format!("register job {:?}", job.name()))?;
        debug!(job = job.name(), job_id, cursor = initial, "job registered");
    }
    Ok(())
}

/// Advance every job's cursor toward `head`, one bounded range per job.
///
/// A job whose `up()` fails is logged and skipped; its cursor stays put and
/// the remaining jobs still run. Any failure makes the overall outcome
/// request a retry, so the outer loop re-enters immediately even though the
/// successful jobs already committed. A perpetually failing job therefore
/// keeps the loop from ever reaching its wait state; see DESIGN.md.
pub async fn apply_jobs<S>(
    store: &S,
    registry: &JobRegistry,
    head: &BlockHeader,
) -> anyhow::Result<ApplyOutcome>
where
    S: Store + ?Sized,
{
    let mut outcome = ApplyOutcome::default();
    for (job_id, job) in registry.iter() {
        let cursor = store
            .job_cursor(job_id)
            .await?
            .with_context(|| format!("job {:?} has no cursor row; call register_jobs first", job.name()))?;
        if cursor >= head.number as i64 {
            continue;
        }

        let min_block = (cursor + 1) as u64;
        let span = job.block_batch_size().max(1);
        let max_block = head.number.min(min_block + span - 1);
        if max_block < head.number {
            outcome.more_jobs = true;
        }
        let range = BlockRange::new(min_block, max_block);

        let mut writes = WriteBatch::new();
        match job.up(&mut writes, range).await {
            Ok(()) => {
                store.commit_job_step(job_id, max_block as i64, writes).await?;
                debug!(job = job.name(), %range, "job advanced");
            }
            Err(err) => {
                error!(job = job.name(), %range, error = ?err, "job up() failed; cursor unchanged");
                outcome.failed_jobs += 1;
            }
        }
    }
    Ok(outcome)
}
