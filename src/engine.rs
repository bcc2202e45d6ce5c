//! Coordinator tying the components into one repeating cycle:
//! 1) detect and roll back reorgs,
//! 2) extend the header replica toward the remote head,
//! 3) advance every extraction job,
//! then wait for a new-block push or a poll timeout, whichever first.
use crate::block::BlockHeader;
use crate::jobs::{self, JobRegistry};
use crate::provider::ChainProvider;
use crate::reorg::{self, ReorgConfig, ReorgOutcome};
use crate::retry::Backoff;
use crate::store::Store;
use crate::sync::{self, SyncConfig, SyncOutcome};
use std::time::Duration;
use tracing::{debug, info};

/// Default poll fallback when no push notification arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Coordinator tuning. All fields have working defaults.
#[derive(Clone, Debug)]
pub struct Config {
    /// Cap on headers appended per sync pass.
    pub max_batch_size: u64,
    /// Concurrent header fetches per sync batch.
    pub fetch_concurrency: usize,
    /// Merge-base search depth; a deeper reorg is fatal.
    pub max_reorg_depth: u64,
    /// Wait timeout between cycles with no pending work.
    pub poll_interval: Duration,
    /// Retry policy for all provider calls.
    pub backoff: Backoff,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: sync::DEFAULT_MAX_BATCH_SIZE,
            fetch_concurrency: sync::DEFAULT_FETCH_CONCURRENCY,
            max_reorg_depth: reorg::DEFAULT_MAX_REORG_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::default(),
        }
    }
}

/// Result of one coordinator cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Re-enter immediately instead of waiting: a batch was clamped, a race
    /// was detected, or a job failed.
    pub more_work: bool,
}

/// The coordinator. `S` = store, `P` = chain provider.
///
/// Single-threaded and cooperative: no two steps of a cycle overlap, and the
/// only internal parallelism is the bounded header fetch inside the
/// synchronizer.
pub struct Marea<S, P> {
    store: S,
    provider: P,
    jobs: JobRegistry,
    config: Config,
}

impl<S, P> Marea<S, P>
where
    S: Store + 'static,
    P: ChainProvider + 'static,
{
    /// Create a coordinator with default [`Config`].
    pub fn new(store: S, provider: P, jobs: JobRegistry) -> Self {
        Self {
            store,
            provider,
            jobs,
            config: Config::default(),
        }
    }

    /// Replace the tuning configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The chain provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The job registry.
    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Seed historical headers from a bulk archival source before live
    /// tracking takes over. Same contract as [`Store::append_headers`].
    pub async fn seed_headers(&self, headers: Vec<BlockHeader>) -> anyhow::Result<()> {
        self.store.append_headers(headers).await
    }

    /// Ensure every registered job has its cursor row and private tables.
    pub async fn register_jobs(&self) -> anyhow::Result<()> {
        jobs::register_jobs(&self.store, &self.jobs).await
    }

    /// Run one cycle: reorg check, header sync, job application.
    ///
    /// `Err` means a fatal condition (invariant violation, deep reorg,
    /// storage failure); recoverable races come back as `more_work = true`.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleOutcome> {
        let reorg_cfg = ReorgConfig {
            max_reorg_depth: self.config.max_reorg_depth,
            backoff: self.config.backoff,
        };
        match reorg::check_reorg(&self.store, &self.provider, &self.jobs, &reorg_cfg).await? {
            ReorgOutcome::Retry => return Ok(CycleOutcome { more_work: true }),
            ReorgOutcome::RolledBack {
                first_bad_height,
                blocks_discarded,
            } => {
                info!(first_bad_height, blocks_discarded, "reorg handled");
            }
            ReorgOutcome::Clean => {}
        }

        let sync_cfg = SyncConfig {
            max_batch_size: self.config.max_batch_size,
            fetch_concurrency: self.config.fetch_concurrency,
            backoff: self.config.backoff,
        };
        let more_blocks = match sync::sync_headers(&self.store, &self.provider, &sync_cfg).await? {
            SyncOutcome::Retry => return Ok(CycleOutcome { more_work: true }),
            SyncOutcome::Synced { more_blocks, .. } => more_blocks,
        };

        let Some(head) = self.store.latest_head().await? else {
            return Ok(CycleOutcome {
                more_work: more_blocks,
            });
        };
        let applied = jobs::apply_jobs(&self.store, &self.jobs, &head).await?;

        Ok(CycleOutcome {
            more_work: more_blocks || applied.needs_retry(),
        })
    }

    /// Run cycles forever, waiting between idle cycles on whichever comes
    /// first: a pushed head height or the poll timeout.
    ///
    /// Returns only on a fatal error; normal teardown is process shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.register_jobs().await?;
        let mut heights = self.provider.height_updates();
        loop {
            let outcome = self.run_cycle().await?;
            if outcome.more_work {
                continue;
            }
            tokio::select! {
                changed = heights.changed() => {
                    if changed.is_err() {
                        // Push side gone; fall back to pure polling.
                        tokio::time::sleep(self.config.poll_interval).await;
                    } else {
                        debug!(height = *heights.borrow_and_update(), "woken by new block");
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    debug!("poll interval elapsed");
                }
            }
        }
    }
}
