#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! marea: a reorg-safe local replica of an append-only ledger, plus a set of
//! pluggable extraction jobs deriving application tables from it.
//!
//! ## What you implement
//! - [`ChainProvider`]: fetch headers and event logs from the remote chain.
//! - [`Job`]: derive rows from a block range (`up`) and undo one discarded
//!   block (`down`).
//! - [`Store`]: the header replica and per-job cursors (a SQLite
//!   implementation ships behind the `store-sqlite` feature).
//!
//! ## What the coordinator does
//! - Detects when the remote chain has rewritten recent history, finds the
//!   last common ancestor, and rolls the replica and every job back past the
//!   divergence, newest block first.
//! - Extends the header replica in bounded, contiguity-verified batches.
//! - Advances each job's cursor over bounded ranges, committing the job's
//!   private-table writes and the cursor move in one transaction.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use marea::prelude::*;
//! use std::sync::Arc;
//!
//! struct TransferJob;
//!
//! #[async_trait::async_trait]
//! impl Job for TransferJob {
//!     fn name(&self) -> &str { "transfers" }
//!     fn schema(&self) -> Vec<String> {
//!         vec!["CREATE TABLE IF NOT EXISTS transfers (block INTEGER, body BLOB)".into()]
//!     }
//!     async fn up(&self, writes: &mut WriteBatch, range: BlockRange) -> anyhow::Result<()> {
//!         // fetch logs (see marea::scan::scan_logs), decode, queue inserts
//!         writes.execute(
//!             "INSERT INTO transfers (block, body) VALUES (?1, ?2)",
//!             vec![range.min.into(), Vec::<u8>::new().into()],
//!         );
//!         Ok(())
//!     }
//!     async fn down(&self, writes: &mut WriteBatch, block: &BlockHeader) -> anyhow::Result<()> {
//!         writes.execute("DELETE FROM transfers WHERE block = ?1", vec![block.number.into()]);
//!         Ok(())
//!     }
//! }
//!
//! async fn run(provider: impl ChainProvider + 'static) -> anyhow::Result<()> {
//!     let store = SqliteStore::new("replica.db")?;
//!     let jobs = JobRegistry::new(vec![Arc::new(TransferJob)]);
//!     Marea::new(store, provider, jobs).run().await
//! }
//! ```

/// Ledger primitives: hashes, headers, ranges, logs.
pub mod block;

/// Coordinator loop tying detection, sync, and job application together.
pub mod engine;

/// Fatal error conditions.
pub mod error;

/// The `Job` trait, registry, and application engine.
pub mod jobs;

/// Remote chain provider abstraction.
pub mod provider;

/// Reorg detection and rollback.
pub mod reorg;

/// Bounded-backoff retry wrapper for provider calls.
pub mod retry;

/// Safe/volatile log-query partitioner.
pub mod scan;

/// Persistence layer (traits and SQLite implementation).
pub mod store;

/// Header synchronizer.
pub mod sync;

// Public re-exports
pub use block::{sort_logs, BlockHash, BlockHeader, BlockRange, LogEntry, LogFilter};
pub use engine::{Config, CycleOutcome, Marea};
pub use error::ChainError;
pub use jobs::{Job, JobRegistry};
pub use provider::{ChainProvider, ProviderError};
pub use retry::Backoff;
pub use store::{SqlValue, Store, WriteBatch};

#[cfg(feature = "store-sqlite")]
pub use store::sqlite_store::SqliteStore;

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{
        BlockHash, BlockHeader, BlockRange, ChainProvider, Config, Job, JobRegistry, LogEntry,
        LogFilter, Marea, ProviderError, SqlValue, Store, WriteBatch,
    };

    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
}
