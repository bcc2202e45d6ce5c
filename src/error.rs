//! Fatal error conditions surfaced to the operator.
//!
//! Transient provider failures never reach this type (the retry wrapper
//! absorbs them), and recoverable races are reported as `Retry` outcomes in
//! `Ok` variants. Anything here stops the coordinator.
use crate::block::BlockHash;
use thiserror::Error;

/// Invariant violations and unrecoverable divergence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The remote chain no longer has a block at a height the replica has
    /// already recorded. The remote chain is assumed never to shrink.
    #[error("remote chain has no block at recorded height {height}")]
    RemotePeerMissing {
        /// Height of the local head that went missing remotely.
        height: u64,
    },

    /// The merge-base walk exhausted its depth budget without finding a
    /// common ancestor. Not handled automatically: silently accepting a
    /// deeper rewrite risks corrupting every derived table.
    #[error("no common ancestor within {max_depth} blocks of local head {local_head}")]
    ReorgTooDeep {
        /// Height of the local head when detection started.
        local_head: u64,
        /// Configured search depth that was exhausted.
        max_depth: u64,
    },

    /// A job's cursor is above a block being rolled back. Cursors retreat in
    /// lockstep with header deletion, so this state is unreachable without a
    /// programmer or data error.
    #[error("job {job:?} cursor {cursor} is ahead of block {block} being rolled back")]
    JobAheadOfRollback {
        /// Offending job name.
        job: String,
        /// The job's persisted cursor.
        cursor: i64,
        /// Height of the block being discarded.
        block: u64,
    },

    /// A height-0 header carried a non-zero parent hash.
    #[error("genesis header parent must be the zero hash, got {parent}")]
    GenesisParent {
        /// The rejected parent hash.
        parent: BlockHash,
    },

    /// A non-genesis header referenced a parent the store does not hold.
    #[error("header at height {number} references unknown parent {parent}")]
    UnknownParent {
        /// Height of the rejected header.
        number: u64,
        /// The missing parent hash.
        parent: BlockHash,
    },
}
