//! Persistence interfaces: the header replica, job cursors, and the
//! buffered write batches jobs use to mutate their private tables.
use crate::block::{BlockHash, BlockHeader};
use async_trait::async_trait;

/// A single SQL parameter value.
///
/// Kept separate from any concrete driver so jobs written against
/// [`WriteBatch`] work with every [`Store`] implementation.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<BlockHash> for SqlValue {
    fn from(v: BlockHash) -> Self {
        SqlValue::Blob(v.as_bytes().to_vec())
    }
}

/// One buffered statement of a [`WriteBatch`].
#[derive(Clone, Debug)]
pub struct BatchStatement {
    /// SQL text with positional placeholders.
    pub sql: String,
    /// Parameter values, in placeholder order.
    pub params: Vec<SqlValue>,
}

/// Buffered statements a job hands back from `up()`/`down()`.
///
/// Nothing is executed until the store commits the batch, together with the
/// job's cursor move, in one transaction. A crash before commit loses the
/// batch and the cursor stays put, so the same range is retried next cycle.
#[derive(Debug, Default)]
pub struct WriteBatch {
    stmts: Vec<BatchStatement>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one statement for execution at commit time.
    pub fn execute(&mut self, sql: impl Into<String>, params: Vec<SqlValue>) {
        self.stmts.push(BatchStatement {
            sql: sql.into(),
            params,
        });
    }

    /// Number of queued statements.
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Whether no statements are queued.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Queued statements, in execution order.
    pub fn statements(&self) -> &[BatchStatement] {
        &self.stmts
    }
}

/// Durable state: the block-header replica plus one cursor row per job.
///
/// Header contract:
/// - stored heights form a gap-free prefix `0..=head`, one header per height;
/// - `append_headers` is idempotent by hash and all-or-nothing: a genesis
///   header with a non-zero parent, or a non-genesis header whose parent is
///   neither stored nor earlier in the same batch, fails the whole call
///   ([`crate::ChainError::GenesisParent`] / [`crate::ChainError::UnknownParent`]);
/// - `headers_since` returns **descending** heights; rollback sequencing
///   depends on that order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Highest-numbered stored header, or `None` when the replica is empty.
    async fn latest_head(&self) -> anyhow::Result<Option<BlockHeader>>;

    /// Whether a header with this hash is stored.
    async fn contains(&self, hash: &BlockHash) -> anyhow::Result<bool>;

    /// Header at an exact height, if stored.
    async fn header_by_number(&self, number: u64) -> anyhow::Result<Option<BlockHeader>>;

    /// All stored headers with `number >= min_number`, descending by number.
    async fn headers_since(&self, min_number: u64) -> anyhow::Result<Vec<BlockHeader>>;

    /// Idempotent bulk insert of contiguous headers (see trait docs).
    async fn append_headers(&self, headers: Vec<BlockHeader>) -> anyhow::Result<()>;

    /// Delete one header; returns whether it existed.
    async fn remove_header(&self, hash: &BlockHash) -> anyhow::Result<bool>;

    /// A job's inclusive cursor, or `None` before registration.
    /// `start_block - 1` means "registered, not yet started".
    async fn job_cursor(&self, job_id: usize) -> anyhow::Result<Option<i64>>;

    /// Atomically execute `writes` and set the job's cursor to `last_block`,
    /// creating the cursor row if absent. Either both effects commit or
    /// neither is visible.
    async fn commit_job_step(
        &self,
        job_id: usize,
        last_block: i64,
        writes: WriteBatch,
    ) -> anyhow::Result<()>;
}

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
