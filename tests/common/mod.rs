//! Shared test doubles: an in-memory store, a scriptable mock chain
//! provider, and a recording job.
#![allow(dead_code)]

use async_trait::async_trait;
use marea::provider::ProviderResult;
use marea::{
    BlockHash, BlockHeader, BlockRange, ChainError, ChainProvider, Job, LogEntry, LogFilter,
    ProviderError, Store, WriteBatch,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Deterministic hash for block `number` on fork `tag`.
pub fn test_hash(number: u64, tag: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[8..16].copy_from_slice(&number.to_be_bytes());
    bytes[31] = 1; // never the zero sentinel
    BlockHash::new(bytes)
}

/// Build a contiguous chain of `len` headers starting at height 0, fork `tag`.
pub fn chain_headers(len: u64, tag: u8) -> Vec<BlockHeader> {
    let mut out: Vec<BlockHeader> = Vec::with_capacity(len as usize);
    for number in 0..len {
        let parent_hash = if number == 0 {
            BlockHash::ZERO
        } else {
            out[number as usize - 1].hash
        };
        out.push(BlockHeader {
            hash: test_hash(number, tag),
            parent_hash,
            number,
            timestamp: 1_700_000_000 + number,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// In-memory store

#[derive(Default)]
struct MemInner {
    headers: BTreeMap<u64, BlockHeader>,
    cursors: HashMap<usize, i64>,
    commits: Vec<CommittedStep>,
}

/// One recorded `commit_job_step`.
#[derive(Clone, Debug)]
pub struct CommittedStep {
    pub job_id: usize,
    pub last_block: i64,
    pub sql: Vec<String>,
}

/// In-memory [`Store`] enforcing the same integrity rules as the SQLite one.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed headers without going through `append_headers` checks.
    pub async fn seeded(headers: Vec<BlockHeader>) -> Self {
        let store = Self::new();
        store.append_headers(headers).await.unwrap();
        store
    }

    pub fn commits(&self) -> Vec<CommittedStep> {
        self.inner.lock().unwrap().commits.clone()
    }

    pub fn set_cursor(&self, job_id: usize, cursor: i64) {
        self.inner.lock().unwrap().cursors.insert(job_id, cursor);
    }

    pub fn header_numbers(&self) -> Vec<u64> {
        self.inner.lock().unwrap().headers.keys().copied().collect()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn latest_head(&self) -> anyhow::Result<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.headers.values().next_back().cloned())
    }

    async fn contains(&self, hash: &BlockHash) -> anyhow::Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.headers.values().any(|h| h.hash == *hash))
    }

    async fn header_by_number(&self, number: u64) -> anyhow::Result<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.headers.get(&number).cloned())
    }

    async fn headers_since(&self, min_number: u64) -> anyhow::Result<Vec<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .headers
            .range(min_number..)
            .rev()
            .map(|(_, h)| h.clone())
            .collect())
    }

    async fn append_headers(&self, headers: Vec<BlockHeader>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mut staged: Vec<BlockHeader> = Vec::new();
        for header in headers {
            let seen = |hash: &BlockHash| {
                inner.headers.values().any(|h| h.hash == *hash)
                    || staged.iter().any(|h| h.hash == *hash)
            };
            if seen(&header.hash) {
                continue;
            }
            if header.number == 0 {
                if !header.parent_hash.is_zero() {
                    return Err(ChainError::GenesisParent {
                        parent: header.parent_hash,
                    }
                    .into());
                }
            } else if !seen(&header.parent_hash) {
                return Err(ChainError::UnknownParent {
                    number: header.number,
                    parent: header.parent_hash,
                }
                .into());
            }
            staged.push(header);
        }
        for header in staged {
            inner.headers.insert(header.number, header);
        }
        Ok(())
    }

    async fn remove_header(&self, hash: &BlockHash) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let number = inner
            .headers
            .iter()
            .find(|(_, h)| h.hash == *hash)
            .map(|(n, _)| *n);
        match number {
            Some(n) => {
                inner.headers.remove(&n);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn job_cursor(&self, job_id: usize) -> anyhow::Result<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.cursors.get(&job_id).copied())
    }

    async fn commit_job_step(
        &self,
        job_id: usize,
        last_block: i64,
        writes: WriteBatch,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.cursors.insert(job_id, last_block);
        inner.commits.push(CommittedStep {
            job_id,
            last_block,
            sql: writes.statements().iter().map(|s| s.sql.clone()).collect(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock chain provider

struct ChainInner {
    blocks: Vec<BlockHeader>,
    logs: HashMap<BlockHash, Vec<LogEntry>>,
    hidden: HashSet<BlockHash>,
    /// Heights above this answer `None` from `header_by_number` even though
    /// `latest_header` still advertises the full head (fetch-race simulation).
    missing_above: Option<u64>,
    range_queries: Vec<(u64, u64)>,
    hash_queries: Vec<BlockHash>,
}

/// Scriptable canonical chain. Cloning shares the underlying chain, so tests
/// can reorganize it while the coordinator holds a handle.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Mutex<ChainInner>>,
    height_tx: Arc<watch::Sender<u64>>,
}

impl MockChain {
    pub fn with_blocks(len: u64) -> Self {
        Self::with_chain(chain_headers(len, b'a'))
    }

    pub fn with_chain(blocks: Vec<BlockHeader>) -> Self {
        let head = blocks.last().map_or(0, |h| h.number);
        let (height_tx, _) = watch::channel(head);
        Self {
            inner: Arc::new(Mutex::new(ChainInner {
                blocks,
                logs: HashMap::new(),
                hidden: HashSet::new(),
                missing_above: None,
                range_queries: Vec::new(),
                hash_queries: Vec::new(),
            })),
            height_tx: Arc::new(height_tx),
        }
    }

    pub fn head(&self) -> BlockHeader {
        self.inner.lock().unwrap().blocks.last().unwrap().clone()
    }

    pub fn header_at(&self, number: u64) -> BlockHeader {
        self.inner.lock().unwrap().blocks[number as usize].clone()
    }

    /// Append `count` blocks on fork `tag`.
    pub fn extend(&self, count: u64, tag: u8) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            let parent = inner.blocks.last().unwrap();
            let number = parent.number + 1;
            let header = BlockHeader {
                hash: test_hash(number, tag),
                parent_hash: parent.hash,
                number,
                timestamp: 1_700_000_000 + number,
            };
            inner.blocks.push(header);
        }
    }

    /// Replace all blocks at `height` and above with `count` fresh blocks on
    /// fork `tag`.
    pub fn reorg_from(&self, height: u64, count: u64, tag: u8) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.blocks.truncate(height as usize);
        }
        self.extend(count, tag);
    }

    /// Push the current head height to subscribers.
    pub fn announce(&self) {
        let head = self.head().number;
        let _ = self.height_tx.send(head);
    }

    pub fn hide(&self, hash: BlockHash) {
        self.inner.lock().unwrap().hidden.insert(hash);
    }

    pub fn set_missing_above(&self, height: u64) {
        self.inner.lock().unwrap().missing_above = Some(height);
    }

    pub fn add_log(&self, number: u64, log_index: u32) {
        let mut inner = self.inner.lock().unwrap();
        let block = inner.blocks[number as usize].clone();
        let entry = LogEntry {
            block_hash: block.hash,
            block_number: number,
            log_index,
            address: vec![0xaa],
            topics: vec![[0x11; 32]],
            data: number.to_be_bytes().to_vec(),
        };
        inner.logs.entry(block.hash).or_default().push(entry);
    }

    pub fn range_queries(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().range_queries.clone()
    }

    pub fn hash_queries(&self) -> Vec<BlockHash> {
        self.inner.lock().unwrap().hash_queries.clone()
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn latest_header(&self) -> ProviderResult<BlockHeader> {
        let inner = self.inner.lock().unwrap();
        inner
            .blocks
            .last()
            .cloned()
            .ok_or_else(|| ProviderError::Rpc("empty chain".into()))
    }

    async fn header_by_number(&self, number: u64) -> ProviderResult<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        if inner.missing_above.is_some_and(|cap| number > cap) {
            return Ok(None);
        }
        Ok(inner.blocks.get(number as usize).cloned())
    }

    async fn header_by_hash(&self, hash: &BlockHash) -> ProviderResult<Option<BlockHeader>> {
        let inner = self.inner.lock().unwrap();
        if inner.hidden.contains(hash) {
            return Ok(None);
        }
        Ok(inner.blocks.iter().find(|h| h.hash == *hash).cloned())
    }

    async fn logs_in_range(
        &self,
        _filter: &LogFilter,
        min_block: u64,
        max_block: u64,
    ) -> ProviderResult<Vec<LogEntry>> {
        let mut inner = self.inner.lock().unwrap();
        inner.range_queries.push((min_block, max_block));
        let mut out = Vec::new();
        for number in min_block..=max_block {
            if let Some(block) = inner.blocks.get(number as usize) {
                if let Some(logs) = inner.logs.get(&block.hash) {
                    out.extend(logs.iter().cloned());
                }
            }
        }
        Ok(out)
    }

    async fn logs_in_block(
        &self,
        _filter: &LogFilter,
        block: &BlockHash,
    ) -> ProviderResult<Vec<LogEntry>> {
        let mut inner = self.inner.lock().unwrap();
        inner.hash_queries.push(*block);
        if !inner.blocks.iter().any(|h| h.hash == *block) {
            // A hash-addressed query against a chain that moved on fails
            // loudly, mirroring real providers.
            return Err(ProviderError::Rpc(format!("unknown block hash {block}")));
        }
        Ok(inner.logs.get(block).cloned().unwrap_or_default())
    }

    fn height_updates(&self) -> watch::Receiver<u64> {
        self.height_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Recording job

/// Job that records every `up`/`down` invocation and queues a statement per
/// call so commit contents can be asserted.
pub struct RecordingJob {
    name: String,
    start: u64,
    batch: u64,
    pub fail_up: AtomicBool,
    pub ups: Mutex<Vec<(u64, u64)>>,
    pub downs: Mutex<Vec<u64>>,
}

impl RecordingJob {
    pub fn new(name: &str, start: u64, batch: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            start,
            batch,
            fail_up: AtomicBool::new(false),
            ups: Mutex::new(Vec::new()),
            downs: Mutex::new(Vec::new()),
        })
    }

    pub fn ups(&self) -> Vec<(u64, u64)> {
        self.ups.lock().unwrap().clone()
    }

    pub fn downs(&self) -> Vec<u64> {
        self.downs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Job for RecordingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_block(&self) -> u64 {
        self.start
    }

    fn block_batch_size(&self) -> u64 {
        self.batch
    }

    fn schema(&self) -> Vec<String> {
        vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (block INTEGER NOT NULL, payload BLOB)",
            self.name
        )]
    }

    async fn up(&self, writes: &mut WriteBatch, range: BlockRange) -> anyhow::Result<()> {
        if self.fail_up.load(Ordering::SeqCst) {
            anyhow::bail!("injected failure");
        }
        self.ups.lock().unwrap().push((range.min, range.max));
        for number in range.min..=range.max {
            writes.execute(
                format!("INSERT INTO {} (block, payload) VALUES (?1, ?2)", self.name),
                vec![number.into(), number.to_be_bytes().to_vec().into()],
            );
        }
        Ok(())
    }

    async fn down(&self, writes: &mut WriteBatch, block: &BlockHeader) -> anyhow::Result<()> {
        self.downs.lock().unwrap().push(block.number);
        writes.execute(
            format!("DELETE FROM {} WHERE block = ?1", self.name),
            vec![block.number.into()],
        );
        Ok(())
    }
}
