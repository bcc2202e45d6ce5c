//! Ledger primitives shared across the crate: block identifiers, headers,
//! inclusive block ranges, and event-log types.
use std::fmt;
use std::str::FromStr;

/// 32-byte block identifier.
///
/// The all-zero value is a sentinel: it is the `parent_hash` of the genesis
/// block and never identifies a real block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// The all-zero sentinel (genesis parent).
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "BlockHash({}..)", &hex::encode(&self.0[..4]))
    }
}

impl FromStr for BlockHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| anyhow::anyhow!("expected 32 bytes, got {}", v.len()))?;
        Ok(Self(arr))
    }
}

/// One block of the canonical chain the replica has accepted.
///
/// Never updated in place: headers are appended at the head and removed from
/// the head backward during rollback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Unique block identifier.
    pub hash: BlockHash,
    /// Parent block identifier; [`BlockHash::ZERO`] for the genesis block.
    pub parent_hash: BlockHash,
    /// Height. Stored heights form a gap-free prefix `0..=head`.
    pub number: u64,
    /// Block timestamp (seconds).
    pub timestamp: u64,
}

/// Inclusive block-number range `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    /// First height in the range.
    pub min: u64,
    /// Last height in the range (inclusive).
    pub max: u64,
}

#[allow(clippy::len_without_is_empty)] // ranges are non-empty by construction
impl BlockRange {
    /// Build a range; `min` must not exceed `max`.
    pub fn new(min: u64, max: u64) -> Self {
        debug_assert!(min <= max, "inverted block range {min}..={max}");
        Self { min, max }
    }

    /// Number of blocks covered. Never zero.
    pub fn len(&self) -> u64 {
        self.max - self.min + 1
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// One event-log entry returned by the chain provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Hash of the block containing the log.
    pub block_hash: BlockHash,
    /// Height of the block containing the log.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u32,
    /// Emitting account/contract, ledger-specific encoding.
    pub address: Vec<u8>,
    /// Indexed topics.
    pub topics: Vec<[u8; 32]>,
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// Log-query filter, interpreted by the chain provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Restrict to logs emitted by this account, if set.
    pub address: Option<Vec<u8>>,
    /// Restrict to logs whose first topic matches, if set.
    pub topic0: Option<[u8; 32]>,
}

/// Sort logs into total (block number, log index) order.
///
/// Useful after [`crate::scan::scan_logs`], which only guarantees order
/// within each sub-query.
pub fn sort_logs(logs: &mut [LogEntry]) {
    logs.sort_by_key(|l| (l.block_number, l.log_index));
}
