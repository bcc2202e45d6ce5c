//! Embedded SQLite implementation of [`Store`].
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::PathBuf;
use tokio::task;

use crate::block::{BlockHash, BlockHeader};
use crate::error::ChainError;
use crate::store::{SqlValue, Store, WriteBatch};

/// File-backed SQLite store.
///
/// Tables:
///   headers(hash BLOB PRIMARY KEY, parent_hash BLOB, number INTEGER UNIQUE, timestamp INTEGER)
///   job_progress(job_id INTEGER PRIMARY KEY, last_block INTEGER)
///
/// Job-private tables are created by the jobs themselves through their DDL
/// batches; this store never inspects them.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS headers (
                hash        BLOB PRIMARY KEY,
                parent_hash BLOB NOT NULL,
                number      INTEGER NOT NULL UNIQUE,
                timestamp   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS job_progress (
                job_id     INTEGER PRIMARY KEY,
                last_block INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { path })
    }

    fn row_to_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Vec<u8>, Vec<u8>, u64, u64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn header_from_parts(parts: (Vec<u8>, Vec<u8>, u64, u64)) -> anyhow::Result<BlockHeader> {
        Ok(BlockHeader {
            hash: blob_to_hash(parts.0)?,
            parent_hash: blob_to_hash(parts.1)?,
            number: parts.2,
            timestamp: parts.3,
        })
    }

    fn hash_exists(conn: &Connection, hash: &BlockHash) -> anyhow::Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM headers WHERE hash = ?1",
                params![hash.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn run_batch(conn: &Connection, writes: &WriteBatch) -> anyhow::Result<()> {
        for stmt in writes.statements() {
            conn.execute(
                &stmt.sql,
                params_from_iter(stmt.params.iter().map(to_rusqlite)),
            )
            .with_context(|| format!("job write: {}", stmt.sql))?;
        }
        Ok(())
    }
}

fn blob_to_hash(blob: Vec<u8>) -> anyhow::Result<BlockHash> {
    let arr: [u8; 32] = blob
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("stored hash has {} bytes, expected 32", v.len()))?;
    Ok(BlockHash::new(arr))
}

fn to_rusqlite(v: &SqlValue) -> rusqlite::types::Value {
    match v {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(i) => rusqlite::types::Value::Integer(*i),
        SqlValue::Real(f) => rusqlite::types::Value::Real(*f),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
        SqlValue::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn latest_head(&self) -> anyhow::Result<Option<BlockHeader>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let parts = conn
                .query_row(
                    "SELECT hash, parent_hash, number, timestamp FROM headers
                     ORDER BY number DESC LIMIT 1",
                    [],
                    Self::row_to_header,
                )
                .optional()?;
            parts.map(Self::header_from_parts).transpose()
        })
        .await?
    }

    async fn contains(&self, hash: &BlockHash) -> anyhow::Result<bool> {
        let path = self.path.clone();
        let hash = *hash;
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            Self::hash_exists(&conn, &hash)
        })
        .await?
    }

    async fn header_by_number(&self, number: u64) -> anyhow::Result<Option<BlockHeader>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let parts = conn
                .query_row(
                    "SELECT hash, parent_hash, number, timestamp FROM headers WHERE number = ?1",
                    params![number],
                    Self::row_to_header,
                )
                .optional()?;
            parts.map(Self::header_from_parts).transpose()
        })
        .await?
    }

    async fn headers_since(&self, min_number: u64) -> anyhow::Result<Vec<BlockHeader>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare(
                "SELECT hash, parent_hash, number, timestamp FROM headers
                 WHERE number >= ?1 ORDER BY number DESC",
            )?;
            let rows = stmt.query_map(params![min_number], Self::row_to_header)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(Self::header_from_parts(row?)?);
            }
            Ok(out)
        })
        .await?
    }

    async fn append_headers(&self, headers: Vec<BlockHeader>) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let tx = conn.unchecked_transaction()?;
            for header in &headers {
                if Self::hash_exists(&conn, &header.hash)? {
                    continue;
                }
                if header.number == 0 {
                    if !header.parent_hash.is_zero() {
                        return Err(ChainError::GenesisParent {
                            parent: header.parent_hash,
                        }
                        .into());
                    }
                } else if !Self::hash_exists(&conn, &header.parent_hash)? {
                    return Err(ChainError::UnknownParent {
                        number: header.number,
                        parent: header.parent_hash,
                    }
                    .into());
                }
                conn.execute(
                    "INSERT INTO headers (hash, parent_hash, number, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        header.hash.as_bytes().to_vec(),
                        header.parent_hash.as_bytes().to_vec(),
                        header.number,
                        header.timestamp
                    ],
                )
                .with_context(|| format!("insert header @{}", header.number))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn remove_header(&self, hash: &BlockHash) -> anyhow::Result<bool> {
        let path = self.path.clone();
        let hash = *hash;
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let n = conn.execute(
                "DELETE FROM headers WHERE hash = ?1",
                params![hash.as_bytes().to_vec()],
            )?;
            Ok(n > 0)
        })
        .await?
    }

    async fn job_cursor(&self, job_id: usize) -> anyhow::Result<Option<i64>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let cursor = conn
                .query_row(
                    "SELECT last_block FROM job_progress WHERE job_id = ?1",
                    params![job_id as i64],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(cursor)
        })
        .await?
    }

    async fn commit_job_step(
        &self,
        job_id: usize,
        last_block: i64,
        writes: WriteBatch,
    ) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let tx = conn.unchecked_transaction()?;
            Self::run_batch(&conn, &writes)?;
            conn.execute(
                "INSERT INTO job_progress (job_id, last_block) VALUES (?1, ?2)
                 ON CONFLICT(job_id) DO UPDATE SET last_block = excluded.last_block",
                params![job_id as i64, last_block],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?
    }
}
