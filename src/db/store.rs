//! SQLite database store implementation.

use rusqlite::{params, Connection, Row};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

const SCHEMA: &str = include_str!("../../migrations/000001_raw_samples.up.sql");

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
///
/// Writes go through a dedicated connection inside a transaction; reads use a
/// second connection on the same WAL-mode file, so a query never waits behind
/// a batch insert and only ever sees committed batches.
#[derive(Clone)]
pub struct Store {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // the schema must exist before the reader prepares any statement
        let writer = open_connection(path)?;
        writer.execute_batch(SCHEMA)?;
        let reader = open_connection(path)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.writer.lock().map_err(|_| DbError::Poisoned)
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.reader.lock().map_err(|_| DbError::Poisoned)
    }

    /// Create the raw sample table and its index. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<(), DbError> {
        let conn = self.writer()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // --- Writes ---

    /// Insert a batch of samples in a single transaction.
    ///
    /// Either every sample is committed or none is. Returns the number of rows
    /// inserted.
    pub fn insert_batch(&self, samples: &[RawSample]) -> Result<usize, DbError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO raw_samples (ts, probe_id, http_code, ok, latency_ms, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for s in samples {
                stmt.execute(params![s.ts, s.probe_id, s.http_code, s.ok, s.latency_ms, s.error])?;
            }
        }

        // an early return above drops `tx`, which rolls the whole batch back
        tx.commit()?;
        Ok(samples.len())
    }

    // --- Reads ---

    /// The most recent sample of every probe ever observed, ordered by probe id.
    ///
    /// Ties on `ts` resolve to the row inserted last.
    pub fn latest_per_probe(&self) -> Result<Vec<RawSample>, DbError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT ts, probe_id, http_code, ok, latency_ms, error FROM (
                 SELECT ts, probe_id, http_code, ok, latency_ms, error,
                        ROW_NUMBER() OVER (PARTITION BY probe_id ORDER BY ts DESC, rowid DESC) AS rn
                 FROM raw_samples
             )
             WHERE rn = 1
             ORDER BY probe_id ASC",
        )?;

        let samples = stmt
            .query_map([], sample_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(samples)
    }

    /// Samples for a probe with `ts >= from_ts`, oldest first.
    pub fn samples_in_range(&self, probe_id: &str, from_ts: i64) -> Result<Vec<RawSample>, DbError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT ts, probe_id, http_code, ok, latency_ms, error FROM raw_samples
             WHERE probe_id = ?1 AND ts >= ?2
             ORDER BY ts ASC, rowid ASC",
        )?;

        let samples = stmt
            .query_map(params![probe_id, from_ts], sample_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(samples)
    }

    /// Latencies for a probe with `ts >= from_ts`, sorted ascending.
    pub fn latencies_in_range(&self, probe_id: &str, from_ts: i64) -> Result<Vec<u64>, DbError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT latency_ms FROM raw_samples
             WHERE probe_id = ?1 AND ts >= ?2
             ORDER BY latency_ms ASC",
        )?;

        let latencies = stmt
            .query_map(params![probe_id, from_ts], |row| row.get::<_, u64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(latencies)
    }

    /// Total number of stored samples.
    pub fn count(&self) -> Result<usize, DbError> {
        let conn = self.reader()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM raw_samples", [], |r| r.get(0))?)
    }
}

fn open_connection(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!("SQLite refused WAL mode, running with journal_mode={}", mode);
    }
    Ok(conn)
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<RawSample> {
    Ok(RawSample {
        ts: row.get(0)?,
        probe_id: row.get(1)?,
        http_code: row.get(2)?,
        ok: row.get(3)?,
        latency_ms: row.get(4)?,
        error: row.get(5)?,
    })
}
