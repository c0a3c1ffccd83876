//! Durable SQLite storage for webhook intake and reconciled entities.
//!
//! The intake table doubles as the reordering buffer: rows stay `pending`
//! until the scheduler promotes them, so buffered work survives a restart.
//! All access goes through one connection behind a mutex and runs on the
//! blocking thread pool.

mod columns;
mod entities;
mod intake;

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use rusqlite::Connection;

use crate::error::{CILensError, Result};

pub use entities::{Guard, UpsertOutcome};
pub use intake::IntakeCounts;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS intake_events (
    delivery_id     TEXT PRIMARY KEY,
    event_type      TEXT NOT NULL,
    sequence_id     INTEGER NOT NULL,
    claimed_at      INTEGER NOT NULL,
    received_at     INTEGER NOT NULL,
    processed_at    INTEGER,
    payload         BLOB NOT NULL,
    status          TEXT NOT NULL,
    ordering_key    TEXT NOT NULL,
    status_priority INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_intake_events_pending
    ON intake_events (status, received_at);

CREATE TABLE IF NOT EXISTS jobs (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL,
    status       TEXT NOT NULL,
    labels       TEXT NOT NULL,
    url          TEXT NOT NULL,
    conclusion   TEXT,
    created_at   INTEGER NOT NULL,
    started_at   INTEGER,
    completed_at INTEGER,
    run_id       INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    status        TEXT NOT NULL,
    repository    TEXT NOT NULL,
    url           TEXT NOT NULL,
    display_title TEXT NOT NULL,
    conclusion    TEXT,
    created_at    INTEGER NOT NULL,
    started_at    INTEGER,
    updated_at    INTEGER NOT NULL
);
";

/// Handle to the webhook database. Cloning shares the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) the database at `path` and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("SQLite kept journal mode {journal_mode}; concurrent readers may block");
        }

        debug!("Opened webhook database at {}", path.display());
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CILensError::Task("database lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CILensError::Task(format!("database task failed: {e}")))?
    }
}
