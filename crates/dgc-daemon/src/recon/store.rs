//! SQLite-backed reconciliation store: runs, the freeze singleton, and
//! governance override records.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dgc_core::recon::{FreezeOverride, FreezeState, ReconciliationRun};

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored record failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Corrupt(value.to_string())
    }
}

/// Durable reconciliation store backed by SQLite.
#[derive(Debug, Clone)]
pub struct ReconStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReconStore {
    /// Opens (creating if needed) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema initialization fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS recon_runs (
                run_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recon_runs_created
                ON recon_runs(created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS freeze_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS freeze_overrides (
                override_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Persists a run and upserts the freeze singleton in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn insert_run(
        &self,
        run: &ReconciliationRun,
        freeze: &FreezeState,
    ) -> Result<(), StoreError> {
        let run_record = serde_json::to_string(run)?;
        let freeze_record = serde_json::to_string(freeze)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO recon_runs (run_id, created_at, record) VALUES (?1, ?2, ?3)",
            params![run.run_id, run.created_at, run_record],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO freeze_state (id, record) VALUES (1, ?1)",
            params![freeze_record],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The most recent run, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn latest_run(&self) -> Result<Option<ReconciliationRun>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM recon_runs ORDER BY created_at DESC, run_id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn runs(&self, limit: usize) -> Result<Vec<ReconciliationRun>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM recon_runs ORDER BY created_at DESC, run_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }

    /// The freeze singleton, if it has ever been written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn freeze_state(&self) -> Result<Option<FreezeState>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row("SELECT record FROM freeze_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Flips the freeze singleton and appends the override record in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn apply_override(
        &self,
        freeze: &FreezeState,
        override_record: &FreezeOverride,
    ) -> Result<(), StoreError> {
        let freeze_record = serde_json::to_string(freeze)?;
        let override_json = serde_json::to_string(override_record)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO freeze_state (id, record) VALUES (1, ?1)",
            params![freeze_record],
        )?;
        tx.execute(
            "INSERT INTO freeze_overrides (override_id, created_at, record)
             VALUES (?1, ?2, ?3)",
            params![
                override_record.override_id,
                override_record.created_at,
                override_json
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Override records, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn overrides(&self, limit: usize) -> Result<Vec<FreezeOverride>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM freeze_overrides
             ORDER BY created_at DESC, override_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }
}
