//! SQLite-backed dispute store.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dgc_core::dispute::{DisputeRecord, DisputeStatus};

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

/// Durable dispute store backed by SQLite.
#[derive(Debug, Clone)]
pub struct DisputeStore {
    conn: Arc<Mutex<Connection>>,
}

impl DisputeStore {
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
            "CREATE TABLE IF NOT EXISTS disputes (
                dispute_id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL,
                status TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_disputes_status ON disputes(status, opened_at DESC)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Inserts or replaces a dispute record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn upsert(&self, dispute: &DisputeRecord) -> Result<(), StoreError> {
        let record = serde_json::to_string(dispute)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO disputes (dispute_id, listing_id, status, opened_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dispute.dispute_id,
                dispute.listing_id,
                dispute.status.as_str(),
                dispute.opened_at,
                record
            ],
        )?;
        Ok(())
    }

    /// Fetches a dispute by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn get(&self, dispute_id: &str) -> Result<Option<DisputeRecord>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM disputes WHERE dispute_id = ?1",
                params![dispute_id],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists disputes, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn list(&self, status: Option<DisputeStatus>) -> Result<Vec<DisputeRecord>, StoreError> {
        let conn = self.lock()?;
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT record FROM disputes WHERE status = ?1 ORDER BY opened_at DESC",
                )?;
                let rows = stmt.query_map(params![status.as_str()], |row| {
                    row.get::<_, String>(0)
                })?;
                for record in rows {
                    out.push(serde_json::from_str(&record?)?);
                }
            },
            None => {
                let mut stmt =
                    conn.prepare("SELECT record FROM disputes ORDER BY opened_at DESC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for record in rows {
                    out.push(serde_json::from_str(&record?)?);
                }
            },
        }
        Ok(out)
    }
}
