//! SQLite-backed certificate store.
//!
//! One row per certificate, keyed by `cert_id`, holding the full signed
//! record as JSON plus status and owner columns for queries. Issue, transfer,
//! split, and status changes all go through [`CertificateStore::upsert`]
//! (insert-or-replace on `cert_id`).

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dgc_core::certificate::SignedCertificate;

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

/// Durable certificate store backed by SQLite.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    conn: Arc<Mutex<Connection>>,
}

impl CertificateStore {
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
            "CREATE TABLE IF NOT EXISTS certificates (
                cert_id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                status TEXT NOT NULL,
                amount_scaled INTEGER NOT NULL,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_certificates_status ON certificates(status)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Inserts or replaces a signed certificate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or SQLite failure.
    pub fn upsert(&self, cert: &SignedCertificate, updated_at: &str) -> Result<(), StoreError> {
        let record = serde_json::to_string(cert)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO certificates
                (cert_id, owner, status, amount_scaled, record, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cert.payload.cert_id,
                cert.payload.owner,
                cert.payload.status.as_str(),
                cert.payload.amount_gram.scaled(),
                record,
                updated_at,
            ],
        )?;
        Ok(())
    }

    /// Inserts or replaces both halves of a split atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or SQLite failure; neither row
    /// lands on failure.
    pub fn upsert_pair(
        &self,
        parent: &SignedCertificate,
        child: &SignedCertificate,
        updated_at: &str,
    ) -> Result<(), StoreError> {
        let parent_record = serde_json::to_string(parent)?;
        let child_record = serde_json::to_string(child)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (cert, record) in [(parent, parent_record), (child, child_record)] {
            tx.execute(
                "INSERT OR REPLACE INTO certificates
                    (cert_id, owner, status, amount_scaled, record, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    cert.payload.cert_id,
                    cert.payload.owner,
                    cert.payload.status.as_str(),
                    cert.payload.amount_gram.scaled(),
                    record,
                    updated_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetches a certificate by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt stored record.
    pub fn get(&self, cert_id: &str) -> Result<Option<SignedCertificate>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM certificates WHERE cert_id = ?1",
                params![cert_id],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists all certificates in ascending `cert_id` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt stored record.
    pub fn list(&self) -> Result<Vec<SignedCertificate>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT record FROM certificates ORDER BY cert_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }
}
