//! SQLite-backed marketplace store: listings, audit trail, and idempotency
//! records.
//!
//! Every mutation that touches both domain state and an audit or
//! idempotency row executes as a single serialized transaction, so an
//! idempotency key can never be observed before its response is recorded.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dgc_core::listing::{
    IdempotencyRecord, ListingAuditEvent, ListingStatus, MarketplaceListing,
};

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

/// Durable marketplace store backed by SQLite.
#[derive(Debug, Clone)]
pub struct MarketplaceStore {
    conn: Arc<Mutex<Connection>>,
}

impl MarketplaceStore {
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
            "CREATE TABLE IF NOT EXISTS listings (
                listing_id TEXT PRIMARY KEY,
                cert_id TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listings_status
                ON listings(status, updated_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS listing_audit (
                event_id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listing_audit_listing
                ON listing_audit(listing_id, occurred_at ASC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS idempotency (
                action TEXT NOT NULL,
                key TEXT NOT NULL,
                request_hash TEXT NOT NULL,
                response_status INTEGER NOT NULL,
                response_body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (action, key)
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Fetches a listing by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn get_listing(&self, listing_id: &str) -> Result<Option<MarketplaceListing>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM listings WHERE listing_id = ?1",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Lists listings, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn list_listings(
        &self,
        status: Option<ListingStatus>,
    ) -> Result<Vec<MarketplaceListing>, StoreError> {
        let conn = self.lock()?;
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT record FROM listings WHERE status = ?1 ORDER BY updated_at DESC",
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
                    conn.prepare("SELECT record FROM listings ORDER BY updated_at DESC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for record in rows {
                    out.push(serde_json::from_str(&record?)?);
                }
            },
        }
        Ok(out)
    }

    /// The append-ordered audit trail of a listing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn audit_trail(&self, listing_id: &str) -> Result<Vec<ListingAuditEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM listing_audit WHERE listing_id = ?1 ORDER BY occurred_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![listing_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }

    /// Looks up a stored idempotency record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure.
    pub fn idempotency_lookup(
        &self,
        action: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT action, key, request_hash, response_status, response_body, created_at
             FROM idempotency WHERE action = ?1 AND key = ?2",
            params![action, key],
            |row| {
                Ok(IdempotencyRecord {
                    action: row.get(0)?,
                    key: row.get(1)?,
                    request_hash: row.get(2)?,
                    response_status: row.get::<_, i64>(3)? as u16,
                    response_body: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Inserts a fresh listing with its CREATED audit row in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn insert_listing(
        &self,
        listing: &MarketplaceListing,
        audit: &ListingAuditEvent,
    ) -> Result<(), StoreError> {
        let listing_record = serde_json::to_string(listing)?;
        let audit_record = serde_json::to_string(audit)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO listings (listing_id, cert_id, status, updated_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                listing.listing_id,
                listing.cert_id,
                listing.status.as_str(),
                listing.updated_at,
                listing_record,
            ],
        )?;
        tx.execute(
            "INSERT INTO listing_audit (event_id, listing_id, occurred_at, record)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                audit.event_id,
                audit.listing_id,
                audit.occurred_at,
                audit_record,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Applies a listing mutation: replaces the listing row, appends the
    /// audit row, and (for idempotent operations) stores the response
    /// record, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure; no row
    /// lands on failure.
    pub fn apply_mutation(
        &self,
        listing: &MarketplaceListing,
        audit: &ListingAuditEvent,
        idempotency: Option<&IdempotencyRecord>,
    ) -> Result<(), StoreError> {
        let listing_record = serde_json::to_string(listing)?;
        let audit_record = serde_json::to_string(audit)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE listings SET status = ?2, updated_at = ?3, record = ?4
             WHERE listing_id = ?1",
            params![
                listing.listing_id,
                listing.status.as_str(),
                listing.updated_at,
                listing_record,
            ],
        )?;
        tx.execute(
            "INSERT INTO listing_audit (event_id, listing_id, occurred_at, record)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                audit.event_id,
                audit.listing_id,
                audit.occurred_at,
                audit_record,
            ],
        )?;
        if let Some(record) = idempotency {
            tx.execute(
                "INSERT OR REPLACE INTO idempotency
                    (action, key, request_hash, response_status, response_body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.action,
                    record.key,
                    record.request_hash,
                    i64::from(record.response_status),
                    record.response_body,
                    record.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
