//! SQLite-backed risk store: append-only event logs, per-target profiles,
//! and alerts.
//!
//! Ledger events are keyed by certificate; listing audit events carry
//! secondary indexes on certificate and actor so the cancellation heuristics
//! can query across listings. Profiles upsert by target; alerts are
//! append-only.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dgc_core::event::LedgerEvent;
use dgc_core::listing::ListingAuditEvent;
use dgc_core::risk::{RiskAlert, RiskProfile, RiskTargetType};

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

/// Durable risk store backed by SQLite.
#[derive(Debug, Clone)]
pub struct RiskStore {
    conn: Arc<Mutex<Connection>>,
}

impl RiskStore {
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
            "CREATE TABLE IF NOT EXISTS ledger_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cert_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_risk_ledger_cert
                ON ledger_events(cert_id, occurred_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS listing_audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                listing_id TEXT NOT NULL,
                cert_id TEXT,
                actor TEXT,
                event_type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_risk_audit_listing
                ON listing_audit_events(listing_id, occurred_at ASC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_risk_audit_cert
                ON listing_audit_events(cert_id, occurred_at ASC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_risk_audit_actor
                ON listing_audit_events(actor, occurred_at ASC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                target TEXT PRIMARY KEY,
                target_type TEXT NOT NULL,
                score INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                record TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                alert_id TEXT PRIMARY KEY,
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

    /// Appends a ledger event to the certificate log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn append_ledger_event(&self, event: &LedgerEvent) -> Result<(), StoreError> {
        let record = serde_json::to_string(event)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ledger_events (cert_id, event_type, occurred_at, record)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.cert_id(),
                event.type_name(),
                event.occurred_at(),
                record
            ],
        )?;
        Ok(())
    }

    /// All ledger events for a certificate in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn ledger_events_for(&self, cert_id: &str) -> Result<Vec<LedgerEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM ledger_events WHERE cert_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![cert_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }

    /// Appends a listing audit event with its secondary keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn append_listing_audit(
        &self,
        event: &ListingAuditEvent,
        cert_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let record = serde_json::to_string(event)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO listing_audit_events
                (event_id, listing_id, cert_id, actor, event_type, occurred_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.listing_id,
                cert_id,
                event.actor,
                event.event_type.as_str(),
                event.occurred_at,
                record
            ],
        )?;
        Ok(())
    }

    /// All audit events for a listing in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn audit_for_listing(&self, listing_id: &str) -> Result<Vec<ListingAuditEvent>, StoreError> {
        self.audit_query(
            "SELECT record FROM listing_audit_events WHERE listing_id = ?1 ORDER BY id ASC",
            listing_id,
        )
    }

    /// All audit events touching a certificate in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn audit_for_cert(&self, cert_id: &str) -> Result<Vec<ListingAuditEvent>, StoreError> {
        self.audit_query(
            "SELECT record FROM listing_audit_events WHERE cert_id = ?1 ORDER BY id ASC",
            cert_id,
        )
    }

    /// All CANCELLED audit events by an actor, across listings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn cancellations_by_actor(&self, actor: &str) -> Result<Vec<ListingAuditEvent>, StoreError> {
        self.audit_query(
            "SELECT record FROM listing_audit_events
             WHERE actor = ?1 AND event_type = 'CANCELLED' ORDER BY id ASC",
            actor,
        )
    }

    fn audit_query(&self, sql: &str, key: &str) -> Result<Vec<ListingAuditEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }

    /// The stored profile for a target of the given type, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn get_profile(
        &self,
        target: &str,
        target_type: RiskTargetType,
    ) -> Result<Option<RiskProfile>, StoreError> {
        let conn = self.lock()?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM profiles WHERE target = ?1 AND target_type = ?2",
                params![target, target_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record)?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces a target profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn upsert_profile(
        &self,
        profile: &RiskProfile,
        target_type: RiskTargetType,
    ) -> Result<(), StoreError> {
        let record = serde_json::to_string(profile)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO profiles (target, target_type, score, updated_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.target,
                target_type.as_str(),
                i64::from(profile.score),
                profile.updated_at,
                record
            ],
        )?;
        Ok(())
    }

    /// Top-scoring profiles of a target type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn top_profiles(
        &self,
        target_type: RiskTargetType,
        limit: usize,
    ) -> Result<Vec<RiskProfile>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM profiles WHERE target_type = ?1
             ORDER BY score DESC, target ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![target_type.as_str(), limit as i64],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }

    /// Appends an alert. An existing id is replaced (reconciliation alert
    /// ingests are idempotent per run).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite or serialization failure.
    pub fn insert_alert(&self, alert: &RiskAlert) -> Result<(), StoreError> {
        let record = serde_json::to_string(alert)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO alerts (alert_id, created_at, record)
             VALUES (?1, ?2, ?3)",
            params![alert.alert_id, alert.created_at, record],
        )?;
        Ok(())
    }

    /// Newest alerts first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on SQLite failure or a corrupt record.
    pub fn alerts(&self, limit: usize) -> Result<Vec<RiskAlert>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM alerts ORDER BY created_at DESC, alert_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for record in rows {
            out.push(serde_json::from_str(&record?)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgc_core::amount::Amount;
    use dgc_core::listing::ListingAuditType;
    use dgc_core::risk::RiskLevel;

    fn transfer(cert_id: &str, occurred_at: &str) -> LedgerEvent {
        LedgerEvent::Transfer {
            cert_id: cert_id.into(),
            occurred_at: occurred_at.into(),
            proof_hash: None,
            from: "a".into(),
            to: "b".into(),
            amount_gram: Amount::parse("1").unwrap(),
            price: None,
        }
    }

    fn cancelled(event_id: &str, listing_id: &str, actor: &str) -> ListingAuditEvent {
        ListingAuditEvent {
            event_id: event_id.into(),
            listing_id: listing_id.into(),
            event_type: ListingAuditType::Cancelled,
            actor: Some(actor.into()),
            occurred_at: "2026-01-01T00:00:00Z".into(),
            details: None,
        }
    }

    #[test]
    fn ledger_events_append_in_order() {
        let store = RiskStore::open_in_memory().unwrap();
        store.append_ledger_event(&transfer("DGC-1", "t1")).unwrap();
        store.append_ledger_event(&transfer("DGC-1", "t2")).unwrap();
        store.append_ledger_event(&transfer("DGC-2", "t3")).unwrap();
        let events = store.ledger_events_for("DGC-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].occurred_at(), "t1");
    }

    #[test]
    fn audit_secondary_indexes() {
        let store = RiskStore::open_in_memory().unwrap();
        store
            .append_listing_audit(&cancelled("E1", "LST-1", "mallory"), Some("DGC-1"))
            .unwrap();
        store
            .append_listing_audit(&cancelled("E2", "LST-2", "mallory"), Some("DGC-1"))
            .unwrap();
        store
            .append_listing_audit(&cancelled("E3", "LST-3", "alice"), Some("DGC-2"))
            .unwrap();

        assert_eq!(store.audit_for_listing("LST-1").unwrap().len(), 1);
        assert_eq!(store.audit_for_cert("DGC-1").unwrap().len(), 2);
        assert_eq!(store.cancellations_by_actor("mallory").unwrap().len(), 2);
    }

    #[test]
    fn profile_upsert_and_ranking() {
        let store = RiskStore::open_in_memory().unwrap();
        for (target, score) in [("DGC-1", 10u32), ("DGC-2", 80), ("DGC-3", 40)] {
            let profile = RiskProfile {
                target: target.into(),
                score,
                level: RiskLevel::from_score(score),
                reasons: vec![],
                updated_at: "t".into(),
                cert_id: None,
            };
            store
                .upsert_profile(&profile, RiskTargetType::Certificate)
                .unwrap();
        }
        let top = store.top_profiles(RiskTargetType::Certificate, 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].target, "DGC-2");
        assert_eq!(top[1].target, "DGC-3");
        assert!(store
            .get_profile("DGC-404", RiskTargetType::Certificate)
            .unwrap()
            .is_none());
    }

    #[test]
    fn alerts_newest_first() {
        let store = RiskStore::open_in_memory().unwrap();
        for (id, at) in [("ALERT-1", "t1"), ("ALERT-2", "t2")] {
            let alert = RiskAlert {
                alert_id: id.into(),
                target_type: RiskTargetType::Certificate,
                target_id: "DGC-1".into(),
                score: 70,
                level: RiskLevel::High,
                reasons: vec![],
                created_at: at.into(),
            };
            store.insert_alert(&alert).unwrap();
        }
        let alerts = store.alerts(10).unwrap();
        assert_eq!(alerts[0].alert_id, "ALERT-2");
        assert_eq!(store.alerts(1).unwrap().len(), 1);
    }
}
