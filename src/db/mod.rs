use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Thread-safe SQLite handle (single connection with mutex) for the few
/// pieces of state that survive reloads: waitlist membership, the
/// telemetry-dedup flag and the first-view guidance flag. Everything else
/// is session-only by design.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

pub const KEY_WAITLIST_JOINED: &str = "waitlist_joined";
pub const KEY_WAITLIST_EMAIL: &str = "waitlist_email";
pub const KEY_VOTE_GUIDE_SEEN: &str = "vote_guide_seen";
/// Per-email prefix guarding duplicate email-submitted telemetry
const KEY_EMAIL_TRACKED_PREFIX: &str = "waitlist_email_tracked:";

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Generic key/value ────────────────────────────────────────────────────

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO local_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    pub fn get_flag(&self, key: &str) -> Result<bool> {
        Ok(self.get_value(key)?.as_deref() == Some("true"))
    }

    pub fn set_flag(&self, key: &str) -> Result<()> {
        self.set_value(key, "true")
    }

    // ── Named accessors ──────────────────────────────────────────────────────

    pub fn waitlist_joined(&self) -> Result<bool> {
        self.get_flag(KEY_WAITLIST_JOINED)
    }

    pub fn waitlist_email(&self) -> Result<Option<String>> {
        self.get_value(KEY_WAITLIST_EMAIL)
    }

    /// Persist waitlist membership locally. Always succeeds from the UI's
    /// perspective regardless of the remote delivery outcome.
    pub fn mark_waitlist_joined(&self, email: &str) -> Result<()> {
        self.set_flag(KEY_WAITLIST_JOINED)?;
        self.set_value(KEY_WAITLIST_EMAIL, email)
    }

    /// Whether an email-submitted telemetry event was already sent for this
    /// exact address.
    pub fn email_tracked(&self, email: &str) -> Result<bool> {
        self.get_flag(&Self::email_tracked_key(email))
    }

    pub fn mark_email_tracked(&self, email: &str) -> Result<()> {
        self.set_flag(&Self::email_tracked_key(email))
    }

    fn email_tracked_key(email: &str) -> String {
        format!("{}{}", KEY_EMAIL_TRACKED_PREFIX, email.to_lowercase())
    }

    pub fn vote_guide_seen(&self) -> Result<bool> {
        self.get_flag(KEY_VOTE_GUIDE_SEEN)
    }

    pub fn mark_vote_guide_seen(&self) -> Result<()> {
        self.set_flag(KEY_VOTE_GUIDE_SEEN)
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS local_state (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
