//! Transcript persistence.
//!
//! Every committed turn is handed to a [`Recorder`], which fans it out to the
//! configured [`RecordSink`]s. Sink failures never reach the user: they are
//! traced and returned so tests can see them, and the session ignores them.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Store lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordRole {
    User,
    Assistant,
}

impl RecordRole {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordRole::User => "user",
            RecordRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub role: RecordRole,
    pub text: String,
}

pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;
    fn append_record(&self, record: &TranscriptRecord) -> Result<(), PersistError>;
}

/// Per-session handle that stamps and dispatches records for one provider.
#[derive(Clone)]
pub struct Recorder {
    provider: String,
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl Recorder {
    pub fn new(provider: impl Into<String>, sinks: Vec<Arc<dyn RecordSink>>) -> Self {
        Self {
            provider: provider.into(),
            sinks,
        }
    }

    /// A recorder that drops everything.
    pub fn disabled(provider: impl Into<String>) -> Self {
        Self::new(provider, Vec::new())
    }

    pub fn record(&self, role: RecordRole, text: &str) -> Vec<PersistError> {
        let record = TranscriptRecord {
            timestamp: Utc::now(),
            provider: self.provider.clone(),
            role,
            text: text.to_string(),
        };

        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(err) = sink.append_record(&record) {
                debug!(
                    provider = %self.provider,
                    sink = sink.name(),
                    error = %err,
                    "Transcript append failed"
                );
                failures.push(err);
            }
        }
        failures
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS messages(
    id INTEGER PRIMARY KEY,
    ts TEXT,
    engine TEXT,
    role TEXT,
    msg TEXT
)";

/// Shared structured store. One connection serves every session, so rows
/// from different providers never interleave mid-write.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count_messages(&self, provider: &str) -> Result<usize, PersistError> {
        let conn = self.conn.lock().map_err(|_| PersistError::LockPoisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE engine = ?1",
            params![provider],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn messages(&self, provider: &str) -> Result<Vec<(String, String)>, PersistError> {
        let conn = self.conn.lock().map_err(|_| PersistError::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT role, msg FROM messages WHERE engine = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![provider], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RecordSink for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn append_record(&self, record: &TranscriptRecord) -> Result<(), PersistError> {
        let conn = self.conn.lock().map_err(|_| PersistError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO messages(ts, engine, role, msg) VALUES(?1, ?2, ?3, ?4)",
            params![
                record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                record.provider,
                record.role.as_str(),
                record.text,
            ],
        )?;
        Ok(())
    }
}
