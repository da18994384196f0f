//! SQLite connection and schema.

use chrono::{DateTime, SecondsFormat, Utc};
use famtree_core::store::BackendError;
use std::path::Path;
use tokio_rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        token_hash TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS photos (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        storage_path TEXT NOT NULL UNIQUE,
        person_name TEXT NOT NULL CHECK (length(trim(person_name)) > 0),
        relationship TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS photos_user_created ON photos (user_id, created_at DESC)",
];

/// Shared handle to the application database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BackendError(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path).await.map_err(backend)?;
        tracing::info!(path = %path.display(), "database opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().await.map_err(backend)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, BackendError> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA journal_mode=WAL;")?;
            for migration in MIGRATIONS {
                conn.execute_batch(migration)?;
            }
            Ok(())
        })
        .await
        .map_err(backend)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn backend(err: tokio_rusqlite::Error) -> BackendError {
    BackendError(err.to_string())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BackendError(format!("bad timestamp {raw:?}: {e}")))
}
