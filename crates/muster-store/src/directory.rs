//! User directory seam and SQLite reference implementation.
//!
//! User documents are owned by the wider deployment (accounts come from the
//! identity provider); this store holds the attendance-facing projection:
//! identifier, names, and the reference-image bookkeeping.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("identifier already registered: {0}")]
    AlreadyExists(String),
    #[error("directory store: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Attendance-facing view of a user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Stable handle assigned by the identity provider.
    pub uid: String,
    /// Organizational identifier; the lookup key for every attendance flow.
    pub identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
    pub has_reference: bool,
    pub reference_url: Option<String>,
    pub reference_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Display name for attendance records: `"first last"`, trimmed when
    /// either part is empty.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields supplied at enrollment; everything else is store-assigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub uid: String,
    pub identifier: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

pub trait UserDirectory: Send + Sync {
    /// Insert a new user document. `AlreadyExists` if the identifier is taken.
    fn insert(&self, user: NewUser) -> Result<UserRecord, DirectoryError>;

    /// Look a user up by the identifier field (not by primary key).
    fn find(&self, identifier: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Record that a reference image now exists for `identifier`, with its
    /// public URL and the update timestamp.
    fn record_reference(
        &self,
        identifier: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;

    /// Delete the user document. `NotFound` if absent.
    fn delete(&self, identifier: &str) -> Result<(), DirectoryError>;
}

/// SQLite-backed directory.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    pub fn open(path: &Path) -> Result<Self, DirectoryError> {
        let conn = Connection::open(path)?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                identifier TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                has_reference INTEGER NOT NULL DEFAULT 0,
                reference_url TEXT,
                reference_updated_at TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        identifier: row.get("identifier")?,
        uid: row.get("uid")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        active: row.get("active")?,
        has_reference: row.get("has_reference")?,
        reference_url: row.get("reference_url")?,
        reference_updated_at: row.get("reference_updated_at")?,
        created_at: row.get("created_at")?,
    })
}

impl UserDirectory for SqliteDirectory {
    fn insert(&self, user: NewUser) -> Result<UserRecord, DirectoryError> {
        let conn = self.conn.lock().expect("directory lock poisoned");
        let created_at = Utc::now();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users
                (identifier, uid, first_name, last_name, email, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                user.identifier,
                user.uid,
                user.first_name,
                user.last_name,
                user.email,
                created_at,
            ],
        )?;
        if inserted == 0 {
            return Err(DirectoryError::AlreadyExists(user.identifier));
        }
        tracing::info!(identifier = %user.identifier, uid = %user.uid, "user enrolled");
        Ok(UserRecord {
            uid: user.uid,
            identifier: user.identifier,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            active: true,
            has_reference: false,
            reference_url: None,
            reference_updated_at: None,
            created_at,
        })
    }

    fn find(&self, identifier: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let conn = self.conn.lock().expect("directory lock poisoned");
        let user = conn
            .query_row(
                "SELECT identifier, uid, first_name, last_name, email, active,
                        has_reference, reference_url, reference_updated_at, created_at
                 FROM users WHERE identifier = ?1",
                params![identifier],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn record_reference(
        &self,
        identifier: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let conn = self.conn.lock().expect("directory lock poisoned");
        let updated = conn.execute(
            "UPDATE users
             SET has_reference = 1, reference_url = ?2, reference_updated_at = ?3
             WHERE identifier = ?1",
            params![identifier, url, at],
        )?;
        if updated == 0 {
            return Err(DirectoryError::NotFound(identifier.to_string()));
        }
        Ok(())
    }

    fn delete(&self, identifier: &str) -> Result<(), DirectoryError> {
        let conn = self.conn.lock().expect("directory lock poisoned");
        let deleted = conn.execute("DELETE FROM users WHERE identifier = ?1", params![identifier])?;
        if deleted == 0 {
            return Err(DirectoryError::NotFound(identifier.to_string()));
        }
        tracing::info!(identifier, "user deleted");
        Ok(())
    }
}
