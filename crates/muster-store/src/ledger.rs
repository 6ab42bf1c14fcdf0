//! Attendance ledger seam and SQLite reference implementation.
//!
//! Records are append-only. The store assigns the record id and the
//! timestamp at write time (its server-timestamp role); nothing updates or
//! deletes a record afterwards.
//!
//! Duplicate same-day/same-kind records and out-of-order check-in/check-out
//! sequences are intentionally allowed — the ledger appends unconditionally
//! and leaves interpretation to reporting.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("attendance store: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Direction of an attendance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceKind {
    CheckIn,
    CheckOut,
}

impl AttendanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceKind::CheckIn => "check_in",
            AttendanceKind::CheckOut => "check_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "check_in" => Some(AttendanceKind::CheckIn),
            "check_out" => Some(AttendanceKind::CheckOut),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted check-in/check-out event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(rename = "type")]
    pub kind: AttendanceKind,
    pub status: String,
    /// Confidence from the verification that gated this event. Stored as
    /// supplied — may sit outside [0, 1] (see the match engine).
    pub verification_confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied half of a record; id and timestamp are store-assigned.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub kind: AttendanceKind,
    pub status: String,
    pub verification_confidence: f32,
}

/// Inclusive date bounds for history queries; `None` leaves a side open.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub trait AttendanceLedger: Send + Sync {
    /// Append a record, assigning its id and timestamp at write time.
    fn append(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord, LedgerError>;

    /// All records for `user_id` within `range` (inclusive bounds), ordered
    /// by date then time, both descending. No pagination.
    fn query(&self, user_id: &str, range: DateRange) -> Result<Vec<AttendanceRecord>, LedgerError>;
}

/// SQLite-backed ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS attendance_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                verification_confidence REAL NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attendance_user_date
             ON attendance_records (user_id, date)",
            [],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let kind: String = row.get("kind")?;
    Ok(AttendanceRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        user_name: row.get("user_name")?,
        date: row.get("date")?,
        time: row.get("time")?,
        kind: AttendanceKind::parse(&kind).unwrap_or(AttendanceKind::CheckIn),
        status: row.get("status")?,
        verification_confidence: row.get("verification_confidence")?,
        timestamp: row.get("timestamp")?,
    })
}

impl AttendanceLedger for SqliteLedger {
    fn append(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord, LedgerError> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let id = Uuid::new_v4().to_string();
        let timestamp = Utc::now();
        conn.execute(
            "INSERT INTO attendance_records
                (id, user_id, user_name, date, time, kind, status,
                 verification_confidence, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.user_id,
                record.user_name,
                record.date,
                record.time,
                record.kind.as_str(),
                record.status,
                record.verification_confidence as f64,
                timestamp,
            ],
        )?;
        tracing::info!(record_id = %id, user = %record.user_id, kind = %record.kind, "attendance recorded");
        Ok(AttendanceRecord {
            id,
            user_id: record.user_id,
            user_name: record.user_name,
            date: record.date,
            time: record.time,
            kind: record.kind,
            status: record.status,
            verification_confidence: record.verification_confidence,
            timestamp,
        })
    }

    fn query(&self, user_id: &str, range: DateRange) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let conn = self.conn.lock().expect("ledger lock poisoned");

        let mut sql = String::from(
            "SELECT id, user_id, user_name, date, time, kind, status,
                    verification_confidence, timestamp
             FROM attendance_records WHERE user_id = ?1",
        );
        let mut bound: Vec<&dyn ToSql> = vec![&user_id];
        if let Some(ref start) = range.start {
            sql.push_str(&format!(" AND date >= ?{}", bound.len() + 1));
            bound.push(start);
        }
        if let Some(ref end) = range.end {
            sql.push_str(&format!(" AND date <= ?{}", bound.len() + 1));
            bound.push(end);
        }
        sql.push_str(" ORDER BY date DESC, time DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bound.as_slice(), row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
