//! Row types for the session/message/checkpoint/snapshot tables.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use crate::error::{CoreError, Result};

fn parse_uuid(s: String) -> Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| CoreError::Config(format!("invalid uuid column: {e}")))
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Config(format!("invalid timestamp column: {e}")))
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub title: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_tokens: i64,
    pub total_cost: f64,
}

impl Session {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_uuid(row.get(0)?).map_err(|e| rusqlite_err(e))?,
            title: row.get(1)?,
            model: row.get(2)?,
            created_at: parse_timestamp(row.get(3)?).map_err(rusqlite_err)?,
            updated_at: parse_timestamp(row.get(4)?).map_err(rusqlite_err)?,
            total_tokens: row.get(5)?,
            total_cost: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub tokens: i32,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_uuid(row.get(0)?).map_err(rusqlite_err)?,
            session_id: parse_uuid(row.get(1)?).map_err(rusqlite_err)?,
            role: row.get(2)?,
            content: row.get(3)?,
            tokens: row.get(4)?,
            cost: row.get(5)?,
            created_at: parse_timestamp(row.get(6)?).map_err(rusqlite_err)?,
        })
    }
}

/// One row per compression run: the audit trail behind a [`crate::context::Checkpoint`].
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub level: u8,
    pub sequence: i64,
    pub original_tokens: i64,
    pub compressed_tokens: i64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_uuid(row.get(0)?).map_err(rusqlite_err)?,
            session_id: parse_uuid(row.get(1)?).map_err(rusqlite_err)?,
            level: row.get::<_, i64>(2)? as u8,
            sequence: row.get(3)?,
            original_tokens: row.get(4)?,
            compressed_tokens: row.get(5)?,
            summary: row.get(6)?,
            created_at: parse_timestamp(row.get(7)?).map_err(rusqlite_err)?,
        })
    }

    pub fn ratio(&self) -> f64 {
        if self.original_tokens == 0 {
            return 0.0;
        }
        self.compressed_tokens as f64 / self.original_tokens as f64
    }
}

fn rusqlite_err(err: CoreError) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(err.to_string())))
}
