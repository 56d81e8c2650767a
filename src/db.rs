//! Database module for Parlor
//!
//! Provides persistence for sessions and their turns.

mod schema;

pub use schema::*;

use crate::character::CharacterProfile;
use crate::history::TurnHistory;
use crate::transcript::{Role, Transcript, Turn};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const SESSION_COLUMNS: &str = "s.id, s.title, s.character, s.summary, s.history, s.created_at, s.updated_at,
     (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id) AS turn_count";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Create a session with its seeded transcript and history
    pub fn create_session(
        &self,
        id: &str,
        title: &str,
        character: &CharacterProfile,
        transcript: &Transcript,
        history: &TurnHistory,
    ) -> DbResult<SessionRecord> {
        let character_json = serde_json::to_string(character)?;
        let history_json = serde_json::to_string(history)?;
        let now = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (id, title, character, summary, history, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)",
            params![id, title, character_json, history_json, now.to_rfc3339()],
        )?;
        insert_turns(&tx, id, transcript.turns())?;
        tx.commit()?;

        Ok(SessionRecord {
            id: id.to_string(),
            title: title.to_string(),
            character: character.clone(),
            summary: None,
            history: history.clone(),
            created_at: now,
            updated_at: now,
            turn_count: i64::try_from(transcript.len()).unwrap_or(i64::MAX),
        })
    }

    /// Get session by ID
    pub fn get_session(&self, id: &str) -> DbResult<SessionRecord> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1"
        ))?;

        let raw = stmt
            .query_row(params![id], RawSession::from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::SessionNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })?;
        raw.into_record()
    }

    /// List sessions, most recently updated first
    pub fn list_sessions(&self) -> DbResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s ORDER BY s.updated_at DESC"
        ))?;

        let rows = stmt.query_map([], RawSession::from_row)?;
        rows.map(|row| row.map_err(DbError::from).and_then(RawSession::into_record))
            .collect()
    }

    /// Delete a session and all its turns
    pub fn delete_session(&self, id: &str) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM turns WHERE session_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::SessionNotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace the stored transcript, summary and history in one transaction
    pub fn save_session(
        &self,
        id: &str,
        transcript: &Transcript,
        summary: Option<&str>,
        history: &TurnHistory,
    ) -> DbResult<()> {
        let history_json = serde_json::to_string(history)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE sessions SET summary = ?1, history = ?2, updated_at = ?3 WHERE id = ?4",
            params![summary, history_json, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(DbError::SessionNotFound(id.to_string()));
        }
        tx.execute("DELETE FROM turns WHERE session_id = ?1", params![id])?;
        insert_turns(&tx, id, transcript.turns())?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Turn Operations ====================

    /// Get a session's turns in transcript order
    pub fn get_turns(&self, session_id: &str) -> DbResult<Vec<Turn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT turn_id, role, content, is_summary, created_at
             FROM turns WHERE session_id = ?1 ORDER BY position ASC",
        )?;

        let turns = stmt
            .query_map(params![session_id], parse_turn_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    /// Load the record and transcript of a session
    pub fn load_session(&self, id: &str) -> DbResult<(SessionRecord, Transcript)> {
        let record = self.get_session(id)?;
        let turns = self.get_turns(id)?;
        Ok((record, Transcript::from_turns(turns)))
    }
}

fn insert_turns(tx: &rusqlite::Transaction<'_>, session_id: &str, turns: &[Turn]) -> DbResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO turns (session_id, position, turn_id, role, content, is_summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (position, turn) in turns.iter().enumerate() {
        stmt.execute(params![
            session_id,
            position,
            turn.id,
            turn.role.as_str(),
            turn.content,
            turn.is_summary,
            turn.created_at.to_rfc3339(),
        ])?;
    }
    Ok(())
}

/// Session row before its JSON columns are decoded
struct RawSession {
    id: String,
    title: String,
    character: String,
    summary: Option<String>,
    history: String,
    created_at: String,
    updated_at: String,
    turn_count: i64,
}

impl RawSession {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            character: row.get(2)?,
            summary: row.get(3)?,
            history: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            turn_count: row.get(7)?,
        })
    }

    fn into_record(self) -> DbResult<SessionRecord> {
        Ok(SessionRecord {
            character: serde_json::from_str(&self.character)?,
            history: serde_json::from_str(&self.history)?,
            id: self.id,
            title: self.title,
            summary: self.summary,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
            turn_count: self.turn_count,
        })
    }
}

fn parse_turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let role_str: String = row.get(1)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(1, role_str.clone(), rusqlite::types::Type::Text)
    })?;
    Ok(Turn {
        id: row.get(0)?,
        role,
        content: row.get(2)?,
        is_summary: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
