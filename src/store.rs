//! Persistence store over SQLite: users, sessions, and analysis records.
//!
//! The pipeline treats this as an external collaborator. The connection
//! is owned by a `Store` built once at process start and passed around by
//! handle - no global state, so tests can run against in-memory stores.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub plan_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Durable union of one orchestration run: profile + reflection +
/// optional deeper meaning. Written once, never mutated.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: String,
    pub entry_text: String,
    pub emotions: BTreeMap<String, f64>,
    pub polarity: BTreeMap<String, f64>,
    pub topics: Vec<String>,
    pub reflection: String,
    pub reflection_mode: String,
    pub deeper_meaning: Option<String>,
    pub ysym_triggered: bool,
    pub created_at: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ============ Users ============

    pub fn create_user(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        plan_type: &str,
    ) -> Result<UserIdentity> {
        let conn = self.conn.lock().unwrap();
        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, email, username, plan_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, email, username, plan_type, now],
        )?;

        Ok(UserIdentity {
            user_id,
            email: email.map(String::from),
            username: username.map(String::from),
            plan_type: plan_type.to_string(),
        })
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserIdentity>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, email, username, plan_type FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(UserIdentity {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                    username: row.get(2)?,
                    plan_type: row.get(3)?,
                })
            },
        )
        .optional()
    }

    // ============ Sessions ============

    pub fn insert_session(&self, token: &str, user_id: &str, expires_at: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now, expires_at],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    // ============ Analyses ============

    pub fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analyses (id, user_id, entry_text, emotions, polarity, topics,
                                   reflection, reflection_mode, deeper_meaning, ysym_triggered, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.user_id,
                record.entry_text,
                serde_json::to_string(&record.emotions).unwrap_or_default(),
                serde_json::to_string(&record.polarity).unwrap_or_default(),
                serde_json::to_string(&record.topics).unwrap_or_default(),
                record.reflection,
                record.reflection_mode,
                record.deeper_meaning,
                record.ysym_triggered as i64,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    /// Analyses for one user with `created_at >= since`, oldest first.
    pub fn recent_analyses(&self, user_id: &str, since: &str) -> Result<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, entry_text, emotions, polarity, topics,
                    reflection, reflection_mode, deeper_meaning, ysym_triggered, created_at
             FROM analyses
             WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at ASC",
        )?;

        let records = stmt
            .query_map(params![user_id, since], |row| {
                let emotions_json: String = row.get(3)?;
                let polarity_json: String = row.get(4)?;
                let topics_json: String = row.get(5)?;
                Ok(AnalysisRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    entry_text: row.get(2)?,
                    emotions: serde_json::from_str(&emotions_json).unwrap_or_default(),
                    polarity: serde_json::from_str(&polarity_json).unwrap_or_default(),
                    topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                    reflection: row.get(6)?,
                    reflection_mode: row.get(7)?,
                    deeper_meaning: row.get(8)?,
                    ysym_triggered: row.get::<_, i64>(9)? != 0,
                    created_at: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Test seam for forcing storage failures.
    #[cfg(test)]
    pub fn raw_execute(&self, sql: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(sql, [])
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- User identities
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE,
            username TEXT,
            plan_type TEXT NOT NULL DEFAULT 'free',
            created_at TEXT NOT NULL
        );

        -- Bearer sessions
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        -- One record per successful user-mode orchestration
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            entry_text TEXT NOT NULL,
            emotions TEXT NOT NULL,
            polarity TEXT NOT NULL,
            topics TEXT NOT NULL,
            reflection TEXT NOT NULL,
            reflection_mode TEXT NOT NULL,
            deeper_meaning TEXT,
            ysym_triggered INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_analyses_user_created
            ON analyses(user_id, created_at);
        ",
    )?;
    Ok(())
}
