//! Durable storage: answer key lifecycle and append-only score records.
//!
//! One SQLite database holds both tables. The key lifecycle is
//! create → edit (repeated) → lock → consumed by grading runs → reset;
//! while locked, every edit path fails until an explicit reset. Score
//! records are append-only: a student accumulates one row per attempt and
//! nothing ever overwrites an existing row.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::key::AnswerKey;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS answer_key (
  item INTEGER PRIMARY KEY,
  answer TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS key_meta (
  k TEXT PRIMARY KEY,
  v TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scores (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  student_id TEXT NOT NULL,
  correct INTEGER NOT NULL,
  total INTEGER NOT NULL,
  recorded_at INTEGER NOT NULL
);
";

const META_LOCKED: &str = "locked";

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Edit attempted while the key is locked.
    KeyLocked,
    /// Lock attempted on an empty key.
    KeyEmpty,
    /// Lock attempted while the key has a gap at this item.
    KeyNotContiguous { missing_item: usize },
    /// Item numbers start at 1.
    InvalidItem(usize),
    /// Answers are single uppercase letters.
    InvalidAnswer { item: usize, answer: char },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "database error: {}", e),
            Self::KeyLocked => write!(f, "answer key is locked; reset it before editing"),
            Self::KeyEmpty => write!(f, "cannot lock an empty answer key"),
            Self::KeyNotContiguous { missing_item } => write!(
                f,
                "cannot lock: answer key has no entry for item {}",
                missing_item
            ),
            Self::InvalidItem(item) => write!(f, "item numbers start at 1, got {}", item),
            Self::InvalidAnswer { item, answer } => write!(
                f,
                "item {}: answer '{}' is not an uppercase choice letter",
                item, answer
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// One durable grading result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreRecord {
    pub student_id: String,
    pub correct: usize,
    pub total: usize,
    /// Unix seconds at append time.
    pub recorded_at: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Store ────────────────────────────────────────────────────────────────

/// SQLite-backed store for the answer key and score records.
pub struct GradeStore {
    conn: Connection,
}

impl GradeStore {
    /// Open (and create if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Answer key ───────────────────────────────────────────────────────

    /// Whether the key is currently locked.
    pub fn is_key_locked(&self) -> Result<bool, StoreError> {
        let v: Option<String> = self
            .conn
            .query_row(
                "SELECT v FROM key_meta WHERE k = ?1",
                params![META_LOCKED],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.as_deref() == Some("1"))
    }

    fn set_locked(&self, locked: bool) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO key_meta (k, v) VALUES (?1, ?2)",
            params![META_LOCKED, if locked { "1" } else { "0" }],
        )?;
        Ok(())
    }

    /// Set (or overwrite) one item's answer. Fails while the key is locked.
    pub fn set_key_item(&mut self, item: usize, answer: char) -> Result<(), StoreError> {
        if item == 0 {
            return Err(StoreError::InvalidItem(item));
        }
        if !answer.is_ascii_uppercase() {
            return Err(StoreError::InvalidAnswer { item, answer });
        }
        if self.is_key_locked()? {
            return Err(StoreError::KeyLocked);
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO answer_key (item, answer) VALUES (?1, ?2)",
            params![item as i64, answer.to_string()],
        )?;
        Ok(())
    }

    /// All key entries in item order, locked or not.
    pub fn key_items(&self) -> Result<Vec<(usize, char)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT item, answer FROM answer_key ORDER BY item")?;
        let rows = stmt.query_map([], |row| {
            let item: i64 = row.get(0)?;
            let answer: String = row.get(1)?;
            Ok((item as usize, answer.chars().next().unwrap_or('?')))
        })?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Freeze the key. Requires a contiguous 1..=N run of items.
    pub fn lock_key(&mut self) -> Result<(), StoreError> {
        let items = self.key_items()?;
        if items.is_empty() {
            return Err(StoreError::KeyEmpty);
        }
        for (expected, (item, _)) in items.iter().enumerate() {
            if *item != expected + 1 {
                return Err(StoreError::KeyNotContiguous {
                    missing_item: expected + 1,
                });
            }
        }
        self.set_locked(true)?;
        tracing::info!(items = items.len(), "answer key locked");
        Ok(())
    }

    /// Clear the key and unlock it.
    pub fn reset_key(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM answer_key", [])?;
        self.set_locked(false)?;
        tracing::info!("answer key reset");
        Ok(())
    }

    /// The locked key, or `None` while unlocked. This is the only key
    /// accessor the grading path uses.
    pub fn current_locked_key(&self) -> Result<Option<AnswerKey>, StoreError> {
        if !self.is_key_locked()? {
            return Ok(None);
        }
        let answers: Vec<char> = self.key_items()?.into_iter().map(|(_, c)| c).collect();
        // Contiguity and non-emptiness were enforced at lock time.
        let key = AnswerKey::from_answers(answers)
            .map_err(|_| StoreError::KeyEmpty)?;
        Ok(Some(key))
    }

    // ── Score records ────────────────────────────────────────────────────

    /// Append one grading result. Never updates an existing row.
    pub fn append_record(
        &mut self,
        student_id: &str,
        correct: usize,
        total: usize,
    ) -> Result<ScoreRecord, StoreError> {
        let record = ScoreRecord {
            student_id: student_id.to_string(),
            correct,
            total,
            recorded_at: unix_now(),
        };
        self.conn.execute(
            "INSERT INTO scores (student_id, correct, total, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.student_id,
                record.correct as i64,
                record.total as i64,
                record.recorded_at as i64
            ],
        )?;
        Ok(record)
    }

    /// All records, newest first.
    pub fn list_records(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, correct, total, recorded_at FROM scores
             ORDER BY recorded_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let correct: i64 = row.get(1)?;
            let total: i64 = row.get(2)?;
            let recorded_at: i64 = row.get(3)?;
            Ok(ScoreRecord {
                student_id: row.get(0)?,
                correct: correct as usize,
                total: total as usize,
                recorded_at: recorded_at as u64,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
