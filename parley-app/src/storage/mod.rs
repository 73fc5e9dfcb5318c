//! SQLite persistence for rooms, scripts, sessions, the message log, leveling
//! progress and the topic catalog.
//!
//! One connection per operation. Every session transition runs inside a
//! single `IMMEDIATE` transaction so two requests for the same room cannot
//! interleave their read-decide-write steps.

mod cipher;
pub mod stats;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parley_core::{
    Completion, Exchange, LevelingPolicy, LevelingState, Outcome, ParleyError, ProgressionConfig,
    Script, Session, Tier, Topic,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, error, info};

use cipher::TextCipher;
pub use stats::{ScoreBucket, ScoreDistribution, ScoreStats};

/// Default title for a new room.
pub const DEFAULT_ROOM_TITLE: &str = "New Chat";

/// Assistant reply logged when the last exchange is accepted.
pub const COMPLETION_MESSAGE: &str =
    "Great job, you finished this conversation! Start a new topic to keep practicing.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("room {0} is no longer active")]
    RoomInactive(String),

    #[error("room {0} has no conversation yet")]
    NoSession(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Domain(#[from] ParleyError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub room_id: String,
    pub script_id: String,
    pub topic: String,
    pub tier: Tier,
    pub exchange_count: usize,
    pub index: usize,
    pub completion: Option<Completion>,
    /// The script came from the built-in library instead of the generator.
    pub fallback: bool,
    /// Exchange at the cursor; `None` once completed.
    pub current_prompt: Option<Exchange>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRecord {
    pub fn is_open(&self) -> bool {
        self.completion.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub session_id: Option<String>,
    pub role: Role,
    pub text: String,
    /// Expected response the text was scored against (user turns only).
    pub expected: Option<String>,
    pub score: Option<u8>,
    /// `advanced` | `retry` | `completed` (user turns only).
    pub outcome: Option<String>,
    pub created_at: String,
}

/// Everything `apply_turn` decided and persisted.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    /// Owner of the room.
    pub user_id: String,
    pub session: SessionRecord,
    pub outcome: Outcome,
    pub reply: String,
    pub progress: LevelingState,
    /// Set when this turn finished a script and crossed an unlock threshold.
    pub tier_unlocked: Option<Tier>,
    /// Time spent in scoring and alignment.
    pub scored_in: std::time::Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

struct NewMessage<'a> {
    room_id: &'a str,
    session_id: Option<&'a str>,
    role: Role,
    text: &'a str,
    expected: Option<&'a str>,
    score: Option<u8>,
    outcome: Option<&'a str>,
}

const SESSION_SELECT: &str = "SELECT s.id, s.room_id, s.script_id, sc.topic, sc.tier, sc.exchange_count,
        s.cursor, s.completion, sc.fallback, s.created_at, s.updated_at
 FROM sessions s JOIN scripts sc ON sc.id = s.script_id";

#[derive(Debug, Clone)]
pub struct LocalStore {
    db_path: PathBuf,
    cipher: TextCipher,
}

impl LocalStore {
    pub fn default_db_path() -> PathBuf {
        crate::settings::default_data_dir().join("parley.db")
    }

    pub fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            cipher: TextCipher::new(&db_path),
            db_path,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS rooms (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              title TEXT NOT NULL DEFAULT 'New Chat',
              active INTEGER NOT NULL DEFAULT 1,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scripts (
              id TEXT PRIMARY KEY,
              room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
              topic TEXT NOT NULL,
              tier TEXT NOT NULL,
              exchange_count INTEGER NOT NULL,
              fallback INTEGER NOT NULL DEFAULT 0,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS exchanges (
              script_id TEXT NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
              position INTEGER NOT NULL,
              prompt TEXT NOT NULL,
              expected TEXT NOT NULL,
              PRIMARY KEY (script_id, position)
            );

            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY,
              room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
              script_id TEXT NOT NULL REFERENCES scripts(id) ON DELETE CASCADE,
              cursor INTEGER NOT NULL DEFAULT 0,
              completion TEXT,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
              id TEXT PRIMARY KEY,
              room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
              session_id TEXT,
              role TEXT NOT NULL,
              text_enc TEXT NOT NULL,
              expected_enc TEXT,
              score INTEGER,
              outcome TEXT,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_progress (
              user_id TEXT PRIMARY KEY,
              completed_count INTEGER NOT NULL DEFAULT 0,
              tier TEXT NOT NULL DEFAULT 'easy',
              updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS topics (
              name TEXT PRIMARY KEY COLLATE NOCASE,
              description TEXT NOT NULL,
              tier TEXT NOT NULL,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
              ON sessions(room_id) WHERE completion IS NULL;
            CREATE INDEX IF NOT EXISTS idx_rooms_user ON rooms(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_scripts_room ON scripts(room_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    // ---- rooms ----------------------------------------------------------

    pub fn create_room(&self, user_id: &str, title: Option<&str>) -> Result<Room, StoreError> {
        let now = Utc::now().timestamp();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_ROOM_TITLE);
        let room = Room {
            id: new_id("room"),
            user_id: user_id.trim().to_string(),
            title: title.to_string(),
            active: true,
            created_at: ts_to_rfc3339(now),
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO rooms (id, user_id, title, active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
            params![room.id, room.user_id, room.title, now],
        )?;
        info!(room = %room.id, user = %room.user_id, "room created");
        Ok(room)
    }

    /// Active rooms for `user_id`, newest first.
    pub fn list_rooms(&self, user_id: &str) -> Result<Vec<Room>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, active, created_at FROM rooms
             WHERE user_id = ?1 AND active = 1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let mut rows = stmt.query(params![user_id.trim()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_room(row)?);
        }
        Ok(out)
    }

    pub fn get_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        let conn = self.open()?;
        load_room(&conn, room_id)
    }

    /// Hide a room and close its open session. Returns `false` when the room
    /// does not exist.
    pub fn deactivate_room(&self, room_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute("UPDATE rooms SET active = 0 WHERE id = ?1", params![room_id])?;
        if changed == 0 {
            return Ok(false);
        }
        supersede_open(&tx, room_id, Utc::now().timestamp())?;
        tx.commit()?;
        info!(room = %room_id, "room deactivated");
        Ok(true)
    }

    // ---- scripts & sessions ---------------------------------------------

    /// Persist `script` for `room_id` and open a session over it at index 0.
    /// Any session still open in the room is superseded first, inside the
    /// same transaction. The first prompt is logged as an assistant message.
    pub fn start_script(
        &self,
        room_id: &str,
        script: &Script,
        fallback: bool,
    ) -> Result<SessionRecord, StoreError> {
        let now = Utc::now().timestamp();
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let room =
            load_room(&tx, room_id)?.ok_or_else(|| StoreError::RoomNotFound(room_id.into()))?;
        if !room.active {
            return Err(StoreError::RoomInactive(room.id));
        }

        let superseded = supersede_open(&tx, room_id, now)?;
        if superseded > 0 {
            info!(room = %room_id, superseded, "closed previous session");
        }

        let script_id = new_id("script");
        tx.execute(
            "INSERT INTO scripts (id, room_id, topic, tier, exchange_count, fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                script_id,
                room_id,
                script.topic(),
                script.tier().as_str(),
                script.len() as i64,
                if fallback { 1_i64 } else { 0_i64 },
                now,
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO exchanges (script_id, position, prompt, expected) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, exchange) in script.exchanges().iter().enumerate() {
                insert.execute(params![
                    script_id,
                    position as i64,
                    exchange.prompt,
                    exchange.expected_response
                ])?;
            }
        }

        let session_id = new_id("sess");
        tx.execute(
            "INSERT INTO sessions (id, room_id, script_id, cursor, completion, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, NULL, ?4, ?4)",
            params![session_id, room_id, script_id, now],
        )?;

        if let Some(first) = script.get(0) {
            insert_message(
                &tx,
                &self.cipher,
                &NewMessage {
                    room_id,
                    session_id: Some(&session_id),
                    role: Role::Assistant,
                    text: &first.prompt,
                    expected: None,
                    score: None,
                    outcome: None,
                },
                now,
            )?;
        }

        ensure_single_open(&tx, room_id)?;
        tx.commit()?;

        info!(
            room = %room_id,
            session = %session_id,
            topic = script.topic(),
            tier = %script.tier(),
            exchanges = script.len(),
            fallback,
            "script started"
        );

        Ok(SessionRecord {
            id: session_id,
            room_id: room_id.to_string(),
            script_id,
            topic: script.topic().to_string(),
            tier: script.tier(),
            exchange_count: script.len(),
            index: 0,
            completion: None,
            fallback,
            current_prompt: script.get(0).cloned(),
            created_at: ts_to_rfc3339(now),
            updated_at: ts_to_rfc3339(now),
        })
    }

    /// The room's single open session, if any.
    pub fn open_session(&self, room_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.open()?;
        let mut open = load_sessions(
            &conn,
            &format!("{SESSION_SELECT} WHERE s.room_id = ?1 AND s.completion IS NULL"),
            room_id,
        )?;
        if open.len() > 1 {
            error!(room = %room_id, open = open.len(), "multiple open sessions in one room");
            return Err(ParleyError::InvariantViolation(format!(
                "room {room_id} has {} open sessions",
                open.len()
            ))
            .into());
        }
        let Some(mut record) = open.pop() else {
            return Ok(None);
        };
        record.current_prompt = load_exchange(&conn, &record.script_id, record.index)?;
        Ok(Some(record))
    }

    /// Every session of the room, oldest first.
    pub fn list_sessions(&self, room_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.open()?;
        let mut sessions = load_sessions(
            &conn,
            &format!("{SESSION_SELECT} WHERE s.room_id = ?1 ORDER BY s.created_at ASC, s.rowid ASC"),
            room_id,
        )?;
        for record in sessions.iter_mut().filter(|s| s.is_open()) {
            record.current_prompt = load_exchange(&conn, &record.script_id, record.index)?;
        }
        Ok(sessions)
    }

    /// Score `candidate` against the room's open session and persist the
    /// result: cursor/completion, the user and assistant messages, and the
    /// owner's leveling counters when the script finishes.
    ///
    /// Nothing is written when the submission is rejected (`EmptyInput`,
    /// `TerminalState`).
    pub fn apply_turn(
        &self,
        room_id: &str,
        candidate: &str,
        config: &ProgressionConfig,
        policy: &LevelingPolicy,
    ) -> Result<TurnRecord, StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let room =
            load_room(&tx, room_id)?.ok_or_else(|| StoreError::RoomNotFound(room_id.into()))?;
        if !room.active {
            return Err(StoreError::RoomInactive(room.id));
        }

        let mut latest = load_sessions(
            &tx,
            &format!(
                "{SESSION_SELECT} WHERE s.room_id = ?1
                 ORDER BY (s.completion IS NULL) DESC, s.created_at DESC, s.rowid DESC LIMIT 1"
            ),
            room_id,
        )?;
        let Some(mut record) = latest.pop() else {
            return Err(StoreError::NoSession(room_id.into()));
        };
        if record.completion.is_some() {
            return Err(ParleyError::TerminalState.into());
        }

        let script = Arc::new(load_script(&tx, &record)?);
        let mut session = Session::resume(script, *config, record.index, record.completion)
            .inspect_err(|e| error!(room = %room_id, session = %record.id, "{e}"))?;
        let started = Instant::now();
        let outcome = session.submit(candidate)?;
        let scored_in = started.elapsed();

        let now = Utc::now().timestamp();
        tx.execute(
            "UPDATE sessions SET cursor = ?1, completion = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                session.index() as i64,
                session.completion().map(Completion::as_str),
                now,
                record.id
            ],
        )?;

        let turn = outcome.turn();
        insert_message(
            &tx,
            &self.cipher,
            &NewMessage {
                room_id,
                session_id: Some(&record.id),
                role: Role::User,
                text: &turn.candidate,
                expected: Some(&turn.expected),
                score: Some(turn.score),
                outcome: Some(outcome.label()),
            },
            now,
        )?;
        let reply = outcome
            .next_prompt()
            .map(|e| e.prompt.clone())
            .unwrap_or_else(|| COMPLETION_MESSAGE.to_string());
        insert_message(
            &tx,
            &self.cipher,
            &NewMessage {
                room_id,
                session_id: Some(&record.id),
                role: Role::Assistant,
                text: &reply,
                expected: None,
                score: None,
                outcome: None,
            },
            now,
        )?;

        let mut progress = load_progress(&tx, &room.user_id)?;
        let tier_unlocked = if session.completion() == Some(Completion::Finished) {
            let unlocked = progress.record_completion(policy);
            save_progress(&tx, &room.user_id, &progress, now)?;
            unlocked
        } else {
            None
        };

        tx.commit()?;

        debug!(
            room = %room_id,
            session = %record.id,
            score = turn.score,
            outcome = outcome.label(),
            index = session.index(),
            "turn applied"
        );
        if let Some(tier) = tier_unlocked {
            info!(user = %room.user_id, %tier, completed = progress.completed_count, "tier unlocked");
        }

        record.index = session.index();
        record.completion = session.completion();
        record.current_prompt = session.current_prompt().cloned();
        record.updated_at = ts_to_rfc3339(now);

        Ok(TurnRecord {
            user_id: room.user_id,
            session: record,
            outcome,
            reply,
            progress,
            tier_unlocked,
            scored_in,
        })
    }

    // ---- messages -------------------------------------------------------

    /// Message log of a room in chronological order. Rows that no longer
    /// decrypt are skipped.
    pub fn list_messages(&self, room_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, room_id, session_id, role, text_enc, expected_enc, score, outcome, created_at
             FROM messages WHERE room_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let mut rows = stmt.query(params![room_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let enc: String = row.get(4)?;
            let Some(text) = self.cipher.decrypt(&enc) else {
                continue;
            };
            let expected = row
                .get::<_, Option<String>>(5)?
                .and_then(|e| self.cipher.decrypt(&e));
            let role_raw: String = row.get(3)?;
            let role = Role::parse(&role_raw)
                .ok_or_else(|| StoreError::Corrupt(format!("message role '{role_raw}'")))?;
            out.push(MessageRecord {
                id: row.get(0)?,
                room_id: row.get(1)?,
                session_id: row.get(2)?,
                role,
                text,
                expected,
                score: row
                    .get::<_, Option<i64>>(6)?
                    .map(|s| s.clamp(0, 100) as u8),
                outcome: row.get(7)?,
                created_at: ts_to_rfc3339(row.get(8)?),
            });
        }
        Ok(out)
    }

    pub fn prune_messages(&self, retention_days: usize) -> Result<usize, StoreError> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let conn = self.open()?;
        let changed = conn.execute(
            "DELETE FROM messages WHERE created_at < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(changed)
    }

    pub fn score_stats(&self, user_id: &str, range_days: usize) -> Result<ScoreStats, StoreError> {
        let range_days = range_days.clamp(1, 365);
        let now = Utc::now();
        let cutoff = now - Duration::days(range_days as i64);
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT m.created_at, m.score FROM messages m
             JOIN rooms r ON r.id = m.room_id
             WHERE r.user_id = ?1 AND m.role = 'user' AND m.score IS NOT NULL AND m.created_at >= ?2
             ORDER BY m.created_at ASC",
        )?;
        let mut rows = stmt.query(params![user_id.trim(), cutoff.timestamp()])?;
        let mut scored = Vec::new();
        while let Some(row) = rows.next()? {
            let ts: i64 = row.get(0)?;
            let score: i64 = row.get(1)?;
            scored.push((ts, score.clamp(0, 100) as u8));
        }
        Ok(stats::aggregate(&scored, range_days, now))
    }

    // ---- leveling -------------------------------------------------------

    pub fn get_progress(&self, user_id: &str) -> Result<LevelingState, StoreError> {
        let conn = self.open()?;
        load_progress(&conn, user_id.trim())
    }

    // ---- topics ---------------------------------------------------------

    /// Upsert the catalog by name (case-insensitive).
    pub fn seed_topics(&self, catalog: &[Topic]) -> Result<SeedReport, StoreError> {
        let now = Utc::now().timestamp();
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut report = SeedReport::default();
        for topic in catalog {
            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT description, tier FROM topics WHERE name = ?1",
                    params![topic.name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO topics (name, description, tier, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![topic.name, topic.description, topic.tier.as_str(), now],
                    )?;
                    report.created += 1;
                }
                Some((description, tier))
                    if description == topic.description && tier == topic.tier.as_str() =>
                {
                    report.unchanged += 1;
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE topics SET description = ?2, tier = ?3, updated_at = ?4 WHERE name = ?1",
                        params![topic.name, topic.description, topic.tier.as_str(), now],
                    )?;
                    report.updated += 1;
                }
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// Topics whose tier is in `tiers`, easiest first.
    pub fn list_topics(&self, tiers: &BTreeSet<Tier>) -> Result<Vec<Topic>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT name, description, tier FROM topics ORDER BY rowid ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let tier = parse_tier(&row.get::<_, String>(2)?)?;
            if !tiers.contains(&tier) {
                continue;
            }
            out.push(Topic {
                name: row.get(0)?,
                description: row.get(1)?,
                tier,
            });
        }
        out.sort_by_key(|t| t.tier);
        Ok(out)
    }

    /// Topics of the user's most recent scripts, newest first.
    pub fn recent_topics(&self, user_id: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT sc.topic FROM scripts sc JOIN rooms r ON r.id = sc.room_id
             WHERE r.user_id = ?1
             ORDER BY sc.created_at DESC, sc.rowid DESC LIMIT ?2",
        )?;
        let topics = stmt
            .query_map(params![user_id.trim(), limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(topics)
    }
}

fn read_room(row: &Row<'_>) -> Result<Room, StoreError> {
    Ok(Room {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: ts_to_rfc3339(row.get(4)?),
    })
}

fn load_room(conn: &Connection, room_id: &str) -> Result<Option<Room>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, user_id, title, active, created_at FROM rooms WHERE id = ?1")?;
    let mut rows = stmt.query(params![room_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_room(row)?)),
        None => Ok(None),
    }
}

fn load_sessions(conn: &Connection, sql: &str, room_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![room_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let completion = match row.get::<_, Option<String>>(7)? {
            None => None,
            Some(raw) => Some(
                Completion::parse(&raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("session completion '{raw}'")))?,
            ),
        };
        out.push(SessionRecord {
            id: row.get(0)?,
            room_id: row.get(1)?,
            script_id: row.get(2)?,
            topic: row.get(3)?,
            tier: parse_tier(&row.get::<_, String>(4)?)?,
            exchange_count: row.get::<_, i64>(5)?.max(0) as usize,
            index: row.get::<_, i64>(6)?.max(0) as usize,
            completion,
            fallback: row.get::<_, i64>(8)? != 0,
            current_prompt: None,
            created_at: ts_to_rfc3339(row.get(9)?),
            updated_at: ts_to_rfc3339(row.get(10)?),
        });
    }
    Ok(out)
}

fn load_exchange(
    conn: &Connection,
    script_id: &str,
    position: usize,
) -> Result<Option<Exchange>, StoreError> {
    let exchange = conn
        .query_row(
            "SELECT prompt, expected FROM exchanges WHERE script_id = ?1 AND position = ?2",
            params![script_id, position as i64],
            |row| Ok(Exchange::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    Ok(exchange)
}

fn load_script(conn: &Connection, record: &SessionRecord) -> Result<Script, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT prompt, expected FROM exchanges WHERE script_id = ?1 ORDER BY position ASC",
    )?;
    let exchanges = stmt
        .query_map(params![record.script_id], |row| {
            Ok(Exchange::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if exchanges.len() != record.exchange_count {
        return Err(StoreError::Corrupt(format!(
            "script {} has {} exchanges, expected {}",
            record.script_id,
            exchanges.len(),
            record.exchange_count
        )));
    }
    Ok(Script::new(record.topic.clone(), record.tier, exchanges)?)
}

/// Close every open session in the room, keeping its cursor.
fn supersede_open(tx: &Transaction<'_>, room_id: &str, now: i64) -> Result<usize, StoreError> {
    let changed = tx.execute(
        "UPDATE sessions SET completion = ?1, updated_at = ?2
         WHERE room_id = ?3 AND completion IS NULL",
        params![Completion::Superseded.as_str(), now, room_id],
    )?;
    Ok(changed)
}

fn ensure_single_open(tx: &Transaction<'_>, room_id: &str) -> Result<(), StoreError> {
    let open: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sessions WHERE room_id = ?1 AND completion IS NULL",
        params![room_id],
        |row| row.get(0),
    )?;
    if open > 1 {
        error!(room = %room_id, open, "multiple open sessions in one room");
        return Err(ParleyError::InvariantViolation(format!(
            "room {room_id} has {open} open sessions"
        ))
        .into());
    }
    Ok(())
}

fn insert_message(
    tx: &Transaction<'_>,
    cipher: &TextCipher,
    message: &NewMessage<'_>,
    now: i64,
) -> Result<(), StoreError> {
    let text_enc = cipher.encrypt(message.text)?;
    let expected_enc = message.expected.map(|e| cipher.encrypt(e)).transpose()?;
    tx.execute(
        "INSERT INTO messages (id, room_id, session_id, role, text_enc, expected_enc, score, outcome, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new_id("msg"),
            message.room_id,
            message.session_id,
            message.role.as_str(),
            text_enc,
            expected_enc,
            message.score.map(i64::from),
            message.outcome,
            now,
        ],
    )?;
    Ok(())
}

fn load_progress(conn: &Connection, user_id: &str) -> Result<LevelingState, StoreError> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT completed_count, tier FROM user_progress WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        None => Ok(LevelingState::default()),
        Some((count, tier)) => Ok(LevelingState {
            completed_count: count.clamp(0, i64::from(u32::MAX)) as u32,
            tier: parse_tier(&tier)?,
        }),
    }
}

fn save_progress(
    tx: &Transaction<'_>,
    user_id: &str,
    state: &LevelingState,
    now: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO user_progress (user_id, completed_count, tier, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             completed_count = excluded.completed_count,
             tier = excluded.tier,
             updated_at = excluded.updated_at",
        params![user_id, i64::from(state.completed_count), state.tier.as_str(), now],
    )?;
    Ok(())
}

fn parse_tier(raw: &str) -> Result<Tier, StoreError> {
    raw.parse::<Tier>().map_err(StoreError::Corrupt)
}

fn ts_to_rfc3339(ts: i64) -> String {
    let dt: DateTime<Utc> = Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now);
    dt.to_rfc3339()
}

fn new_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:08x}",
        Utc::now().timestamp_micros(),
        rand::random::<u32>()
    )
}
