//src/db.rs
use rusqlite::{named_params, params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::WorkoutLog;
use crate::session::SessionSnapshot;

const DB_FILE_NAME: &str = "workouts.sqlite";
const APP_DATA_DIR: &str = "workout-logger";
const DATA_ENV_VAR: &str = "WORKOUT_LOGGER_DATA_DIR";
const SNAPSHOT_SLOT: i64 = 1;

// Custom Error type for DB operations
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Workout log already stored: ID {0}")]
    DuplicateLog(String),
    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("Stored {what} is corrupt: {source}")]
    Corrupt {
        what: &'static str,
        source: serde_json::Error,
    },
}

/// User preferences kept alongside the workout history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Preference {
    Theme,
    BodyweightMode,
    SheetId,
    AuthToken,
}

/// Gets the path to the SQLite database file within the app's data directory.
pub fn get_db_path() -> Result<PathBuf, DbError> {
    let app_dir = match std::env::var(DATA_ENV_VAR) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::data_dir().ok_or(DbError::DataDir)?.join(APP_DATA_DIR),
    };
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, DbError> {
    let conn = Connection::open(path).map_err(DbError::Connection)?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS workout_logs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            date TEXT NOT NULL, -- RFC3339, duplicated from payload for ad hoc queries
            workout_type TEXT NOT NULL,
            payload TEXT NOT NULL -- JSON in the local log record shape
        )",
        [],
    )
    .map_err(DbError::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_snapshot (
            slot INTEGER PRIMARY KEY CHECK(slot = 1), -- at most one in-progress session
            saved_at TEXT NOT NULL,
            payload TEXT NOT NULL
        )",
        [],
    )
    .map_err(DbError::Connection)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )
    .map_err(DbError::Connection)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workout_logs_type ON workout_logs(workout_type)",
        [],
    )
    .map_err(DbError::Connection)?;

    Ok(())
}

/// Durable local storage. Every write is a single statement, so a failed
/// write leaves the previous state in place.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) the database file and ensures the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::from_connection(open_db(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Appends a finished session. Logs are append-only.
    pub fn append_workout_log(&self, log: &WorkoutLog) -> Result<(), DbError> {
        let payload = serde_json::to_string(log).map_err(|source| DbError::Encode {
            what: "workout log",
            source,
        })?;
        let result = self.conn.execute(
            "INSERT INTO workout_logs (id, date, workout_type, payload)
             VALUES (:id, :date, :workout_type, :payload)",
            named_params! {
                ":id": log.id,
                ":date": log.date.to_rfc3339(),
                ":workout_type": log.workout_type,
                ":payload": payload,
            },
        );
        match result {
            Ok(_) => {
                debug!("Stored workout log {}", log.id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(DbError::DuplicateLog(log.id.clone()))
            }
            Err(e) => Err(DbError::InsertFailed(e)),
        }
    }

    /// All stored logs in the order they were appended. Rows whose payload no
    /// longer decodes are skipped with a warning.
    pub fn list_workout_logs(&self) -> Result<Vec<WorkoutLog>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM workout_logs ORDER BY seq ASC")
            .map_err(DbError::QueryFailed)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(DbError::QueryFailed)?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(DbError::QueryFailed)?;
            match serde_json::from_str::<WorkoutLog>(&payload) {
                Ok(log) => logs.push(log),
                Err(e) => warn!("Skipping unreadable workout log {id}: {e}"),
            }
        }
        Ok(logs)
    }

    /// Deletes every stored workout log. Returns the number removed.
    pub fn clear_workout_logs(&self) -> Result<usize, DbError> {
        self.conn
            .execute("DELETE FROM workout_logs", [])
            .map_err(DbError::DeleteFailed)
    }

    /// Overwrites the recovery snapshot (last writer wins).
    pub fn save_session_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), DbError> {
        let payload = serde_json::to_string(snapshot).map_err(|source| DbError::Encode {
            what: "session snapshot",
            source,
        })?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO session_snapshot (slot, saved_at, payload)
                 VALUES (?1, ?2, ?3)",
                params![SNAPSHOT_SLOT, snapshot.saved_at.to_rfc3339(), payload],
            )
            .map_err(DbError::InsertFailed)?;
        Ok(())
    }

    pub fn load_session_snapshot(&self) -> Result<Option<SessionSnapshot>, DbError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM session_snapshot WHERE slot = ?1",
                params![SNAPSHOT_SLOT],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::QueryFailed)?;

        payload
            .map(|p| {
                serde_json::from_str(&p).map_err(|source| DbError::Corrupt {
                    what: "session snapshot",
                    source,
                })
            })
            .transpose()
    }

    /// Removes the recovery snapshot. Returns whether one existed.
    pub fn clear_session_snapshot(&self) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM session_snapshot WHERE slot = ?1",
                params![SNAPSHOT_SLOT],
            )
            .map_err(DbError::DeleteFailed)?;
        Ok(rows > 0)
    }

    pub fn save_preference(&self, pref: Preference, value: &str) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
                params![pref.as_ref(), value],
            )
            .map_err(DbError::InsertFailed)?;
        Ok(())
    }

    pub fn load_preference(&self, pref: Preference) -> Result<Option<String>, DbError> {
        self.conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![pref.as_ref()],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::QueryFailed)
    }

    pub fn remove_preference(&self, pref: Preference) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM preferences WHERE key = ?1",
                params![pref.as_ref()],
            )
            .map_err(DbError::DeleteFailed)?;
        Ok(rows > 0)
    }

    /// Boolean preference; anything but "true" reads as off.
    pub fn load_flag(&self, pref: Preference) -> Result<bool, DbError> {
        Ok(self.load_preference(pref)?.as_deref() == Some("true"))
    }

    pub fn save_flag(&self, pref: Preference, enabled: bool) -> Result<(), DbError> {
        self.save_preference(pref, if enabled { "true" } else { "false" })
    }
}
