//! SQLite-backed local store
//!
//! Entities are stored as JSON documents keyed by `(record_type, key)`.
//! Every save is announced on the attached [`ChangeNotifier`], if any.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::local::LocalStore;
use super::migrations::run_migrations;
use crate::error::{Result, WalkSyncError};
use crate::events::ChangeNotifier;
use crate::sync::RecordType;
use crate::types::{Entity, SyncMarker};

/// Storage engine wrapping SQLite
pub struct Storage {
    db_path: String,
    conn: Arc<Mutex<Connection>>,
    notifier: Option<ChangeNotifier>,
}

impl Storage {
    /// Open or create a database at the given path
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;

        // Run migrations
        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            notifier: None,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Announce saves on a notifier
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Create a new connection with appropriate pragmas
    fn create_connection(db_path: &str) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(db_path, flags)?
        };

        // WAL for crash recovery; local data must stay durable across restarts
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Number of stored entities of one type
    pub fn count<T: Entity>(&self) -> Result<i64> {
        self.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE record_type = ?",
                params![T::RECORD_TYPE.as_str()],
                |row| row.get(0),
            )?)
        })
    }

    fn notify(&self, record_type: RecordType, key: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.local_changed(record_type, key);
        }
    }
}

impl LocalStore for Storage {
    fn load<T: Entity>(&self, key: &str) -> Result<Option<T>> {
        let body: Option<String> = self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT body FROM entities WHERE record_type = ? AND key = ?",
                    params![T::RECORD_TYPE.as_str(), key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        body.map(|body| serde_json::from_str(&body).map_err(WalkSyncError::from))
            .transpose()
    }

    fn save<T: Entity>(&self, value: &T) -> Result<()> {
        let key = value.key();
        let body = serde_json::to_string(value)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entities (record_type, key, body, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(record_type, key) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![T::RECORD_TYPE.as_str(), key, body, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })?;

        self.notify(T::RECORD_TYPE, &key);
        Ok(())
    }

    fn load_all<T: Entity>(&self) -> Result<Vec<T>> {
        let bodies: Vec<String> = self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT body FROM entities WHERE record_type = ? ORDER BY key")?;
            let rows = stmt.query_map(params![T::RECORD_TYPE.as_str()], |row| row.get(0))?;
            Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
        })?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(WalkSyncError::from))
            .collect()
    }

    fn save_many<T: Entity>(&self, values: &[T]) -> Result<()> {
        let rows = values
            .iter()
            .map(|value| Ok((value.key(), serde_json::to_string(value)?)))
            .collect::<Result<Vec<(String, String)>>>()?;

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            {
                let now = Utc::now().to_rfc3339();
                let mut stmt = tx.prepare(
                    "INSERT INTO entities (record_type, key, body, updated_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(record_type, key) DO UPDATE SET
                        body = excluded.body,
                        updated_at = excluded.updated_at",
                )?;
                for (key, body) in &rows {
                    stmt.execute(params![T::RECORD_TYPE.as_str(), key, body, now])?;
                }
            }
            tx.commit()?;
        }

        for (key, _) in &rows {
            self.notify(T::RECORD_TYPE, key);
        }
        Ok(())
    }

    fn load_sync_marker(&self) -> Result<SyncMarker> {
        self.with_connection(|conn| {
            let (last_sync, last_error): (Option<String>, Option<String>) = conn.query_row(
                "SELECT last_sync, last_error FROM sync_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(SyncMarker {
                last_sync: last_sync.and_then(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok()
                }),
                last_error,
            })
        })
    }

    fn save_sync_marker(&self, marker: &SyncMarker) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE sync_state SET last_sync = ?, last_error = ? WHERE id = 1",
                params![
                    marker.last_sync.map(|dt| dt.to_rfc3339()),
                    marker.last_error
                ],
            )?;
            Ok(())
        })
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            conn: self.conn.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
