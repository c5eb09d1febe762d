//! Relational reader over the source task database.
//!
//! Nullable columns are read as `Option<T>`; a NULL never becomes an empty string
//! or a zero.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::info;

use crate::error::MigrateError;

/// Placeholder source location. Every deployment is expected to override it.
pub const DEFAULT_SOURCE: &str = "tasks.db";

/// How long a query waits on a locked source before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A row of `Users`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
}

/// A row of `Tasks`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub task_type: Option<String>,
    pub completed: bool,
    pub archived: bool,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub main_assignee_id: Option<i64>,
    pub supporting_assignees: Option<String>,
    pub schedule: Option<String>,
}

/// A row of `Subtasks`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskRow {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub completed: bool,
    pub main_assignee_id: Option<i64>,
    pub supporting_assignees: Option<String>,
    pub schedule: Option<String>,
}

/// Read-only handle on the source database.
pub struct SourceReader {
    conn: Connection,
}

impl SourceReader {
    /// Open the source read-only. `location` is a path or a SQLite `file:` URI.
    pub fn open(location: &str) -> Result<Self, MigrateError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(location, flags)
            .map_err(MigrateError::source_unavailable(format!("opening {location}")))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(MigrateError::source_unavailable("configuring connection"))?;
        // Opening is lazy; touch the schema so an unreachable source fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(MigrateError::source_unavailable(format!("opening {location}")))?;

        info!(source = %location, "source database opened");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn read_users(&self) -> Result<Vec<UserRow>, MigrateError> {
        self.select("SELECT id, name FROM Users ORDER BY id", "reading Users", |row| {
            Ok(UserRow {
                id: row.get("id")?,
                name: row.get("name")?,
            })
        })
    }

    pub fn read_tasks(&self) -> Result<Vec<TaskRow>, MigrateError> {
        self.select(
            "SELECT id, title, description, priority, type, completed, archived, pinned, \
             created_at, main_assignee_id, supporting_assignees, schedule \
             FROM Tasks ORDER BY id",
            "reading Tasks",
            |row| {
                Ok(TaskRow {
                    id: row.get("id")?,
                    title: row.get("title")?,
                    description: row.get("description")?,
                    priority: row.get("priority")?,
                    task_type: row.get("type")?,
                    completed: row.get("completed")?,
                    archived: row.get("archived")?,
                    pinned: row.get("pinned")?,
                    created_at: timestamp_column(row, "created_at")?,
                    main_assignee_id: row.get("main_assignee_id")?,
                    supporting_assignees: row.get("supporting_assignees")?,
                    schedule: row.get("schedule")?,
                })
            },
        )
    }

    pub fn read_subtasks(&self) -> Result<Vec<SubtaskRow>, MigrateError> {
        self.select(
            "SELECT id, task_id, title, completed, main_assignee_id, supporting_assignees, \
             schedule FROM Subtasks ORDER BY id",
            "reading Subtasks",
            |row| {
                Ok(SubtaskRow {
                    id: row.get("id")?,
                    task_id: row.get("task_id")?,
                    title: row.get("title")?,
                    completed: row.get("completed")?,
                    main_assignee_id: row.get("main_assignee_id")?,
                    supporting_assignees: row.get("supporting_assignees")?,
                    schedule: row.get("schedule")?,
                })
            },
        )
    }

    fn select<T, F>(&self, sql: &str, context: &str, map: F) -> Result<Vec<T>, MigrateError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(MigrateError::source_unavailable(context))?;
        let rows = stmt
            .query_map([], map)
            .map_err(MigrateError::source_unavailable(context))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(MigrateError::source_unavailable(context))
    }
}

/// Parse a source timestamp.
///
/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|n| n.and_utc()),
    }
}

fn timestamp_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(&raw).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}
