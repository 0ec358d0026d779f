//! SQLite store for fixdesk issues
//!
//! One row per issue. Timestamps are `YYYY-MM-DD HH:MM:SS` text in UTC so they
//! sort lexically.

use super::{RecordStore, poisoned};
use crate::id::next_id;
use crate::{Error, Issue, IssueId, Location, Result, Status, StatusChange, Visibility};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;

pub(crate) const DB_FILE: &str = "issues.db";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY,
    reporter TEXT NOT NULL,
    category TEXT NOT NULL,
    priority TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    assignee TEXT,
    remarks TEXT,
    visibility TEXT NOT NULL DEFAULT 'Public',
    hostel TEXT,
    block TEXT,
    room TEXT,
    image_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    assigned_at TEXT,
    in_progress_at TEXT,
    resolved_at TEXT,
    closed_at TEXT,
    parent_id INTEGER DEFAULT NULL
);
CREATE INDEX IF NOT EXISTS idx_issues_parent ON issues(parent_id);

CREATE TABLE IF NOT EXISTS issue_status_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL,
    old_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    changed_at TEXT NOT NULL,
    changed_by TEXT
);
CREATE INDEX IF NOT EXISTS idx_history_issue ON issue_status_history(issue_id);
"#;

const COLUMNS: &str = "id, reporter, category, priority, description, status, assignee, remarks,
    visibility, hostel, block, room, image_path, created_at, updated_at,
    assigned_at, in_progress_at, resolved_at, closed_at, parent_id";

impl ToSql for IssueId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let n = i64::try_from(self.0).map_err(|_| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(Error::InvalidId(self.to_string())))
        })?;
        Ok(ToSqlOutput::from(n))
    }
}

impl FromSql for IssueId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let n = i64::column_result(value)?;
        u64::try_from(n)
            .map(IssueId)
            .map_err(|_| FromSqlError::OutOfRange(n))
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for Visibility {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Visibility {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// Second-resolution text timestamp
struct SqlTime(DateTime<Utc>);

impl ToSql for SqlTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.format(TIME_FORMAT).to_string()))
    }
}

impl FromSql for SqlTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        NaiveDateTime::parse_from_str(value.as_str()?, TIME_FORMAT)
            .map(|t| SqlTime(t.and_utc()))
            .map_err(|_| FromSqlError::InvalidType)
    }
}

fn time(t: &DateTime<Utc>) -> SqlTime {
    SqlTime(*t)
}

fn opt_time(t: &Option<DateTime<Utc>>) -> Option<SqlTime> {
    t.as_ref().map(time)
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let created: SqlTime = row.get(13)?;
    let updated: SqlTime = row.get(14)?;
    let stamp = |idx: usize| -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row.get::<_, Option<SqlTime>>(idx)?.map(|t| t.0))
    };
    Ok(Issue {
        id: row.get(0)?,
        reporter: row.get(1)?,
        category: row.get(2)?,
        priority: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        assignee: row.get(6)?,
        remarks: row.get(7)?,
        visibility: row.get(8)?,
        location: Location {
            hostel: row.get(9)?,
            block: row.get(10)?,
            room: row.get(11)?,
        },
        image_path: row.get(12)?,
        created_at: created.0,
        updated_at: updated.0,
        assigned_at: stamp(15)?,
        in_progress_at: stamp(16)?,
        resolved_at: stamp(17)?,
        closed_at: stamp(18)?,
        parent_id: row.get(19)?,
    })
}

fn select_one(conn: &Connection, id: IssueId) -> rusqlite::Result<Option<Issue>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM issues WHERE id = ?1"),
        params![id],
        issue_from_row,
    )
    .optional()
}

fn write_row(conn: &Connection, issue: &Issue, insert: bool) -> rusqlite::Result<usize> {
    let sql = if insert {
        format!(
            "INSERT INTO issues ({COLUMNS}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
        )
    } else {
        "UPDATE issues SET reporter = ?2, category = ?3, priority = ?4, description = ?5,
             status = ?6, assignee = ?7, remarks = ?8, visibility = ?9, hostel = ?10,
             block = ?11, room = ?12, image_path = ?13, created_at = ?14, updated_at = ?15,
             assigned_at = ?16, in_progress_at = ?17, resolved_at = ?18, closed_at = ?19,
             parent_id = ?20
         WHERE id = ?1"
            .to_string()
    };
    conn.execute(
        &sql,
        params![
            issue.id,
            issue.reporter,
            issue.category,
            issue.priority,
            issue.description,
            issue.status,
            issue.assignee,
            issue.remarks,
            issue.visibility,
            issue.location.hostel,
            issue.location.block,
            issue.location.room,
            issue.image_path,
            time(&issue.created_at),
            time(&issue.updated_at),
            opt_time(&issue.assigned_at),
            opt_time(&issue.in_progress_at),
            opt_time(&issue.resolved_at),
            opt_time(&issue.closed_at),
            issue.parent_id,
        ],
    )
}

/// SQLite backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, path)
    }

    /// Private database that disappears with the handle
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, Path::new(":memory:"))
    }

    fn with_connection(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, build: &mut dyn FnMut(IssueId) -> Issue) -> Result<Issue> {
        let mut conn = self.conn.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        let max: IssueId =
            tx.query_row("SELECT COALESCE(MAX(id), 0) FROM issues", [], |r| r.get(0))?;
        let id = next_id(&[max])?;
        let mut issue = build(id);
        issue.id = id;
        write_row(&tx, &issue, true)?;
        tx.commit()?;
        Ok(issue)
    }

    fn get(&self, id: IssueId) -> Result<Option<Issue>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        Ok(select_one(&conn, id)?)
    }

    fn scan(&self) -> Result<Vec<Issue>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM issues ORDER BY id"))?;
        let rows = stmt.query_map([], issue_from_row)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    fn modify(&self, id: IssueId, apply: &mut dyn FnMut(&mut Issue) -> Result<()>) -> Result<Issue> {
        let mut conn = self.conn.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        let mut issue = select_one(&tx, id)?.ok_or(Error::NotFound(id))?;
        // dropping `tx` on error rolls back
        apply(&mut issue)?;
        issue.id = id;
        write_row(&tx, &issue, false)?;
        tx.commit()?;
        Ok(issue)
    }

    fn record_change(&self, change: &StatusChange) -> Result<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT INTO issue_status_history (issue_id, old_status, new_status, changed_at, changed_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                change.issue_id,
                change.old_status,
                change.new_status,
                time(&change.changed_at),
                change.changed_by,
            ],
        )?;
        Ok(())
    }

    fn history(&self, id: IssueId) -> Result<Vec<StatusChange>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT issue_id, old_status, new_status, changed_at, changed_by
             FROM issue_status_history WHERE issue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let changed_at: SqlTime = row.get(3)?;
            Ok(StatusChange {
                issue_id: row.get(0)?,
                old_status: row.get(1)?,
                new_status: row.get(2)?,
                changed_at: changed_at.0,
                changed_by: row.get(4)?,
            })
        })?;
        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    fn close(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
