//! Append-only audit trail.
//!
//! # Invariants
//! - Rows are only appended, inside the same transaction as the change they
//!   describe.
//! - Listing order is insertion order (`id ASC`).

use crate::model::activity::{ActivityEntry, NewActivity};
use crate::model::notice::NoticeId;
use crate::repo::{ensure_connection_ready, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};

/// Read access to the audit trail.
pub trait ActivityRepository {
    /// Lists audit rows for one notice, oldest first.
    fn list_for_notice(&self, notice_uuid: NoticeId) -> RepoResult<Vec<ActivityEntry>>;
}

/// SQLite-backed audit trail reader.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "activity_log",
            &["id", "actor_uuid", "action", "notice_uuid", "detail", "created_at"],
        )?;
        Ok(Self { conn })
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn list_for_notice(&self, notice_uuid: NoticeId) -> RepoResult<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_uuid, action, notice_uuid, department_uuid, detail, created_at
             FROM activity_log
             WHERE notice_uuid = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([notice_uuid.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_activity_row(row)?);
        }
        Ok(entries)
    }
}

/// Appends one audit row on `conn`, which is normally an open transaction.
pub(crate) fn append_activity(conn: &Connection, entry: &NewActivity) -> RepoResult<i64> {
    conn.execute(
        "INSERT INTO activity_log (
            actor_uuid,
            action,
            notice_uuid,
            department_uuid,
            detail,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            entry.actor_uuid.map(|value| value.to_string()),
            entry.action,
            entry.notice_uuid.map(|value| value.to_string()),
            entry.department_uuid.map(|value| value.to_string()),
            entry.detail.as_deref(),
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<ActivityEntry> {
    let actor_uuid = row
        .get::<_, Option<String>>("actor_uuid")?
        .map(|value| parse_uuid(&value, "activity_log.actor_uuid"))
        .transpose()?;
    let notice_uuid = row
        .get::<_, Option<String>>("notice_uuid")?
        .map(|value| parse_uuid(&value, "activity_log.notice_uuid"))
        .transpose()?;
    let department_uuid = row
        .get::<_, Option<String>>("department_uuid")?
        .map(|value| parse_uuid(&value, "activity_log.department_uuid"))
        .transpose()?;

    Ok(ActivityEntry {
        id: row.get("id")?,
        actor_uuid,
        action: row.get("action")?,
        notice_uuid,
        department_uuid,
        detail: row.get("detail")?,
        created_at: row.get("created_at")?,
    })
}
