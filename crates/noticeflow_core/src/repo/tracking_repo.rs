//! Delivery tracking repository.
//!
//! # Responsibility
//! - Materialize at most one tracking row per `(notice, department)`.
//! - Apply view/download events as single conditional statements.
//!
//! # Invariants
//! - Inserts use `INSERT OR IGNORE` on the composite key; duplicates are no-ops.
//! - `viewed_at` only changes from NULL; `downloaded` only changes to 1.
//! - Timestamps returned by `mark_*` are re-read from storage, so callers see
//!   the winning write under contention.

use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use crate::model::tracking::TrackingRecord;
use crate::repo::{ensure_connection_ready, parse_flag, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const TRACKING_SELECT_SQL: &str = "SELECT
    notice_uuid,
    department_uuid,
    created_at,
    viewed_at,
    downloaded,
    downloaded_at
FROM tracking_records";

/// Repository interface for tracking rows.
pub trait TrackingRepository {
    /// Creates the row unless it exists. Returns `true` when a row was created.
    fn insert_if_absent(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        created_at: i64,
    ) -> RepoResult<bool>;
    fn get_record(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    ) -> RepoResult<Option<TrackingRecord>>;
    /// Sets `viewed_at` when unset and returns the stored record.
    fn mark_viewed(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> RepoResult<TrackingRecord>;
    /// Sets the download flag, its first timestamp and a missing view.
    fn mark_downloaded(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> RepoResult<TrackingRecord>;
    /// Lists rows for one notice ordered by department id.
    fn list_for_notice(&self, notice_uuid: NoticeId) -> RepoResult<Vec<TrackingRecord>>;
    /// Lists downloaded rows for one department, newest download first.
    fn list_downloads_for_department(
        &self,
        department_uuid: DepartmentId,
    ) -> RepoResult<Vec<TrackingRecord>>;
}

/// SQLite-backed tracking repository.
pub struct SqliteTrackingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTrackingRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "tracking_records",
            &[
                "notice_uuid",
                "department_uuid",
                "created_at",
                "viewed_at",
                "downloaded",
                "downloaded_at",
            ],
        )?;
        Ok(Self { conn })
    }

    fn require_record(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    ) -> RepoResult<TrackingRecord> {
        self.get_record(notice_uuid, department_uuid)?
            .ok_or(RepoError::TrackingNotFound {
                notice_uuid,
                department_uuid,
            })
    }
}

impl TrackingRepository for SqliteTrackingRepository<'_> {
    fn insert_if_absent(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        created_at: i64,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO tracking_records (
                notice_uuid,
                department_uuid,
                created_at,
                viewed_at,
                downloaded,
                downloaded_at
            ) VALUES (?1, ?2, ?3, NULL, 0, NULL);",
            params![
                notice_uuid.to_string(),
                department_uuid.to_string(),
                created_at
            ],
        )?;
        Ok(changed == 1)
    }

    fn get_record(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    ) -> RepoResult<Option<TrackingRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TRACKING_SELECT_SQL} WHERE notice_uuid = ?1 AND department_uuid = ?2;"
        ))?;
        let mut rows = stmt.query(params![
            notice_uuid.to_string(),
            department_uuid.to_string()
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tracking_row(row)?));
        }
        Ok(None)
    }

    fn mark_viewed(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> RepoResult<TrackingRecord> {
        self.conn.execute(
            "UPDATE tracking_records
             SET viewed_at = ?3
             WHERE notice_uuid = ?1
               AND department_uuid = ?2
               AND viewed_at IS NULL;",
            params![notice_uuid.to_string(), department_uuid.to_string(), at_ms],
        )?;
        self.require_record(notice_uuid, department_uuid)
    }

    fn mark_downloaded(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> RepoResult<TrackingRecord> {
        self.conn.execute(
            "UPDATE tracking_records
             SET downloaded = 1,
                 downloaded_at = COALESCE(downloaded_at, ?3),
                 viewed_at = COALESCE(viewed_at, ?3)
             WHERE notice_uuid = ?1
               AND department_uuid = ?2;",
            params![notice_uuid.to_string(), department_uuid.to_string(), at_ms],
        )?;
        self.require_record(notice_uuid, department_uuid)
    }

    fn list_for_notice(&self, notice_uuid: NoticeId) -> RepoResult<Vec<TrackingRecord>> {
        query_records(
            self.conn,
            &format!("{TRACKING_SELECT_SQL} WHERE notice_uuid = ?1 ORDER BY department_uuid ASC;"),
            &notice_uuid.to_string(),
        )
    }

    fn list_downloads_for_department(
        &self,
        department_uuid: DepartmentId,
    ) -> RepoResult<Vec<TrackingRecord>> {
        query_records(
            self.conn,
            &format!(
                "{TRACKING_SELECT_SQL}
                 WHERE department_uuid = ?1
                   AND downloaded = 1
                 ORDER BY downloaded_at DESC, notice_uuid ASC;"
            ),
            &department_uuid.to_string(),
        )
    }
}

fn query_records(conn: &Connection, sql: &str, key: &str) -> RepoResult<Vec<TrackingRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_tracking_row(row)?);
    }
    Ok(records)
}

fn parse_tracking_row(row: &Row<'_>) -> RepoResult<TrackingRecord> {
    let notice_text: String = row.get("notice_uuid")?;
    let department_text: String = row.get("department_uuid")?;
    let downloaded: i64 = row.get("downloaded")?;

    Ok(TrackingRecord {
        notice_uuid: parse_uuid(&notice_text, "tracking_records.notice_uuid")?,
        department_uuid: parse_uuid(&department_text, "tracking_records.department_uuid")?,
        created_at: row.get("created_at")?,
        viewed_at: row.get("viewed_at")?,
        downloaded: parse_flag(downloaded, "tracking_records.downloaded")?,
        downloaded_at: row.get("downloaded_at")?,
    })
}
