//! Notice repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist notices, their resolved target sets and status changes.
//! - Apply status writes as compare-and-set on `revision`.
//!
//! # Invariants
//! - A status write, its target-set replacement and its audit row commit
//!   together or not at all.
//! - A write whose expected revision is stale changes nothing and reports
//!   `StaleRevision`.
//! - Listing order is `created_at DESC, uuid ASC`.
//! - Noticeboard order ranks priorities by `Priority::rank`.

use crate::model::activity::NewActivity;
use crate::model::actor::UserId;
use crate::model::department::DepartmentId;
use crate::model::notice::{Notice, NoticeId, NoticeStatus, Priority};
use crate::repo::activity_repo::append_activity;
use crate::repo::{ensure_connection_ready, parse_status, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;

const NOTICES_DEFAULT_LIMIT: u32 = 20;
const NOTICES_LIMIT_MAX: u32 = 100;

pub(crate) const NOTICE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    content,
    priority,
    file_url,
    expiry_at,
    status,
    created_by,
    approved_by,
    approved_at,
    rejection_reason,
    revision,
    created_at,
    updated_at
FROM notices";

/// Query options for notice listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeListQuery {
    pub status: Option<NoticeStatus>,
    pub priority: Option<Priority>,
    /// Only notices with a tracking record for this department.
    pub department: Option<DepartmentId>,
    /// Maximum rows to return. Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One compare-and-set status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite<'a> {
    pub notice_uuid: NoticeId,
    /// Revision observed when the transition was validated.
    pub expected_revision: i64,
    pub next: NoticeStatus,
    pub now_ms: i64,
    /// Replaces the stored target set when present.
    pub targets: Option<&'a BTreeSet<DepartmentId>>,
    /// Recorded as `approved_by`/`approved_at` when present.
    pub approved_by: Option<UserId>,
    pub rejection_reason: Option<&'a str>,
}

impl<'a> StatusWrite<'a> {
    pub fn new(notice: &Notice, next: NoticeStatus, now_ms: i64) -> Self {
        Self {
            notice_uuid: notice.uuid,
            expected_revision: notice.revision,
            next,
            now_ms,
            targets: None,
            approved_by: None,
            rejection_reason: None,
        }
    }
}

/// Repository interface for notice persistence.
pub trait NoticeRepository {
    /// Inserts one notice together with its `created` audit row.
    fn create_notice(&self, notice: &Notice, activity: &NewActivity) -> RepoResult<()>;
    /// Loads one notice with its target set.
    fn get_notice(&self, id: NoticeId) -> RepoResult<Option<Notice>>;
    /// Lists notices by filter and pagination.
    fn list_notices(&self, query: &NoticeListQuery) -> RepoResult<Vec<Notice>>;
    /// Lists circulated notices, most urgent first, then newest first.
    fn list_circulated(
        &self,
        department: Option<DepartmentId>,
        limit: u32,
    ) -> RepoResult<Vec<Notice>>;
    /// Ids of approved/circulated notices whose expiry lies before `now_ms`.
    fn list_expirable(&self, now_ms: i64) -> RepoResult<Vec<NoticeId>>;
    /// Applies one compare-and-set status write plus its audit row.
    fn write_status(&self, write: &StatusWrite<'_>, activity: &NewActivity) -> RepoResult<()>;
    /// Stores the editable fields of `notice`, expecting its `revision`.
    fn write_content(&self, notice: &Notice, activity: &NewActivity) -> RepoResult<()>;
}

/// SQLite-backed notice repository.
pub struct SqliteNoticeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoticeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "notices",
            &[
                "uuid",
                "title",
                "content",
                "priority",
                "status",
                "expiry_at",
                "revision",
                "created_at",
            ],
        )?;
        ensure_connection_ready(conn, "notice_targets", &["notice_uuid", "department_uuid"])?;
        Ok(Self { conn })
    }
}

impl NoticeRepository for SqliteNoticeRepository<'_> {
    fn create_notice(&self, notice: &Notice, activity: &NewActivity) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO notices (
                uuid,
                title,
                content,
                priority,
                file_url,
                expiry_at,
                status,
                created_by,
                approved_by,
                approved_at,
                rejection_reason,
                revision,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, ?9, ?10, ?11);",
            params![
                notice.uuid.to_string(),
                notice.title.as_str(),
                notice.content.as_str(),
                notice.priority.as_str(),
                notice.file_url.as_deref(),
                notice.expiry_at,
                notice.status.as_str(),
                notice.created_by.to_string(),
                notice.revision,
                notice.created_at,
                notice.updated_at,
            ],
        )?;
        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }

    fn get_notice(&self, id: NoticeId) -> RepoResult<Option<Notice>> {
        load_notice(self.conn, id)
    }

    fn list_notices(&self, query: &NoticeListQuery) -> RepoResult<Vec<Notice>> {
        let mut sql = format!("{NOTICE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(priority) = query.priority {
            sql.push_str(" AND priority = ?");
            bind_values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(department) = query.department {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM tracking_records tr
                    WHERE tr.notice_uuid = notices.uuid
                      AND tr.department_uuid = ?
                )",
            );
            bind_values.push(Value::Text(department.to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC, uuid ASC LIMIT ?");
        let limit = normalize_notice_limit(query.limit);
        bind_values.push(Value::Integer(i64::from(limit)));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        query_notices(self.conn, &sql, bind_values)
    }

    fn list_circulated(
        &self,
        department: Option<DepartmentId>,
        limit: u32,
    ) -> RepoResult<Vec<Notice>> {
        let mut sql = format!("{NOTICE_SELECT_SQL} WHERE status = 'circulated'");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(department) = department {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM tracking_records tr
                    WHERE tr.notice_uuid = notices.uuid
                      AND tr.department_uuid = ?
                )",
            );
            bind_values.push(Value::Text(department.to_string()));
        }
        sql.push_str(&format!(
            " ORDER BY {} DESC, created_at DESC, uuid ASC LIMIT ?",
            priority_rank_sql()
        ));
        let limit = normalize_notice_limit(Some(limit));
        bind_values.push(Value::Integer(i64::from(limit)));

        query_notices(self.conn, &sql, bind_values)
    }

    fn list_expirable(&self, now_ms: i64) -> RepoResult<Vec<NoticeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid
             FROM notices
             WHERE status IN ('approved', 'circulated')
               AND expiry_at IS NOT NULL
               AND expiry_at < ?1
             ORDER BY expiry_at ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([now_ms])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "notices.uuid")?);
        }
        Ok(ids)
    }

    fn write_status(&self, write: &StatusWrite<'_>, activity: &NewActivity) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE notices
             SET status = ?3,
                 revision = revision + 1,
                 updated_at = ?4,
                 approved_by = COALESCE(?5, approved_by),
                 approved_at = CASE WHEN ?5 IS NULL THEN approved_at ELSE ?4 END,
                 rejection_reason = COALESCE(?6, rejection_reason)
             WHERE uuid = ?1
               AND revision = ?2;",
            params![
                write.notice_uuid.to_string(),
                write.expected_revision,
                write.next.as_str(),
                write.now_ms,
                write.approved_by.map(|value| value.to_string()),
                write.rejection_reason,
            ],
        )?;
        if changed == 0 {
            let expected = write.expected_revision;
            return Err(missed_write(&tx, write.notice_uuid, expected)?);
        }

        if let Some(targets) = write.targets {
            replace_targets(&tx, write.notice_uuid, targets)?;
        }

        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }

    fn write_content(&self, notice: &Notice, activity: &NewActivity) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE notices
             SET title = ?3,
                 content = ?4,
                 priority = ?5,
                 file_url = ?6,
                 expiry_at = ?7,
                 revision = revision + 1,
                 updated_at = ?8
             WHERE uuid = ?1
               AND revision = ?2;",
            params![
                notice.uuid.to_string(),
                notice.revision,
                notice.title.as_str(),
                notice.content.as_str(),
                notice.priority.as_str(),
                notice.file_url.as_deref(),
                notice.expiry_at,
                notice.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(missed_write(&tx, notice.uuid, notice.revision)?);
        }

        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }
}

/// Explains a compare-and-set update that matched no row.
fn missed_write(conn: &Connection, id: NoticeId, expected_revision: i64) -> RepoResult<RepoError> {
    Ok(if load_notice(conn, id)?.is_none() {
        RepoError::NoticeNotFound(id)
    } else {
        RepoError::StaleRevision {
            notice_uuid: id,
            expected_revision,
        }
    })
}

/// `CASE` expression mapping the stored priority to its rank.
fn priority_rank_sql() -> String {
    let arms: String = Priority::ALL
        .iter()
        .map(|priority| format!(" WHEN '{}' THEN {}", priority.as_str(), priority.rank()))
        .collect();
    format!("CASE priority{arms} ELSE -1 END")
}

/// Normalizes list limit according to the listing contract.
pub fn normalize_notice_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => NOTICES_DEFAULT_LIMIT,
        Some(value) if value > NOTICES_LIMIT_MAX => NOTICES_LIMIT_MAX,
        Some(value) => value,
    }
}

pub(crate) fn load_notice(conn: &Connection, id: NoticeId) -> RepoResult<Option<Notice>> {
    let mut stmt = conn.prepare(&format!("{NOTICE_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        let mut notice = parse_notice_row(row)?;
        notice.target_department_ids = load_targets(conn, notice.uuid)?;
        return Ok(Some(notice));
    }
    Ok(None)
}

pub(crate) fn query_notices(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> RepoResult<Vec<Notice>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut notices = Vec::new();
    while let Some(row) = rows.next()? {
        notices.push(parse_notice_row(row)?);
    }
    for notice in &mut notices {
        notice.target_department_ids = load_targets(conn, notice.uuid)?;
    }
    Ok(notices)
}

fn load_targets(conn: &Connection, notice_uuid: NoticeId) -> RepoResult<Vec<DepartmentId>> {
    let mut stmt = conn.prepare(
        "SELECT department_uuid
         FROM notice_targets
         WHERE notice_uuid = ?1
         ORDER BY department_uuid ASC;",
    )?;
    let mut rows = stmt.query([notice_uuid.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "notice_targets.department_uuid")?);
    }
    Ok(ids)
}

fn replace_targets(
    conn: &Connection,
    notice_uuid: NoticeId,
    targets: &BTreeSet<DepartmentId>,
) -> RepoResult<()> {
    let notice_uuid_text = notice_uuid.to_string();
    conn.execute(
        "DELETE FROM notice_targets WHERE notice_uuid = ?1;",
        [notice_uuid_text.as_str()],
    )?;
    for department_uuid in targets {
        conn.execute(
            "INSERT INTO notice_targets (notice_uuid, department_uuid) VALUES (?1, ?2);",
            params![notice_uuid_text.as_str(), department_uuid.to_string()],
        )?;
    }
    Ok(())
}

fn parse_notice_row(row: &Row<'_>) -> RepoResult<Notice> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "notices.uuid")?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in notices.priority"
        ))
    })?;
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text)?;

    let created_by_text: String = row.get("created_by")?;
    let approved_by = row
        .get::<_, Option<String>>("approved_by")?
        .map(|value| parse_uuid(&value, "notices.approved_by"))
        .transpose()?;

    Ok(Notice {
        uuid,
        title: row.get("title")?,
        content: row.get("content")?,
        priority,
        file_url: row.get("file_url")?,
        expiry_at: row.get("expiry_at")?,
        status,
        created_by: parse_uuid(&created_by_text, "notices.created_by")?,
        approved_by,
        approved_at: row.get("approved_at")?,
        rejection_reason: row.get("rejection_reason")?,
        target_department_ids: Vec::new(),
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
