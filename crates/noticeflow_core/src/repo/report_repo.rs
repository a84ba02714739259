//! Read-only rollups over notices and tracking rows.
//!
//! # Invariants
//! - Every rollup runs inside one deferred read transaction, so all counts in
//!   one result describe the same snapshot.
//! - Nothing here writes.

use crate::model::department::DepartmentId;
use crate::model::notice::{Notice, NoticeId};
use crate::repo::notice_repo::{query_notices, NOTICE_SELECT_SQL};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;

/// Global dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardTotals {
    /// Notices not yet archived.
    pub total_notices: u64,
    /// Non-archived notices with `urgent` priority.
    pub urgent_notices: u64,
    pub active_departments: u64,
    /// Tracking rows with a recorded view.
    pub delivered_reports: u64,
    /// Tracking rows never viewed or downloaded past expiry or staleness window.
    pub failed_deliveries: u64,
}

/// Per-department dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepartmentDashboard {
    pub department_uuid: DepartmentId,
    /// Notices targeted at the department, newest first.
    pub recent: Vec<Notice>,
    /// Unviewed tracking rows across circulated notices.
    pub unseen_count: u64,
    pub downloads: u64,
}

/// Repository interface for dashboard reads.
pub trait ReportRepository {
    fn dashboard_totals(&self, now_ms: i64, staleness_window_ms: i64)
        -> RepoResult<DashboardTotals>;
    fn department_dashboard(
        &self,
        department_uuid: DepartmentId,
        recent_limit: u32,
    ) -> RepoResult<DepartmentDashboard>;
    fn notice_exists(&self, notice_uuid: NoticeId) -> RepoResult<bool>;
    fn department_exists(&self, department_uuid: DepartmentId) -> RepoResult<bool>;
}

/// SQLite-backed report reader.
pub struct SqliteReportRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReportRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "tracking_records", &["viewed_at", "downloaded"])?;
        ensure_connection_ready(conn, "notices", &["status", "priority", "expiry_at"])?;
        Ok(Self { conn })
    }
}

impl ReportRepository for SqliteReportRepository<'_> {
    fn dashboard_totals(
        &self,
        now_ms: i64,
        staleness_window_ms: i64,
    ) -> RepoResult<DashboardTotals> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;

        let (total_notices, urgent_notices): (i64, i64) = tx.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN priority = 'urgent' THEN 1 ELSE 0 END), 0)
             FROM notices
             WHERE status <> 'archived';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let active_departments: i64 = tx.query_row(
            "SELECT COUNT(*) FROM departments WHERE is_active = 1;",
            [],
            |row| row.get(0),
        )?;
        let delivered_reports: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tracking_records WHERE viewed_at IS NOT NULL;",
            [],
            |row| row.get(0),
        )?;
        let failed_deliveries: i64 = tx.query_row(
            "SELECT COUNT(*)
             FROM tracking_records tr
             JOIN notices n ON n.uuid = tr.notice_uuid
             WHERE tr.viewed_at IS NULL
               AND tr.downloaded = 0
               AND n.status <> 'rejected'
               AND (
                    (n.expiry_at IS NOT NULL AND n.expiry_at < ?1)
                 OR (n.expiry_at IS NULL AND tr.created_at + ?2 < ?1)
               );",
            params![now_ms, staleness_window_ms],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(DashboardTotals {
            total_notices: to_count(total_notices),
            urgent_notices: to_count(urgent_notices),
            active_departments: to_count(active_departments),
            delivered_reports: to_count(delivered_reports),
            failed_deliveries: to_count(failed_deliveries),
        })
    }

    fn department_dashboard(
        &self,
        department_uuid: DepartmentId,
        recent_limit: u32,
    ) -> RepoResult<DepartmentDashboard> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let department_text = department_uuid.to_string();
        if !row_exists(&tx, "departments", &department_text)? {
            return Err(RepoError::DepartmentNotFound(department_uuid));
        }

        let recent = query_notices(
            &tx,
            &format!(
                "{NOTICE_SELECT_SQL}
                 WHERE EXISTS (
                    SELECT 1
                    FROM tracking_records tr
                    WHERE tr.notice_uuid = notices.uuid
                      AND tr.department_uuid = ?
                 )
                 ORDER BY created_at DESC, uuid ASC
                 LIMIT ?"
            ),
            vec![
                Value::Text(department_text.clone()),
                Value::Integer(i64::from(recent_limit)),
            ],
        )?;
        let unseen_count: i64 = tx.query_row(
            "SELECT COUNT(*)
             FROM tracking_records tr
             JOIN notices n ON n.uuid = tr.notice_uuid
             WHERE tr.department_uuid = ?1
               AND tr.viewed_at IS NULL
               AND n.status = 'circulated';",
            [department_text.as_str()],
            |row| row.get(0),
        )?;
        let downloads: i64 = tx.query_row(
            "SELECT COUNT(*)
             FROM tracking_records
             WHERE department_uuid = ?1
               AND downloaded = 1;",
            [department_text.as_str()],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(DepartmentDashboard {
            department_uuid,
            recent,
            unseen_count: to_count(unseen_count),
            downloads: to_count(downloads),
        })
    }

    fn notice_exists(&self, notice_uuid: NoticeId) -> RepoResult<bool> {
        row_exists(self.conn, "notices", &notice_uuid.to_string())
    }

    fn department_exists(&self, department_uuid: DepartmentId) -> RepoResult<bool> {
        row_exists(self.conn, "departments", &department_uuid.to_string())
    }
}

fn row_exists(conn: &Connection, table: &'static str, uuid: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE uuid = ?1);"),
        [uuid],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
