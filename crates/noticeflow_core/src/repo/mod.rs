//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//! - Make every multi-row write atomic with one `IMMEDIATE` transaction.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`*NotFound`, `StaleRevision`,
//!   `Cycle`) in addition to DB transport errors.
//! - Uniqueness (department names, tracking keys) is enforced by the schema,
//!   not by read-then-write checks.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::department::DepartmentId;
use crate::model::notice::{NoticeId, NoticeStatus};
use crate::model::ValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod activity_repo;
pub mod department_repo;
pub mod notice_repo;
pub mod report_repo;
pub mod tracking_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all engine repositories.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Input rejected before touching storage.
    Validation(ValidationError),
    DepartmentNotFound(DepartmentId),
    NoticeNotFound(NoticeId),
    /// No tracking record exists for the pair; the department was never targeted.
    TrackingNotFound {
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    },
    /// Another department already uses this name (case-insensitive).
    DuplicateDepartmentName(String),
    /// Parent assignment would break the forest invariant.
    Cycle {
        department_uuid: DepartmentId,
        parent_uuid: DepartmentId,
    },
    /// Compare-and-set lost against a concurrent status write.
    StaleRevision {
        notice_uuid: NoticeId,
        expected_revision: i64,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    /// Returns whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Db(err) => err.is_busy(),
            Self::StaleRevision { .. } => true,
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::DepartmentNotFound(id) => write!(f, "department not found: {id}"),
            Self::NoticeNotFound(id) => write!(f, "notice not found: {id}"),
            Self::TrackingNotFound {
                notice_uuid,
                department_uuid,
            } => write!(
                f,
                "no tracking record for notice {notice_uuid} and department {department_uuid}"
            ),
            Self::DuplicateDepartmentName(name) => {
                write!(f, "department name already in use: `{name}`")
            }
            Self::Cycle {
                department_uuid,
                parent_uuid,
            } => write!(
                f,
                "parent assignment would create cycle: department {department_uuid} under {parent_uuid}"
            ),
            Self::StaleRevision {
                notice_uuid,
                expected_revision,
            } => write!(
                f,
                "notice {notice_uuid} changed concurrently (expected revision {expected_revision})"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "repository requires table `{table}`"),
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_status(value: &str) -> RepoResult<NoticeStatus> {
    NoticeStatus::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid status `{value}` in notices.status")))
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Fails fast unless the connection is migrated and `table` has `columns`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }
    for &column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
