//! Engine-level error taxonomy.
//!
//! Repository failures with a domain meaning (missing ids, cycles, lost
//! compare-and-set races) are mapped into dedicated variants; anything else is
//! kept as `Storage` with its source chain intact.

use crate::db::DbError;
use crate::model::actor::Role;
use crate::model::notice::{NoticeAction, NoticeStatus};
use crate::model::ValidationError;
use crate::repo::RepoError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

/// Entity named by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Notice,
    TrackingRecord,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Notice => "notice",
            Self::TrackingRecord => "tracking_record",
        }
    }
}

/// Stable error category for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    NotFound,
    Cycle,
    ConcurrencyConflict,
    Forbidden,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InvalidTransition => "invalid_transition",
            Self::NotFound => "not_found",
            Self::Cycle => "cycle",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Forbidden => "forbidden",
            Self::Storage => "storage",
        }
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input.
    Validation {
        field: &'static str,
        message: String,
    },
    /// The state machine has no row for `{from, action}`.
    InvalidTransition {
        from: NoticeStatus,
        action: NoticeAction,
    },
    NotFound {
        entity: EntityKind,
        id: String,
    },
    Cycle {
        department: Uuid,
        parent: Uuid,
    },
    /// Bounded retry exhausted against concurrent writers.
    ConcurrencyConflict {
        operation: &'static str,
        attempts: u32,
    },
    /// Caller role may not run the operation or read the scope.
    Forbidden {
        role: Role,
        operation: &'static str,
    },
    Storage(RepoError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns whether a bounded retry may still succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_retryable())
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { field, message } => write!(f, "invalid {field}: {message}"),
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {action} a notice in state {from}")
            }
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::Cycle { department, parent } => write!(
                f,
                "department {department} cannot be placed under {parent}: cycle"
            ),
            Self::ConcurrencyConflict {
                operation,
                attempts,
            } => write!(
                f,
                "{operation} lost to concurrent writers after {attempts} attempts"
            ),
            Self::Forbidden { role, operation } => {
                write!(f, "role {} may not {operation}", role.as_str())
            }
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        Self::Validation {
            field: value.field,
            message: value.message,
        }
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        Self::Storage(RepoError::Db(value))
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => err.into(),
            RepoError::DepartmentNotFound(id) => Self::not_found(EntityKind::Department, id),
            RepoError::NoticeNotFound(id) => Self::not_found(EntityKind::Notice, id),
            RepoError::TrackingNotFound {
                notice_uuid,
                department_uuid,
            } => Self::not_found(
                EntityKind::TrackingRecord,
                format!("{notice_uuid}/{department_uuid}"),
            ),
            RepoError::DuplicateDepartmentName(name) => {
                Self::validation("name", format!("`{name}` is already in use"))
            }
            RepoError::Cycle {
                department_uuid,
                parent_uuid,
            } => Self::Cycle {
                department: department_uuid,
                parent: parent_uuid,
            },
            other => Self::Storage(other),
        }
    }
}
