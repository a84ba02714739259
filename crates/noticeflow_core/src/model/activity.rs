//! Audit trail entries written alongside every state change.

use crate::model::actor::UserId;
use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use serde::Serialize;

/// One appended audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    /// `None` for system-driven changes such as expiry.
    pub actor_uuid: Option<UserId>,
    pub action: String,
    pub notice_uuid: Option<NoticeId>,
    pub department_uuid: Option<DepartmentId>,
    pub detail: Option<String>,
    pub created_at: i64,
}

/// Write-side payload for one audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub actor_uuid: Option<UserId>,
    pub action: &'static str,
    pub notice_uuid: Option<NoticeId>,
    pub department_uuid: Option<DepartmentId>,
    pub detail: Option<String>,
    pub created_at: i64,
}

impl NewActivity {
    pub fn notice(
        actor_uuid: Option<UserId>,
        action: &'static str,
        notice_uuid: NoticeId,
        created_at: i64,
    ) -> Self {
        Self {
            actor_uuid,
            action,
            notice_uuid: Some(notice_uuid),
            department_uuid: None,
            detail: None,
            created_at,
        }
    }

    pub fn department(
        actor_uuid: UserId,
        action: &'static str,
        department_uuid: DepartmentId,
        created_at: i64,
    ) -> Self {
        Self {
            actor_uuid: Some(actor_uuid),
            action,
            notice_uuid: None,
            department_uuid: Some(department_uuid),
            detail: None,
            created_at,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
