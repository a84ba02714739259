//! Notice model and lifecycle transition table.
//!
//! # Responsibility
//! - Define the notice record, its priority order and its status machine.
//! - Keep every legal `{state, action} -> {next, roles}` pair in one table.
//!
//! # Invariants
//! - `archived` and `rejected` are terminal: the table has no rows leaving them.
//! - Priority order is `low < normal < high < urgent`.
//! - Self-loops are re-approval and edits made before approval.

use crate::model::actor::{Role, UserId};
use crate::model::department::DepartmentId;
use crate::model::{non_blank, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static FILE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid file url regex"));

/// Stable notice identifier.
pub type NoticeId = Uuid;

/// Notice urgency. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Numeric rank used for SQL ordering.
    pub fn rank(self) -> i64 {
        self as i64
    }
}

/// Notice lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    Draft,
    PendingApproval,
    Approved,
    Circulated,
    Archived,
    Rejected,
}

impl NoticeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Circulated => "circulated",
            Self::Archived => "archived",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_approval" | "pending" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "circulated" => Some(Self::Circulated),
            "archived" => Some(Self::Archived),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Looks up the table row for `action` taken from this state.
    pub fn transition(self, action: NoticeAction) -> Option<&'static Transition> {
        TRANSITIONS
            .iter()
            .find(|rule| rule.from == self && rule.action == action)
    }
}

impl Display for NoticeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeAction {
    Submit,
    Approve,
    Circulate,
    Reject,
    Expire,
    /// Replace title, content, priority, attachment or expiry.
    Edit,
}

impl NoticeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Circulate => "circulate",
            Self::Reject => "reject",
            Self::Expire => "expire",
            Self::Edit => "edit",
        }
    }
}

impl Display for NoticeAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: NoticeStatus,
    pub action: NoticeAction,
    pub next: NoticeStatus,
    /// Empty for system-driven transitions (expiry).
    pub allowed_roles: &'static [Role],
}

impl Transition {
    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    pub fn is_system_only(&self) -> bool {
        self.allowed_roles.is_empty()
    }
}

const AUTHORS: &[Role] = &[
    Role::Admin,
    Role::DepartmentHead,
    Role::SectionChief,
    Role::ItManager,
];
const APPROVERS: &[Role] = &[Role::Admin, Role::DepartmentHead, Role::ItManager];
const SYSTEM: &[Role] = &[];

/// Roles allowed to create drafts. Same set that may submit them.
pub fn may_author(role: Role) -> bool {
    AUTHORS.contains(&role)
}

const fn rule(
    from: NoticeStatus,
    action: NoticeAction,
    next: NoticeStatus,
    allowed_roles: &'static [Role],
) -> Transition {
    Transition {
        from,
        action,
        next,
        allowed_roles,
    }
}

/// Every legal lifecycle move.
#[rustfmt::skip]
pub const TRANSITIONS: &[Transition] = &[
    rule(NoticeStatus::Draft, NoticeAction::Edit, NoticeStatus::Draft, AUTHORS),
    rule(NoticeStatus::PendingApproval, NoticeAction::Edit, NoticeStatus::PendingApproval, AUTHORS),
    rule(NoticeStatus::Draft, NoticeAction::Submit, NoticeStatus::PendingApproval, AUTHORS),
    rule(NoticeStatus::PendingApproval, NoticeAction::Approve, NoticeStatus::Approved, APPROVERS),
    rule(NoticeStatus::Approved, NoticeAction::Approve, NoticeStatus::Approved, APPROVERS),
    rule(NoticeStatus::Circulated, NoticeAction::Approve, NoticeStatus::Approved, APPROVERS),
    rule(NoticeStatus::Approved, NoticeAction::Circulate, NoticeStatus::Circulated, APPROVERS),
    rule(NoticeStatus::PendingApproval, NoticeAction::Reject, NoticeStatus::Rejected, APPROVERS),
    rule(NoticeStatus::Approved, NoticeAction::Reject, NoticeStatus::Rejected, APPROVERS),
    rule(NoticeStatus::Approved, NoticeAction::Expire, NoticeStatus::Archived, SYSTEM),
    rule(NoticeStatus::Circulated, NoticeAction::Expire, NoticeStatus::Archived, SYSTEM),
];

/// Notice read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub uuid: NoticeId,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    /// Opaque attachment URL.
    pub file_url: Option<String>,
    /// Epoch ms after which the notice is archived by the sweeper.
    pub expiry_at: Option<i64>,
    pub status: NoticeStatus,
    pub created_by: UserId,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<i64>,
    pub rejection_reason: Option<String>,
    /// Resolved target set from the latest approval, sorted.
    pub target_department_ids: Vec<DepartmentId>,
    /// Bumped on every status or content write; used for compare-and-set.
    pub revision: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Notice {
    /// Returns whether the expiry date lies strictly before `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expiry_at.is_some_and(|expiry_at| expiry_at < now_ms)
    }

    /// Takes the author-editable fields from `draft`, keeping identity and lifecycle.
    pub fn edited_with(&self, draft: &Notice, now_ms: i64) -> Notice {
        Notice {
            title: draft.title.clone(),
            content: draft.content.clone(),
            priority: draft.priority,
            file_url: draft.file_url.clone(),
            expiry_at: draft.expiry_at,
            updated_at: now_ms,
            ..self.clone()
        }
    }
}

/// Author-supplied fields for a new notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewNotice {
    pub title: String,
    pub content: String,
    /// Wire value; must be one of `low|normal|high|urgent`.
    pub priority: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub expiry_at: Option<i64>,
}

impl NewNotice {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            priority: priority.into(),
            file_url: None,
            expiry_at: None,
        }
    }

    pub fn expiring_at(mut self, expiry_at: i64) -> Self {
        self.expiry_at = Some(expiry_at);
        self
    }

    /// Validates input and builds a `draft` notice.
    pub fn into_notice(self, author: UserId, now_ms: i64) -> Result<Notice, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::new("title", "must not be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError::new("content", "must not be empty"));
        }
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            ValidationError::new(
                "priority",
                format!(
                    "`{}` is not one of low|normal|high|urgent",
                    self.priority.trim()
                ),
            )
        })?;
        let file_url = non_blank(self.file_url);
        if let Some(url) = file_url.as_deref() {
            if !FILE_URL_RE.is_match(url) {
                return Err(ValidationError::new(
                    "file_url",
                    format!("`{url}` is not an http(s) URL"),
                ));
            }
        }

        Ok(Notice {
            uuid: Uuid::new_v4(),
            title: title.to_string(),
            content: self.content,
            priority,
            file_url,
            expiry_at: self.expiry_at,
            status: NoticeStatus::Draft,
            created_by: author,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            target_department_ids: Vec::new(),
            revision: 0,
            created_at: now_ms,
            updated_at: now_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{NewNotice, NoticeAction, NoticeStatus, Priority, TRANSITIONS};
    use crate::model::actor::Role;
    use uuid::Uuid;

    const ALL_STATES: [NoticeStatus; 6] = [
        NoticeStatus::Draft,
        NoticeStatus::PendingApproval,
        NoticeStatus::Approved,
        NoticeStatus::Circulated,
        NoticeStatus::Archived,
        NoticeStatus::Rejected,
    ];
    const ALL_ACTIONS: [NoticeAction; 6] = [
        NoticeAction::Submit,
        NoticeAction::Approve,
        NoticeAction::Circulate,
        NoticeAction::Reject,
        NoticeAction::Expire,
        NoticeAction::Edit,
    ];

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for state in [NoticeStatus::Archived, NoticeStatus::Rejected] {
            for action in ALL_ACTIONS {
                assert!(state.transition(action).is_none(), "{state} --{action}");
            }
        }
    }

    #[test]
    fn table_rows_are_unique_per_state_and_action() {
        for state in ALL_STATES {
            for action in ALL_ACTIONS {
                let rows = TRANSITIONS
                    .iter()
                    .filter(|rule| rule.from == state && rule.action == action)
                    .count();
                assert!(rows <= 1, "{state} --{action} has {rows} rows");
            }
        }
    }

    #[test]
    fn reject_is_reachable_only_from_pending_or_approved() {
        let sources: Vec<_> = ALL_STATES
            .into_iter()
            .filter(|state| state.transition(NoticeAction::Reject).is_some())
            .collect();
        assert_eq!(
            sources,
            vec![NoticeStatus::PendingApproval, NoticeStatus::Approved]
        );
    }

    #[test]
    fn edits_stop_at_approval() {
        let editable: Vec<_> = ALL_STATES
            .into_iter()
            .filter(|state| state.transition(NoticeAction::Edit).is_some())
            .collect();
        assert_eq!(
            editable,
            vec![NoticeStatus::Draft, NoticeStatus::PendingApproval]
        );
        for state in editable {
            let rule = state.transition(NoticeAction::Edit).unwrap();
            assert_eq!(rule.next, state);
            assert!(rule.permits(Role::SectionChief));
            assert!(!rule.permits(Role::Staff));
        }
    }

    #[test]
    fn edited_with_keeps_identity_and_lifecycle() {
        let author = Uuid::new_v4();
        let mut original = NewNotice::new("Holiday Notice", "Closed Friday.", "normal")
            .into_notice(author, 1)
            .unwrap();
        original.status = NoticeStatus::PendingApproval;
        original.revision = 4;
        let draft = NewNotice::new("Holiday Notice (revised)", "Closed Monday.", "urgent")
            .expiring_at(99)
            .into_notice(Uuid::new_v4(), 5)
            .unwrap();

        let edited = original.edited_with(&draft, 5);
        assert_eq!(edited.uuid, original.uuid);
        assert_eq!(edited.created_by, author);
        assert_eq!(edited.status, NoticeStatus::PendingApproval);
        assert_eq!(edited.revision, 4);
        assert_eq!(edited.title, "Holiday Notice (revised)");
        assert_eq!(edited.priority, Priority::Urgent);
        assert_eq!(edited.expiry_at, Some(99));
        assert_eq!(edited.created_at, 1);
        assert_eq!(edited.updated_at, 5);
    }

    #[test]
    fn approval_roles_exclude_staff_and_section_chief() {
        let rule = NoticeStatus::PendingApproval
            .transition(NoticeAction::Approve)
            .unwrap();
        assert!(rule.permits(Role::DepartmentHead));
        assert!(!rule.permits(Role::Staff));
        assert!(!rule.permits(Role::SectionChief));
        assert!(NoticeStatus::Circulated
            .transition(NoticeAction::Expire)
            .unwrap()
            .is_system_only());
    }

    #[test]
    fn priority_total_order() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
        assert_eq!(Priority::parse("critical"), None);
        let ranks: Vec<i64> = Priority::ALL.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn new_notice_validates_required_fields() {
        let author = Uuid::new_v4();
        let err = NewNotice::new(" ", "body", "high")
            .into_notice(author, 0)
            .unwrap_err();
        assert_eq!(err.field, "title");

        let err = NewNotice::new("Holiday Notice", "", "high")
            .into_notice(author, 0)
            .unwrap_err();
        assert_eq!(err.field, "content");

        let err = NewNotice::new("Holiday Notice", "body", "critical")
            .into_notice(author, 0)
            .unwrap_err();
        assert_eq!(err.field, "priority");

        let notice = NewNotice::new("Holiday Notice", "Office closed", "high")
            .into_notice(author, 7)
            .unwrap();
        assert_eq!(notice.status, NoticeStatus::Draft);
        assert_eq!(notice.priority, Priority::High);
        assert_eq!(notice.created_at, 7);
    }
}
