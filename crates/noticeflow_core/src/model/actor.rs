//! Caller identity supplied by the auth collaborator.
//!
//! The engine trusts this input. It only uses the role tag to gate
//! transitions and to scope reads to the caller's own department.

use crate::model::department::DepartmentId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identifier issued by the auth collaborator.
pub type UserId = Uuid;

/// User role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    DepartmentHead,
    SectionChief,
    Staff,
    ItManager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::DepartmentHead => "department_head",
            Self::SectionChief => "section_chief",
            Self::Staff => "staff",
            Self::ItManager => "it_manager",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "department_head" => Some(Self::DepartmentHead),
            "section_chief" => Some(Self::SectionChief),
            "staff" => Some(Self::Staff),
            "it_manager" => Some(Self::ItManager),
            _ => None,
        }
    }

    /// Department-scoped roles only see rows for their own department.
    pub fn is_department_scoped(self) -> bool {
        matches!(
            self,
            Self::DepartmentHead | Self::SectionChief | Self::Staff
        )
    }

    /// Roles allowed to mutate the department directory.
    pub fn manages_directory(self) -> bool {
        matches!(self, Self::Admin | Self::ItManager)
    }
}

/// Authenticated caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    /// Department affiliation, if any.
    pub department_id: Option<DepartmentId>,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            department_id: None,
        }
    }

    pub fn in_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    /// Returns whether this caller may read rows belonging to `department_id`.
    pub fn can_read_department(&self, department_id: DepartmentId) -> bool {
        !self.role.is_department_scoped() || self.department_id == Some(department_id)
    }
}
