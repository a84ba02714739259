//! Department directory use-case service.
//!
//! # Responsibility
//! - Expand target department sets into inclusive subtrees.
//! - Gate directory mutations to directory-managing roles.
//!
//! # Invariants
//! - The parent relation stays a forest after any accepted `assign_parent`.
//! - Unknown or inactive ids are rejected as resolve inputs.

use crate::model::activity::NewActivity;
use crate::model::actor::Actor;
use crate::model::department::{Department, DepartmentContact, DepartmentId, NewDepartment};
use crate::repo::department_repo::DepartmentRepository;
use crate::service::error::{EngineError, EngineResult, EntityKind};
use log::info;
use std::collections::BTreeSet;

/// Department directory facade.
pub struct DirectoryService<R: DepartmentRepository> {
    repo: R,
}

impl<R: DepartmentRepository> DirectoryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Expands every id to itself plus all descendants, deduplicated.
    ///
    /// Inactive descendants are skipped; inactive inputs are `NotFound`.
    pub fn resolve_targets(
        &self,
        department_ids: &BTreeSet<DepartmentId>,
    ) -> EngineResult<BTreeSet<DepartmentId>> {
        let tree = self.repo.load_tree()?;
        tree.resolve(department_ids)
            .map_err(|missing| EngineError::not_found(EntityKind::Department, missing))
    }

    pub fn create(
        &self,
        actor: &Actor,
        input: NewDepartment,
        now_ms: i64,
    ) -> EngineResult<Department> {
        require_directory_role(actor, "create_department")?;
        let department = input.into_department(now_ms)?;
        let activity = NewActivity::department(
            actor.user_id,
            "department_created",
            department.uuid,
            now_ms,
        );
        self.repo.create_department(&department, &activity)?;
        info!(
            "event=department_create module=directory status=ok department_id={} has_parent={}",
            department.uuid,
            department.parent_uuid.is_some()
        );
        Ok(department)
    }

    pub fn get(&self, id: DepartmentId) -> EngineResult<Department> {
        self.repo
            .get_department(id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Department, id))
    }

    pub fn list(&self, include_inactive: bool) -> EngineResult<Vec<Department>> {
        Ok(self.repo.list_departments(include_inactive)?)
    }

    pub fn list_children(
        &self,
        parent_uuid: DepartmentId,
        include_inactive: bool,
    ) -> EngineResult<Vec<Department>> {
        Ok(self.repo.list_children(parent_uuid, include_inactive)?)
    }

    /// Moves a department under `parent_uuid`, or to the root when `None`.
    ///
    /// # Errors
    /// - `Cycle` when `parent_uuid` is the department itself or one of its
    ///   descendants.
    /// - `NotFound` when either id is unknown or the parent is inactive.
    pub fn assign_parent(
        &self,
        actor: &Actor,
        id: DepartmentId,
        parent_uuid: Option<DepartmentId>,
        now_ms: i64,
    ) -> EngineResult<Department> {
        require_directory_role(actor, "assign_parent")?;
        let mut activity = NewActivity::department(actor.user_id, "parent_assigned", id, now_ms);
        if let Some(parent_uuid) = parent_uuid {
            activity = activity.with_detail(format!("parent={parent_uuid}"));
        }
        self.repo.assign_parent(id, parent_uuid, now_ms, &activity)?;
        self.get(id)
    }

    pub fn update_contact(
        &self,
        actor: &Actor,
        id: DepartmentId,
        contact: DepartmentContact,
        now_ms: i64,
    ) -> EngineResult<Department> {
        require_directory_role(actor, "update_contact")?;
        let contact = contact.normalized()?;
        let activity = NewActivity::department(actor.user_id, "contact_updated", id, now_ms);
        self.repo.update_contact(id, &contact, now_ms, &activity)?;
        self.get(id)
    }

    /// Soft-deactivates one department. Returns `false` when it was already inactive.
    pub fn deactivate(&self, actor: &Actor, id: DepartmentId, now_ms: i64) -> EngineResult<bool> {
        require_directory_role(actor, "deactivate_department")?;
        let activity = NewActivity::department(actor.user_id, "department_deactivated", id, now_ms);
        let changed = self.repo.deactivate(id, now_ms, &activity)?;
        info!(
            "event=department_deactivate module=directory status={} department_id={id}",
            if changed { "ok" } else { "noop" }
        );
        Ok(changed)
    }
}

fn require_directory_role(actor: &Actor, operation: &'static str) -> EngineResult<()> {
    if actor.role.manages_directory() {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            role: actor.role,
            operation,
        })
    }
}
