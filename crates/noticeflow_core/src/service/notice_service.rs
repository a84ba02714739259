//! Notice lifecycle use-case service.
//!
//! # Responsibility
//! - Drive notices through the transition table with role checks.
//! - Resolve approval targets and trigger fan-out.
//!
//! # Invariants
//! - Every status change is read-validate-write under compare-and-set; a lost
//!   race re-reads and re-validates instead of overwriting.
//! - Approval replaces the target set but never removes tracking rows.
//! - Content edits stop once a notice is approved.
//! - Expiry is system-driven and a no-op for notices already archived.

use crate::model::activity::NewActivity;
use crate::model::actor::Actor;
use crate::model::department::DepartmentId;
use crate::model::notice::{
    may_author, NewNotice, Notice, NoticeAction, NoticeId, NoticeStatus, Transition,
};
use crate::repo::department_repo::DepartmentRepository;
use crate::repo::notice_repo::{NoticeListQuery, NoticeRepository, StatusWrite};
use crate::repo::tracking_repo::TrackingRepository;
use crate::service::directory_service::DirectoryService;
use crate::service::error::{EngineError, EngineResult, EntityKind};
use crate::service::fanout::{fan_out, FanOutReport};
use crate::service::retry::with_retry;
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;

const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Result of one approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub notice: Notice,
    pub fan_out: FanOutReport,
}

/// Notice lifecycle facade.
pub struct NoticeService<N, D, T>
where
    N: NoticeRepository,
    D: DepartmentRepository,
    T: TrackingRepository,
{
    notices: N,
    directory: DirectoryService<D>,
    tracking: T,
    retry_limit: u32,
}

impl<N, D, T> NoticeService<N, D, T>
where
    N: NoticeRepository,
    D: DepartmentRepository,
    T: TrackingRepository,
{
    pub fn new(notices: N, departments: D, tracking: T) -> Self {
        Self {
            notices,
            directory: DirectoryService::new(departments),
            tracking,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Sets how many attempts a conflicting write gets before `ConcurrencyConflict`.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit.max(1);
        self
    }

    /// Creates a `draft` notice.
    ///
    /// # Errors
    /// - `Validation` for an empty title/content or an unknown priority.
    /// - `Forbidden` when the caller's role does not author notices.
    pub fn create(&self, actor: &Actor, input: NewNotice, now_ms: i64) -> EngineResult<Notice> {
        if !may_author(actor.role) {
            return Err(EngineError::Forbidden {
                role: actor.role,
                operation: "create_notice",
            });
        }
        let notice = input.into_notice(actor.user_id, now_ms)?;
        let activity = NewActivity::notice(Some(actor.user_id), "created", notice.uuid, now_ms);
        self.notices.create_notice(&notice, &activity)?;
        info!(
            "event=notice_create module=notice status=ok notice_id={} priority={}",
            notice.uuid,
            notice.priority.as_str()
        );
        Ok(notice)
    }

    /// Replaces the editable fields of a draft or pending notice.
    ///
    /// # Errors
    /// - `Validation` under the same rules as `create`.
    /// - `InvalidTransition` once the notice is approved or closed.
    /// - `Forbidden` when the caller's role does not author notices.
    pub fn update(
        &self,
        actor: &Actor,
        id: NoticeId,
        input: NewNotice,
        now_ms: i64,
    ) -> EngineResult<Notice> {
        if !may_author(actor.role) {
            return Err(EngineError::Forbidden {
                role: actor.role,
                operation: "update_notice",
            });
        }
        let draft = input.into_notice(actor.user_id, now_ms)?;
        with_retry("update_notice", self.retry_limit, |_| {
            let notice = self.get(id)?;
            authorize(&notice, NoticeAction::Edit, Some(actor))?;
            let edited = notice.edited_with(&draft, now_ms);
            let activity = NewActivity::notice(Some(actor.user_id), "updated", id, now_ms);
            self.notices.write_content(&edited, &activity)?;
            Ok(())
        })?;
        info!(
            "event=notice_update module=notice status=ok notice_id={id} priority={}",
            draft.priority.as_str()
        );
        self.get(id)
    }

    pub fn get(&self, id: NoticeId) -> EngineResult<Notice> {
        self.notices
            .get_notice(id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Notice, id))
    }

    pub fn list(&self, query: &NoticeListQuery) -> EngineResult<Vec<Notice>> {
        Ok(self.notices.list_notices(query)?)
    }

    /// Circulated notices, urgent first.
    pub fn noticeboard(
        &self,
        department: Option<DepartmentId>,
        limit: u32,
    ) -> EngineResult<Vec<Notice>> {
        Ok(self.notices.list_circulated(department, limit)?)
    }

    /// Ids of approved/circulated notices whose expiry has passed.
    pub fn expirable(&self, now_ms: i64) -> EngineResult<Vec<NoticeId>> {
        Ok(self.notices.list_expirable(now_ms)?)
    }

    pub fn submit_for_approval(
        &self,
        actor: &Actor,
        id: NoticeId,
        now_ms: i64,
    ) -> EngineResult<Notice> {
        with_retry("submit_for_approval", self.retry_limit, |_| {
            let notice = self.get(id)?;
            let rule = authorize(&notice, NoticeAction::Submit, Some(actor))?;
            let write = StatusWrite::new(&notice, rule.next, now_ms);
            let activity = NewActivity::notice(Some(actor.user_id), "submitted", id, now_ms);
            self.notices.write_status(&write, &activity)?;
            Ok(())
        })?;
        info!("event=notice_submit module=notice status=ok notice_id={id}");
        self.get(id)
    }

    /// Approves (or re-approves) a notice for `department_ids` and their subtrees.
    ///
    /// The status write and target-set replacement commit together; fan-out
    /// follows as a separate idempotent pass. Calling this again with the same
    /// or a larger set completes an interrupted fan-out.
    pub fn approve(
        &self,
        actor: &Actor,
        id: NoticeId,
        department_ids: &BTreeSet<DepartmentId>,
        now_ms: i64,
    ) -> EngineResult<ApprovalOutcome> {
        if department_ids.is_empty() {
            return Err(EngineError::validation(
                "department_ids",
                "at least one target department is required",
            ));
        }

        let targets = with_retry("approve", self.retry_limit, |_| {
            let notice = self.get(id)?;
            let rule = authorize(&notice, NoticeAction::Approve, Some(actor))?;
            let targets = self.directory.resolve_targets(department_ids)?;

            let mut write = StatusWrite::new(&notice, rule.next, now_ms);
            write.targets = Some(&targets);
            write.approved_by = Some(actor.user_id);
            let activity = NewActivity::notice(Some(actor.user_id), "approved", id, now_ms)
                .with_detail(format!("targets={}", targets.len()));
            self.notices.write_status(&write, &activity)?;
            Ok(targets)
        })?;

        let report = self.complete_fan_out(id, &targets, now_ms)?;
        info!(
            "event=notice_approve module=notice status=ok notice_id={id} targets={} created={}",
            targets.len(),
            report.created.len()
        );
        Ok(ApprovalOutcome {
            notice: self.get(id)?,
            fan_out: report,
        })
    }

    /// Publishes an approved notice.
    ///
    /// Also re-runs fan-out for the stored target set, so a notice never goes
    /// live with missing tracking rows.
    pub fn circulate(&self, actor: &Actor, id: NoticeId, now_ms: i64) -> EngineResult<Notice> {
        with_retry("circulate", self.retry_limit, |_| {
            let notice = self.get(id)?;
            let rule = authorize(&notice, NoticeAction::Circulate, Some(actor))?;
            if notice.target_department_ids.is_empty() {
                return Err(EngineError::InvalidTransition {
                    from: notice.status,
                    action: NoticeAction::Circulate,
                });
            }
            let write = StatusWrite::new(&notice, rule.next, now_ms);
            let activity = NewActivity::notice(Some(actor.user_id), "circulated", id, now_ms);
            self.notices.write_status(&write, &activity)?;
            Ok(())
        })?;

        let notice = self.get(id)?;
        let targets: BTreeSet<DepartmentId> =
            notice.target_department_ids.iter().copied().collect();
        self.complete_fan_out(id, &targets, now_ms)?;
        info!(
            "event=notice_circulate module=notice status=ok notice_id={id} targets={}",
            targets.len()
        );
        Ok(notice)
    }

    /// Rejects a pending or approved notice, keeping `reason` for audit.
    pub fn reject(
        &self,
        actor: &Actor,
        id: NoticeId,
        reason: &str,
        now_ms: i64,
    ) -> EngineResult<Notice> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("reason", "must not be empty"));
        }

        with_retry("reject", self.retry_limit, |_| {
            let notice = self.get(id)?;
            let rule = authorize(&notice, NoticeAction::Reject, Some(actor))?;
            let mut write = StatusWrite::new(&notice, rule.next, now_ms);
            write.rejection_reason = Some(reason);
            let activity = NewActivity::notice(Some(actor.user_id), "rejected", id, now_ms)
                .with_detail(reason);
            self.notices.write_status(&write, &activity)?;
            Ok(())
        })?;
        info!("event=notice_reject module=notice status=ok notice_id={id}");
        self.get(id)
    }

    /// Archives an approved/circulated notice whose expiry lies before `now_ms`.
    ///
    /// Returns `false` when the notice was already archived.
    ///
    /// # Errors
    /// - `Validation` when the notice has no expiry or it has not passed yet.
    /// - `InvalidTransition` from any other state.
    pub fn expire(&self, id: NoticeId, now_ms: i64) -> EngineResult<bool> {
        let archived = with_retry("expire", self.retry_limit, |_| {
            let notice = self.get(id)?;
            if notice.status == NoticeStatus::Archived {
                return Ok(false);
            }
            let rule = authorize(&notice, NoticeAction::Expire, None)?;
            if !notice.is_expired_at(now_ms) {
                return Err(EngineError::validation(
                    "expiry_at",
                    "notice has not reached its expiry",
                ));
            }
            let write = StatusWrite::new(&notice, rule.next, now_ms);
            let activity = NewActivity::notice(None, "expired", id, now_ms);
            self.notices.write_status(&write, &activity)?;
            Ok(true)
        })?;
        if archived {
            info!("event=notice_expire module=notice status=ok notice_id={id}");
        }
        Ok(archived)
    }

    fn complete_fan_out(
        &self,
        id: NoticeId,
        targets: &BTreeSet<DepartmentId>,
        now_ms: i64,
    ) -> EngineResult<FanOutReport> {
        with_retry("fan_out", self.retry_limit, |_| {
            Ok(fan_out(&self.tracking, id, targets, now_ms)?)
        })
    }
}

/// Looks up the table row for `action` and checks the caller's role.
///
/// `actor = None` is the system itself and only passes system-only rows.
fn authorize(
    notice: &Notice,
    action: NoticeAction,
    actor: Option<&Actor>,
) -> EngineResult<&'static Transition> {
    let rule = notice
        .status
        .transition(action)
        .ok_or(EngineError::InvalidTransition {
            from: notice.status,
            action,
        })?;
    match actor {
        Some(actor) if !rule.permits(actor.role) => Err(EngineError::Forbidden {
            role: actor.role,
            operation: action.as_str(),
        }),
        None if !rule.is_system_only() => Err(EngineError::InvalidTransition {
            from: notice.status,
            action,
        }),
        _ => Ok(rule),
    }
}
