use noticeflow_core::{
    now_epoch_ms, Actor, EngineConfig, EngineError, ErrorKind, NewDepartment, NewNotice, Notice,
    NoticeAction, NoticeEngine, NoticeEvent, NoticeHook, NoticeListQuery, NoticeStatus,
    OfficeType, Priority, Role,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct Fixture {
    engine: NoticeEngine,
    admin: Actor,
    /// Root office with one child.
    parent: Uuid,
    child: Uuid,
    /// Unrelated root office.
    other: Uuid,
}

fn setup() -> Fixture {
    let engine = NoticeEngine::open_in_memory(EngineConfig::default()).unwrap();
    let admin = Actor::new(Uuid::new_v4(), Role::Admin);
    let parent = engine
        .create_department(
            &admin,
            NewDepartment::new("Directorate", OfficeType::Directorate),
        )
        .unwrap();
    let child = engine
        .create_department(
            &admin,
            NewDepartment::new("Koshi Office", OfficeType::Province).under(parent.uuid),
        )
        .unwrap();
    let other = engine
        .create_department(&admin, NewDepartment::new("Audit", OfficeType::Other))
        .unwrap();
    Fixture {
        engine,
        admin,
        parent: parent.uuid,
        child: child.uuid,
        other: other.uuid,
    }
}

fn set(ids: &[Uuid]) -> BTreeSet<Uuid> {
    ids.iter().copied().collect()
}

fn pending_notice(fx: &Fixture, title: &str, priority: &str) -> Notice {
    let notice = fx
        .engine
        .create_notice(
            &fx.admin,
            NewNotice::new(title, "Offices are closed.", priority),
        )
        .unwrap();
    fx.engine
        .submit_for_approval(&fx.admin, notice.uuid)
        .unwrap()
}

fn tracking_count(fx: &Fixture, notice: Uuid) -> usize {
    fx.engine.tracking_for(&fx.admin, notice).unwrap().len()
}

#[test]
fn create_rejects_invalid_input_and_unauthorized_roles() {
    let fx = setup();

    let err = fx
        .engine
        .create_notice(&fx.admin, NewNotice::new("", "body", "high"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { field: "title", .. }));

    let err = fx
        .engine
        .create_notice(&fx.admin, NewNotice::new("Title", "body", "critical"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation {
            field: "priority",
            ..
        }
    ));

    let staff = Actor::new(Uuid::new_v4(), Role::Staff).in_department(fx.child);
    let err = fx
        .engine
        .create_notice(&staff, NewNotice::new("Title", "body", "low"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn full_lifecycle_fans_out_and_records_audit_trail() {
    let fx = setup();
    let draft = fx
        .engine
        .create_notice(
            &fx.admin,
            NewNotice::new("Holiday Notice", "Closed Friday.", "high"),
        )
        .unwrap();
    assert_eq!(draft.status, NoticeStatus::Draft);

    let pending = fx
        .engine
        .submit_for_approval(&fx.admin, draft.uuid)
        .unwrap();
    assert_eq!(pending.status, NoticeStatus::PendingApproval);

    let outcome = fx
        .engine
        .approve(&fx.admin, draft.uuid, &set(&[fx.parent]))
        .unwrap();
    assert_eq!(outcome.notice.status, NoticeStatus::Approved);
    assert_eq!(outcome.notice.approved_by, Some(fx.admin.user_id));
    assert!(outcome.notice.approved_at.is_some());
    assert_eq!(
        set(&outcome.notice.target_department_ids),
        set(&[fx.parent, fx.child])
    );
    assert_eq!(set(&outcome.fan_out.created), set(&[fx.parent, fx.child]));
    assert!(outcome.fan_out.existing.is_empty());

    let circulated = fx.engine.circulate(&fx.admin, draft.uuid).unwrap();
    assert_eq!(circulated.status, NoticeStatus::Circulated);
    assert_eq!(tracking_count(&fx, draft.uuid), 2);

    let actions: Vec<String> = fx
        .engine
        .activity_for_notice(draft.uuid)
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec!["created", "submitted", "approved", "circulated"]
    );
}

#[test]
fn edits_apply_until_approval() {
    let fx = setup();
    let draft = fx
        .engine
        .create_notice(
            &fx.admin,
            NewNotice::new("Holiday", "Closed Friday.", "normal"),
        )
        .unwrap();

    let edited = fx
        .engine
        .update_notice(
            &fx.admin,
            draft.uuid,
            NewNotice::new("  Holiday Notice ", "Closed Monday.", "high"),
        )
        .unwrap();
    assert_eq!(edited.status, NoticeStatus::Draft);
    assert_eq!(edited.title, "Holiday Notice");
    assert_eq!(edited.content, "Closed Monday.");
    assert_eq!(edited.priority, Priority::High);
    assert_eq!(edited.created_by, fx.admin.user_id);
    assert_eq!(edited.revision, draft.revision + 1);

    let pending = fx
        .engine
        .submit_for_approval(&fx.admin, draft.uuid)
        .unwrap();
    let chief = Actor::new(Uuid::new_v4(), Role::SectionChief).in_department(fx.child);
    let expiry = now_epoch_ms() + 86_400_000;
    let edited = fx
        .engine
        .update_notice(
            &chief,
            draft.uuid,
            NewNotice::new("Holiday Notice", "Closed Monday.", "urgent").expiring_at(expiry),
        )
        .unwrap();
    assert_eq!(edited.status, NoticeStatus::PendingApproval);
    assert_eq!(edited.priority, Priority::Urgent);
    assert_eq!(edited.expiry_at, Some(expiry));
    assert_eq!(edited.revision, pending.revision + 1);

    fx.engine
        .approve(&fx.admin, draft.uuid, &set(&[fx.other]))
        .unwrap();
    let err = fx
        .engine
        .update_notice(&fx.admin, draft.uuid, NewNotice::new("Late", "body", "low"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: NoticeStatus::Approved,
            action: NoticeAction::Edit,
        }
    ));
    assert_eq!(
        fx.engine.get_notice(draft.uuid).unwrap().title,
        "Holiday Notice"
    );

    let actions: Vec<String> = fx
        .engine
        .activity_for_notice(draft.uuid)
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec!["created", "updated", "submitted", "updated", "approved"]
    );
}

#[test]
fn edits_are_validated_and_role_checked() {
    let fx = setup();
    let draft = fx
        .engine
        .create_notice(
            &fx.admin,
            NewNotice::new("Budget", "Draft figures.", "normal"),
        )
        .unwrap();

    let err = fx
        .engine
        .update_notice(&fx.admin, draft.uuid, NewNotice::new(" ", "body", "high"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { field: "title", .. }));

    let err = fx
        .engine
        .update_notice(
            &fx.admin,
            draft.uuid,
            NewNotice::new("Budget", "body", "critical"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let staff = Actor::new(Uuid::new_v4(), Role::Staff).in_department(fx.child);
    let err = fx
        .engine
        .update_notice(&staff, draft.uuid, NewNotice::new("Budget", "body", "low"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = fx
        .engine
        .update_notice(
            &fx.admin,
            Uuid::new_v4(),
            NewNotice::new("Budget", "body", "low"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let stored = fx.engine.get_notice(draft.uuid).unwrap();
    assert_eq!(stored.content, "Draft figures.");
    assert_eq!(stored.revision, draft.revision);
}

#[test]
fn approve_requires_targets() {
    let fx = setup();
    let notice = pending_notice(&fx, "Budget", "normal");

    let err = fx
        .engine
        .approve(&fx.admin, notice.uuid, &BTreeSet::new())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation {
            field: "department_ids",
            ..
        }
    ));
    assert_eq!(
        fx.engine.get_notice(notice.uuid).unwrap().status,
        NoticeStatus::PendingApproval
    );
}

#[test]
fn approve_with_unknown_department_changes_nothing() {
    let fx = setup();
    let notice = pending_notice(&fx, "Budget", "normal");

    let err = fx
        .engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.other, Uuid::new_v4()]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let stored = fx.engine.get_notice(notice.uuid).unwrap();
    assert_eq!(stored.status, NoticeStatus::PendingApproval);
    assert!(stored.target_department_ids.is_empty());
    assert_eq!(tracking_count(&fx, notice.uuid), 0);
}

#[test]
fn transitions_outside_the_table_are_rejected() {
    let fx = setup();
    let draft = fx
        .engine
        .create_notice(&fx.admin, NewNotice::new("Draft", "body", "low"))
        .unwrap();

    let err = fx.engine.circulate(&fx.admin, draft.uuid).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: NoticeStatus::Draft,
            action: NoticeAction::Circulate,
        }
    ));

    let err = fx
        .engine
        .approve(&fx.admin, draft.uuid, &set(&[fx.other]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    fx.engine
        .submit_for_approval(&fx.admin, draft.uuid)
        .unwrap();
    let err = fx
        .engine
        .submit_for_approval(&fx.admin, draft.uuid)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn repeated_approval_is_idempotent() {
    let fx = setup();
    let notice = pending_notice(&fx, "Repeat", "normal");
    let targets = set(&[fx.parent, fx.other]);

    let first = fx.engine.approve(&fx.admin, notice.uuid, &targets).unwrap();
    assert_eq!(first.fan_out.created.len(), 3);

    let second = fx.engine.approve(&fx.admin, notice.uuid, &targets).unwrap();
    assert!(second.fan_out.created.is_empty());
    assert_eq!(second.fan_out.existing.len(), 3);
    assert_eq!(tracking_count(&fx, notice.uuid), 3);
    assert!(second.notice.revision > first.notice.revision);
}

#[test]
fn reapproval_adds_new_targets_and_preserves_existing_records() {
    let fx = setup();
    let notice = pending_notice(&fx, "Expand", "high");

    fx.engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.other]))
        .unwrap();
    fx.engine.circulate(&fx.admin, notice.uuid).unwrap();
    let viewed = fx.engine.record_view(notice.uuid, fx.other).unwrap();
    let viewed_at = viewed.viewed_at.unwrap();

    let outcome = fx
        .engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.other, fx.child]))
        .unwrap();
    assert_eq!(outcome.notice.status, NoticeStatus::Approved);
    assert_eq!(outcome.fan_out.created, vec![fx.child]);
    assert_eq!(outcome.fan_out.existing, vec![fx.other]);

    let records = fx.engine.tracking_for(&fx.admin, notice.uuid).unwrap();
    let other = records
        .iter()
        .find(|record| record.department_uuid == fx.other)
        .unwrap();
    assert_eq!(other.viewed_at, Some(viewed_at));

    // Narrowing keeps history but replaces the live target set.
    let narrowed = fx
        .engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.child]))
        .unwrap();
    assert_eq!(narrowed.notice.target_department_ids, vec![fx.child]);
    assert_eq!(tracking_count(&fx, notice.uuid), 2);
}

#[test]
fn overlapping_targets_are_deduplicated() {
    let fx = setup();
    let notice = pending_notice(&fx, "Holiday Notice", "high");

    let outcome = fx
        .engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.parent, fx.child]))
        .unwrap();
    assert_eq!(outcome.fan_out.created.len(), 2);

    let leafs = pending_notice(&fx, "Leaf Notice", "high");
    let outcome = fx
        .engine
        .approve(&fx.admin, leafs.uuid, &set(&[fx.child, fx.other]))
        .unwrap();
    assert_eq!(set(&outcome.fan_out.created), set(&[fx.child, fx.other]));
}

#[test]
fn rejection_is_terminal_and_requires_reason() {
    let fx = setup();
    let notice = pending_notice(&fx, "Reject me", "low");

    let err = fx.engine.reject(&fx.admin, notice.uuid, "  ").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation {
            field: "reason",
            ..
        }
    ));

    let rejected = fx
        .engine
        .reject(&fx.admin, notice.uuid, "Duplicate of last week's notice")
        .unwrap();
    assert_eq!(rejected.status, NoticeStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Duplicate of last week's notice")
    );

    for result in [
        fx.engine
            .approve(&fx.admin, notice.uuid, &set(&[fx.other]))
            .map(|_| ()),
        fx.engine.circulate(&fx.admin, notice.uuid).map(|_| ()),
        fx.engine
            .reject(&fx.admin, notice.uuid, "again")
            .map(|_| ()),
        fx.engine
            .submit_for_approval(&fx.admin, notice.uuid)
            .map(|_| ()),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
    }
    assert_eq!(
        fx.engine.get_notice(notice.uuid).unwrap().status,
        NoticeStatus::Rejected
    );
}

#[test]
fn approval_roles_are_enforced() {
    let fx = setup();
    let chief = Actor::new(Uuid::new_v4(), Role::SectionChief).in_department(fx.child);
    let draft = fx
        .engine
        .create_notice(&chief, NewNotice::new("Chief notice", "body", "normal"))
        .unwrap();
    fx.engine.submit_for_approval(&chief, draft.uuid).unwrap();

    let err = fx
        .engine
        .approve(&chief, draft.uuid, &set(&[fx.child]))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Forbidden {
            role: Role::SectionChief,
            ..
        }
    ));

    let head = Actor::new(Uuid::new_v4(), Role::DepartmentHead).in_department(fx.parent);
    let outcome = fx
        .engine
        .approve(&head, draft.uuid, &set(&[fx.child]))
        .unwrap();
    assert_eq!(outcome.notice.approved_by, Some(head.user_id));
}

#[test]
fn expire_requires_past_expiry_and_is_system_driven() {
    let fx = setup();
    let future = now_epoch_ms() + 86_400_000;
    let notice = fx
        .engine
        .create_notice(
            &fx.admin,
            NewNotice::new("Later", "body", "normal").expiring_at(future),
        )
        .unwrap();

    let err = fx.engine.expire(notice.uuid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    fx.engine
        .submit_for_approval(&fx.admin, notice.uuid)
        .unwrap();
    fx.engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.other]))
        .unwrap();
    let err = fx.engine.expire(notice.uuid).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation {
            field: "expiry_at",
            ..
        }
    ));

    let err = fx.engine.expire(Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn list_notices_filters_and_bounds() {
    let fx = setup();
    let drafts: Vec<_> = (0..3)
        .map(|index| {
            fx.engine
                .create_notice(
                    &fx.admin,
                    NewNotice::new(format!("Draft {index}"), "body", "low"),
                )
                .unwrap()
        })
        .collect();
    let urgent = pending_notice(&fx, "Urgent", "urgent");
    fx.engine
        .approve(&fx.admin, urgent.uuid, &set(&[fx.other]))
        .unwrap();

    let all = fx.engine.list_notices(&NoticeListQuery::default()).unwrap();
    assert_eq!(all.len(), 4);

    let only_drafts = fx
        .engine
        .list_notices(&NoticeListQuery {
            status: Some(NoticeStatus::Draft),
            ..NoticeListQuery::default()
        })
        .unwrap();
    assert_eq!(only_drafts.len(), drafts.len());

    let urgent_only = fx
        .engine
        .list_notices(&NoticeListQuery {
            priority: Some(Priority::Urgent),
            ..NoticeListQuery::default()
        })
        .unwrap();
    assert_eq!(urgent_only.len(), 1);
    assert_eq!(urgent_only[0].uuid, urgent.uuid);

    let for_other = fx
        .engine
        .list_notices(&NoticeListQuery {
            department: Some(fx.other),
            ..NoticeListQuery::default()
        })
        .unwrap();
    assert_eq!(for_other.len(), 1);
    assert!(fx
        .engine
        .list_notices(&NoticeListQuery {
            department: Some(fx.child),
            ..NoticeListQuery::default()
        })
        .unwrap()
        .is_empty());

    let page = fx
        .engine
        .list_notices(&NoticeListQuery {
            limit: Some(2),
            ..NoticeListQuery::default()
        })
        .unwrap();
    assert_eq!(page.len(), 2);
    let rest = fx
        .engine
        .list_notices(&NoticeListQuery {
            limit: Some(2),
            offset: 2,
            ..NoticeListQuery::default()
        })
        .unwrap();
    assert_eq!(rest.len(), 2);
    assert!(rest.iter().all(|notice| page.iter().all(|seen| seen.uuid != notice.uuid)));
}

#[test]
fn noticeboard_orders_by_priority_then_recency() {
    let fx = setup();
    for (title, priority) in [("Low", "low"), ("Urgent", "urgent"), ("High", "high")] {
        let notice = pending_notice(&fx, title, priority);
        fx.engine
            .approve(&fx.admin, notice.uuid, &set(&[fx.other]))
            .unwrap();
        fx.engine.circulate(&fx.admin, notice.uuid).unwrap();
    }
    let not_circulated = pending_notice(&fx, "Pending", "urgent");

    let board = fx.engine.noticeboard(None, None).unwrap();
    let titles: Vec<_> = board.iter().map(|notice| notice.title.as_str()).collect();
    assert_eq!(titles, vec!["Urgent", "High", "Low"]);
    assert!(board.iter().all(|notice| notice.uuid != not_circulated.uuid));

    assert!(fx.engine.noticeboard(Some(fx.child), None).unwrap().is_empty());
    assert_eq!(
        fx.engine
            .noticeboard(Some(fx.other), Some(1))
            .unwrap()
            .len(),
        1
    );
}

#[derive(Default)]
struct RecordingHook {
    approved: Mutex<Vec<NoticeEvent>>,
    circulated: Mutex<Vec<NoticeEvent>>,
}

impl NoticeHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_circulated(&self, event: &NoticeEvent) {
        self.circulated.lock().unwrap().push(event.clone());
    }

    fn on_approved(&self, event: &NoticeEvent) {
        self.approved.lock().unwrap().push(event.clone());
    }
}

#[test]
fn hooks_fire_after_approve_and_circulate() {
    let mut fx = setup();
    let hook = Arc::new(RecordingHook::default());
    fx.engine.register_hook(hook.clone());

    let notice = pending_notice(&fx, "Push me", "urgent");
    fx.engine
        .approve(&fx.admin, notice.uuid, &set(&[fx.parent]))
        .unwrap();
    assert_eq!(hook.approved.lock().unwrap().len(), 1);
    assert!(hook.circulated.lock().unwrap().is_empty());

    // A failed circulate must not notify.
    let staff = Actor::new(Uuid::new_v4(), Role::Staff).in_department(fx.child);
    assert!(fx.engine.circulate(&staff, notice.uuid).is_err());
    assert!(hook.circulated.lock().unwrap().is_empty());

    fx.engine.circulate(&fx.admin, notice.uuid).unwrap();
    let events = hook.circulated.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].notice_id, notice.uuid);
    assert_eq!(events[0].title, "Push me");
    assert_eq!(events[0].priority, Priority::Urgent);
    assert_eq!(
        set(&events[0].target_department_ids),
        set(&[fx.parent, fx.child])
    );
}
