use noticeflow_core::repo::report_repo::{ReportRepository, SqliteReportRepository};
use noticeflow_core::{
    now_epoch_ms, Actor, DeliveryReport, EngineConfig, ErrorKind, NewDepartment, NewNotice,
    NoticeEngine, NoticeId, OfficeType, Role,
};
use std::collections::BTreeSet;
use uuid::Uuid;

const HOUR_MS: i64 = 60 * 60 * 1000;

fn setup() -> (NoticeEngine, Actor) {
    let engine = NoticeEngine::open_in_memory(EngineConfig::default()).unwrap();
    (engine, Actor::new(Uuid::new_v4(), Role::Admin))
}

fn department(engine: &NoticeEngine, admin: &Actor, name: &str) -> Uuid {
    engine
        .create_department(admin, NewDepartment::new(name, OfficeType::Division))
        .unwrap()
        .uuid
}

fn approved(
    engine: &NoticeEngine,
    admin: &Actor,
    input: NewNotice,
    targets: &[Uuid],
) -> NoticeId {
    let notice = engine.create_notice(admin, input).unwrap();
    engine.submit_for_approval(admin, notice.uuid).unwrap();
    let targets: BTreeSet<Uuid> = targets.iter().copied().collect();
    engine.approve(admin, notice.uuid, &targets).unwrap();
    notice.uuid
}

fn circulated(engine: &NoticeEngine, admin: &Actor, title: &str, targets: &[Uuid]) -> NoticeId {
    let input = NewNotice::new(title, "body", "normal");
    let id = approved(engine, admin, input, targets);
    engine.circulate(admin, id).unwrap();
    id
}

#[test]
fn department_dashboard_counts_unseen_circulated_notices() {
    let (engine, admin) = setup();
    let office = department(&engine, &admin, "Karnali Office");

    let first = circulated(&engine, &admin, "Holiday Notice", &[office]);
    circulated(&engine, &admin, "Budget Notice", &[office]);
    approved(
        &engine,
        &admin,
        NewNotice::new("Not yet live", "body", "low"),
        &[office],
    );

    let dashboard = engine.department_dashboard(&admin, office).unwrap();
    assert_eq!(dashboard.department_uuid, office);
    assert_eq!(dashboard.unseen_count, 2);
    assert_eq!(dashboard.downloads, 0);
    assert_eq!(dashboard.recent.len(), 3);

    engine.record_download(first, office).unwrap();
    let dashboard = engine.department_dashboard(&admin, office).unwrap();
    assert_eq!(dashboard.unseen_count, 1);
    assert_eq!(dashboard.downloads, 1);
}

#[test]
fn department_dashboard_counts_views_without_downloads() {
    let (engine, admin) = setup();
    let office = department(&engine, &admin, "Madhesh Office");

    let first = circulated(&engine, &admin, "Holiday Notice", &[office]);
    circulated(&engine, &admin, "Budget Notice", &[office]);
    circulated(&engine, &admin, "Audit Notice", &[office]);
    engine.record_view(first, office).unwrap();

    let dashboard = engine.department_dashboard(&admin, office).unwrap();
    assert_eq!(dashboard.unseen_count, 2);
    assert_eq!(dashboard.downloads, 0);
    assert_eq!(dashboard.recent.len(), 3);
}

#[test]
fn department_dashboard_is_scoped_to_callers_department() {
    let (engine, admin) = setup();
    let own = department(&engine, &admin, "Own");
    let other = department(&engine, &admin, "Other");

    let head = Actor::new(Uuid::new_v4(), Role::DepartmentHead).in_department(own);
    assert!(engine.department_dashboard(&head, own).is_ok());
    assert_eq!(
        engine
            .department_dashboard(&head, other)
            .unwrap_err()
            .kind(),
        ErrorKind::Forbidden
    );

    let it = Actor::new(Uuid::new_v4(), Role::ItManager);
    assert!(engine.department_dashboard(&it, other).is_ok());
    assert_eq!(
        engine
            .department_dashboard(&admin, Uuid::new_v4())
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn dashboard_totals_reflect_current_state() {
    let (engine, admin) = setup();
    let north = department(&engine, &admin, "North");
    let south = department(&engine, &admin, "South");
    let closed = department(&engine, &admin, "Closed");
    engine.deactivate_department(&admin, closed).unwrap();

    let urgent = approved(
        &engine,
        &admin,
        NewNotice::new("Flood warning", "Evacuate.", "urgent"),
        &[north, south],
    );
    engine.circulate(&admin, urgent).unwrap();
    engine.record_view(urgent, north).unwrap();

    engine
        .create_notice(&admin, NewNotice::new("Draft", "body", "normal"))
        .unwrap();

    let lapsed = approved(
        &engine,
        &admin,
        NewNotice::new("Lapsed", "body", "low").expiring_at(now_epoch_ms() - HOUR_MS),
        &[south],
    );

    let rejected = engine
        .create_notice(&admin, NewNotice::new("Withdrawn", "body", "urgent"))
        .unwrap();
    engine.submit_for_approval(&admin, rejected.uuid).unwrap();
    engine.reject(&admin, rejected.uuid, "Superseded").unwrap();

    let totals = engine.dashboard_totals().unwrap();
    // The read-time sweep archived the lapsed notice first.
    assert_eq!(
        engine.get_notice(lapsed).unwrap().status.as_str(),
        "archived"
    );
    assert_eq!(totals.total_notices, 3);
    assert_eq!(totals.urgent_notices, 2);
    assert_eq!(totals.active_departments, 2);
    assert_eq!(totals.delivered_reports, 1);
    assert_eq!(totals.failed_deliveries, 1);
}

#[test]
fn stale_rows_without_expiry_count_as_failed_after_window() {
    let (engine, admin) = setup();
    let north = department(&engine, &admin, "North");
    let south = department(&engine, &admin, "South");
    let notice = circulated(&engine, &admin, "Circular", &[north, south]);
    engine.record_view(notice, north).unwrap();

    let repo = SqliteReportRepository::try_new(engine.connection()).unwrap();
    let window = 48 * HOUR_MS;
    let now = now_epoch_ms();

    let fresh = repo.dashboard_totals(now, window).unwrap();
    assert_eq!(fresh.failed_deliveries, 0);

    let later = repo.dashboard_totals(now + 49 * HOUR_MS, window).unwrap();
    assert_eq!(later.failed_deliveries, 1);
    assert_eq!(later.delivered_reports, 1);
}

#[test]
fn tracking_reads_are_narrowed_for_department_roles() {
    let (engine, admin) = setup();
    let north = department(&engine, &admin, "North");
    let south = department(&engine, &admin, "South");
    let notice = circulated(&engine, &admin, "Circular", &[north, south]);
    engine.record_view(notice, north).unwrap();

    assert_eq!(engine.tracking_for(&admin, notice).unwrap().len(), 2);

    let staff = Actor::new(Uuid::new_v4(), Role::Staff).in_department(south);
    let visible = engine.tracking_for(&staff, notice).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].department_uuid, south);

    assert_eq!(
        engine.delivery_report(&admin, notice).unwrap(),
        DeliveryReport {
            targeted: 2,
            viewed: 1,
            downloaded: 0,
            pending: 1,
        }
    );
    assert_eq!(engine.delivery_report(&staff, notice).unwrap().pending, 1);

    assert_eq!(
        engine
            .tracking_for(&admin, Uuid::new_v4())
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        engine
            .activity_for_notice(Uuid::new_v4())
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn dashboard_payloads_serialize_with_wire_names() {
    let (engine, admin) = setup();
    let office = department(&engine, &admin, "Bagmati Office");
    circulated(&engine, &admin, "Holiday Notice", &[office]);

    let totals = serde_json::to_value(engine.dashboard_totals().unwrap()).unwrap();
    assert_eq!(totals["total_notices"], 1);
    assert_eq!(totals["active_departments"], 1);
    assert_eq!(totals["failed_deliveries"], 0);

    let dashboard =
        serde_json::to_value(engine.department_dashboard(&admin, office).unwrap()).unwrap();
    assert_eq!(dashboard["unseen_count"], 1);
    assert_eq!(dashboard["recent"][0]["status"], "circulated");
    assert_eq!(dashboard["recent"][0]["priority"], "normal");
}
