//! Engine facade over one SQLite connection.
//!
//! # Responsibility
//! - Own the store handle, configuration and registered hooks.
//! - Expose every engine operation with the current time filled in.
//!
//! # Invariants
//! - One engine per request-handling unit; engines share state only through
//!   the database file.
//! - Hooks fire only after the change they describe has committed.

use crate::config::EngineConfig;
use crate::db::{open_db, open_db_in_memory};
use crate::hooks::{HookRegistry, NoticeHook};
use crate::model::activity::ActivityEntry;
use crate::model::actor::Actor;
use crate::model::department::{Department, DepartmentContact, DepartmentId, NewDepartment};
use crate::model::notice::{NewNotice, Notice, NoticeId};
use crate::model::now_epoch_ms;
use crate::model::tracking::{DeliveryReport, TrackingRecord};
use crate::repo::activity_repo::SqliteActivityRepository;
use crate::repo::department_repo::SqliteDepartmentRepository;
use crate::repo::notice_repo::{NoticeListQuery, SqliteNoticeRepository};
use crate::repo::report_repo::{DashboardTotals, DepartmentDashboard, SqliteReportRepository};
use crate::repo::tracking_repo::SqliteTrackingRepository;
use crate::service::directory_service::DirectoryService;
use crate::service::error::{EngineError, EngineResult};
use crate::service::expiry_sweeper::{sweep_expired, SweepReport};
use crate::service::ledger_service::LedgerService;
use crate::service::notice_service::{ApprovalOutcome, NoticeService};
use crate::service::report_service::ReportService;
use log::warn;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

type SqliteNoticeService<'conn> = NoticeService<
    SqliteNoticeRepository<'conn>,
    SqliteDepartmentRepository<'conn>,
    SqliteTrackingRepository<'conn>,
>;
type SqliteReportService<'conn> = ReportService<
    SqliteReportRepository<'conn>,
    SqliteTrackingRepository<'conn>,
    SqliteActivityRepository<'conn>,
>;

/// Notice distribution engine bound to one connection.
pub struct NoticeEngine {
    conn: Connection,
    config: EngineConfig,
    hooks: HookRegistry,
}

impl NoticeEngine {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        Ok(Self::from_connection(open_db(path)?, config))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(config: EngineConfig) -> EngineResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?, config))
    }

    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn from_connection(conn: Connection, config: EngineConfig) -> Self {
        Self {
            conn,
            config,
            hooks: HookRegistry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn register_hook(&mut self, hook: Arc<dyn NoticeHook>) {
        self.hooks.register(hook);
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    // Department directory.

    pub fn create_department(
        &self,
        actor: &Actor,
        input: NewDepartment,
    ) -> EngineResult<Department> {
        self.directory()?.create(actor, input, now_epoch_ms())
    }

    pub fn get_department(&self, id: DepartmentId) -> EngineResult<Department> {
        self.directory()?.get(id)
    }

    pub fn list_departments(&self, include_inactive: bool) -> EngineResult<Vec<Department>> {
        self.directory()?.list(include_inactive)
    }

    pub fn list_children(
        &self,
        parent_uuid: DepartmentId,
        include_inactive: bool,
    ) -> EngineResult<Vec<Department>> {
        self.directory()?
            .list_children(parent_uuid, include_inactive)
    }

    pub fn resolve_targets(
        &self,
        department_ids: &BTreeSet<DepartmentId>,
    ) -> EngineResult<BTreeSet<DepartmentId>> {
        self.directory()?.resolve_targets(department_ids)
    }

    pub fn assign_parent(
        &self,
        actor: &Actor,
        id: DepartmentId,
        parent_uuid: Option<DepartmentId>,
    ) -> EngineResult<Department> {
        self.directory()?
            .assign_parent(actor, id, parent_uuid, now_epoch_ms())
    }

    pub fn update_contact(
        &self,
        actor: &Actor,
        id: DepartmentId,
        contact: DepartmentContact,
    ) -> EngineResult<Department> {
        self.directory()?
            .update_contact(actor, id, contact, now_epoch_ms())
    }

    pub fn deactivate_department(&self, actor: &Actor, id: DepartmentId) -> EngineResult<bool> {
        self.directory()?.deactivate(actor, id, now_epoch_ms())
    }

    // Notice store.

    pub fn create_notice(&self, actor: &Actor, input: NewNotice) -> EngineResult<Notice> {
        self.notices()?.create(actor, input, now_epoch_ms())
    }

    /// Edits a draft or pending notice in place.
    pub fn update_notice(
        &self,
        actor: &Actor,
        id: NoticeId,
        input: NewNotice,
    ) -> EngineResult<Notice> {
        self.notices()?.update(actor, id, input, now_epoch_ms())
    }

    pub fn get_notice(&self, id: NoticeId) -> EngineResult<Notice> {
        self.notices()?.get(id)
    }

    /// Lists notices after an opportunistic expiry sweep.
    pub fn list_notices(&self, query: &NoticeListQuery) -> EngineResult<Vec<Notice>> {
        self.sweep_before_read();
        self.notices()?.list(query)
    }

    /// Circulated notices, urgent first, optionally only those targeting `department`.
    pub fn noticeboard(
        &self,
        department: Option<DepartmentId>,
        limit: Option<u32>,
    ) -> EngineResult<Vec<Notice>> {
        self.sweep_before_read();
        let limit = limit.unwrap_or(self.config.dashboard_recent_limit);
        self.notices()?.noticeboard(department, limit)
    }

    pub fn submit_for_approval(&self, actor: &Actor, id: NoticeId) -> EngineResult<Notice> {
        self.notices()?
            .submit_for_approval(actor, id, now_epoch_ms())
    }

    /// Approves for `department_ids` plus subtrees, then fires `on_approved`.
    pub fn approve(
        &self,
        actor: &Actor,
        id: NoticeId,
        department_ids: &BTreeSet<DepartmentId>,
    ) -> EngineResult<ApprovalOutcome> {
        let outcome = self
            .notices()?
            .approve(actor, id, department_ids, now_epoch_ms())?;
        self.hooks.emit_approved(&outcome.notice);
        Ok(outcome)
    }

    /// Publishes an approved notice, then fires `on_circulated`.
    pub fn circulate(&self, actor: &Actor, id: NoticeId) -> EngineResult<Notice> {
        let notice = self.notices()?.circulate(actor, id, now_epoch_ms())?;
        self.hooks.emit_circulated(&notice);
        Ok(notice)
    }

    pub fn reject(&self, actor: &Actor, id: NoticeId, reason: &str) -> EngineResult<Notice> {
        self.notices()?.reject(actor, id, reason, now_epoch_ms())
    }

    /// System-driven archive of one expired notice.
    pub fn expire(&self, id: NoticeId) -> EngineResult<bool> {
        self.notices()?.expire(id, now_epoch_ms())
    }

    pub fn sweep_expired(&self) -> EngineResult<SweepReport> {
        self.sweep_expired_at(now_epoch_ms())
    }

    pub fn sweep_expired_at(&self, now_ms: i64) -> EngineResult<SweepReport> {
        sweep_expired(&self.notices()?, now_ms)
    }

    // Delivery tracking ledger.

    pub fn record_view(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    ) -> EngineResult<TrackingRecord> {
        self.ledger()?
            .record_view(notice_uuid, department_uuid, now_epoch_ms())
    }

    pub fn record_download(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
    ) -> EngineResult<TrackingRecord> {
        self.ledger()?
            .record_download(notice_uuid, department_uuid, now_epoch_ms())
    }

    /// Records a view for the caller's own department.
    pub fn view_as(&self, actor: &Actor, notice_uuid: NoticeId) -> EngineResult<TrackingRecord> {
        self.record_view(notice_uuid, caller_department(actor)?)
    }

    /// Records a download for the caller's own department.
    pub fn download_as(
        &self,
        actor: &Actor,
        notice_uuid: NoticeId,
    ) -> EngineResult<TrackingRecord> {
        self.record_download(notice_uuid, caller_department(actor)?)
    }

    // Reporting.

    pub fn dashboard_totals(&self) -> EngineResult<DashboardTotals> {
        self.sweep_before_read();
        self.reports()?
            .dashboard_totals(now_epoch_ms(), self.config.failed_delivery_window_hours)
    }

    pub fn department_dashboard(
        &self,
        actor: &Actor,
        department_uuid: DepartmentId,
    ) -> EngineResult<DepartmentDashboard> {
        self.sweep_before_read();
        self.reports()?.department_dashboard(
            actor,
            department_uuid,
            self.config.dashboard_recent_limit,
        )
    }

    pub fn tracking_for(
        &self,
        actor: &Actor,
        notice_uuid: NoticeId,
    ) -> EngineResult<Vec<TrackingRecord>> {
        self.reports()?.tracking_for(actor, notice_uuid)
    }

    pub fn delivery_report(
        &self,
        actor: &Actor,
        notice_uuid: NoticeId,
    ) -> EngineResult<DeliveryReport> {
        self.reports()?.delivery_report(actor, notice_uuid)
    }

    pub fn downloads_for_department(
        &self,
        actor: &Actor,
        department_uuid: DepartmentId,
    ) -> EngineResult<Vec<TrackingRecord>> {
        self.reports()?
            .downloads_for_department(actor, department_uuid)
    }

    pub fn activity_for_notice(&self, notice_uuid: NoticeId) -> EngineResult<Vec<ActivityEntry>> {
        self.reports()?.activity_for_notice(notice_uuid)
    }

    fn sweep_before_read(&self) {
        if !self.config.sweep_on_read {
            return;
        }
        if let Err(err) = self.sweep_expired() {
            warn!(
                "event=expiry_sweep module=engine status=error trigger=read error_kind={} error={err}",
                err.kind().as_str()
            );
        }
    }

    fn directory(&self) -> EngineResult<DirectoryService<SqliteDepartmentRepository<'_>>> {
        Ok(DirectoryService::new(SqliteDepartmentRepository::try_new(
            &self.conn,
        )?))
    }

    fn notices(&self) -> EngineResult<SqliteNoticeService<'_>> {
        Ok(NoticeService::new(
            SqliteNoticeRepository::try_new(&self.conn)?,
            SqliteDepartmentRepository::try_new(&self.conn)?,
            SqliteTrackingRepository::try_new(&self.conn)?,
        )
        .with_retry_limit(self.config.conflict_retry_limit))
    }

    fn ledger(&self) -> EngineResult<LedgerService<SqliteTrackingRepository<'_>>> {
        Ok(
            LedgerService::new(SqliteTrackingRepository::try_new(&self.conn)?)
                .with_retry_limit(self.config.conflict_retry_limit),
        )
    }

    fn reports(&self) -> EngineResult<SqliteReportService<'_>> {
        Ok(ReportService::new(
            SqliteReportRepository::try_new(&self.conn)?,
            SqliteTrackingRepository::try_new(&self.conn)?,
            SqliteActivityRepository::try_new(&self.conn)?,
        ))
    }
}

fn caller_department(actor: &Actor) -> EngineResult<DepartmentId> {
    actor.department_id.ok_or_else(|| {
        EngineError::validation("department_id", "caller has no department affiliation")
    })
}
