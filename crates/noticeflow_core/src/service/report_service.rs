//! Read-side reporting service.
//!
//! # Responsibility
//! - Serve dashboards, per-notice tracking and audit reads.
//! - Apply role scoping: department-scoped callers only see their own
//!   department's rows.

use crate::model::activity::ActivityEntry;
use crate::model::actor::Actor;
use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use crate::model::tracking::{DeliveryReport, TrackingRecord};
use crate::repo::activity_repo::ActivityRepository;
use crate::repo::report_repo::{DashboardTotals, DepartmentDashboard, ReportRepository};
use crate::repo::tracking_repo::TrackingRepository;
use crate::service::error::{EngineError, EngineResult, EntityKind};

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Dashboard and report reader.
pub struct ReportService<R, T, A>
where
    R: ReportRepository,
    T: TrackingRepository,
    A: ActivityRepository,
{
    reports: R,
    tracking: T,
    activity: A,
}

impl<R, T, A> ReportService<R, T, A>
where
    R: ReportRepository,
    T: TrackingRepository,
    A: ActivityRepository,
{
    pub fn new(reports: R, tracking: T, activity: A) -> Self {
        Self {
            reports,
            tracking,
            activity,
        }
    }

    /// Global counters as of `now_ms`.
    ///
    /// Tracking rows of notices without expiry count as failed once they are
    /// older than `failed_delivery_window_hours`.
    pub fn dashboard_totals(
        &self,
        now_ms: i64,
        failed_delivery_window_hours: u32,
    ) -> EngineResult<DashboardTotals> {
        let window_ms = i64::from(failed_delivery_window_hours) * MS_PER_HOUR;
        Ok(self.reports.dashboard_totals(now_ms, window_ms)?)
    }

    pub fn department_dashboard(
        &self,
        actor: &Actor,
        department_uuid: DepartmentId,
        recent_limit: u32,
    ) -> EngineResult<DepartmentDashboard> {
        require_department_scope(actor, department_uuid, "department_dashboard")?;
        Ok(self
            .reports
            .department_dashboard(department_uuid, recent_limit)?)
    }

    /// Tracking rows for one notice, narrowed to the caller's department
    /// for department-scoped roles.
    pub fn tracking_for(
        &self,
        actor: &Actor,
        notice_uuid: NoticeId,
    ) -> EngineResult<Vec<TrackingRecord>> {
        self.require_notice(notice_uuid)?;
        let mut records = self.tracking.list_for_notice(notice_uuid)?;
        if actor.role.is_department_scoped() {
            records.retain(|record| actor.can_read_department(record.department_uuid));
        }
        Ok(records)
    }

    pub fn delivery_report(
        &self,
        actor: &Actor,
        notice_uuid: NoticeId,
    ) -> EngineResult<DeliveryReport> {
        let records = self.tracking_for(actor, notice_uuid)?;
        Ok(DeliveryReport::from_records(&records))
    }

    pub fn downloads_for_department(
        &self,
        actor: &Actor,
        department_uuid: DepartmentId,
    ) -> EngineResult<Vec<TrackingRecord>> {
        require_department_scope(actor, department_uuid, "downloads_for_department")?;
        if !self.reports.department_exists(department_uuid)? {
            return Err(EngineError::not_found(
                EntityKind::Department,
                department_uuid,
            ));
        }
        let rows = self
            .tracking
            .list_downloads_for_department(department_uuid)?;
        Ok(rows)
    }

    pub fn activity_for_notice(&self, notice_uuid: NoticeId) -> EngineResult<Vec<ActivityEntry>> {
        self.require_notice(notice_uuid)?;
        Ok(self.activity.list_for_notice(notice_uuid)?)
    }

    fn require_notice(&self, notice_uuid: NoticeId) -> EngineResult<()> {
        if self.reports.notice_exists(notice_uuid)? {
            Ok(())
        } else {
            Err(EngineError::not_found(EntityKind::Notice, notice_uuid))
        }
    }
}

fn require_department_scope(
    actor: &Actor,
    department_uuid: DepartmentId,
    operation: &'static str,
) -> EngineResult<()> {
    if actor.can_read_department(department_uuid) {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            role: actor.role,
            operation,
        })
    }
}
