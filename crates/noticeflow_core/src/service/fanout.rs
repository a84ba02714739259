//! Distribution fan-out: one tracking row per resolved target.
//!
//! Each insert commits on its own. An interrupted fan-out leaves a prefix of
//! rows behind; running it again with the same or a larger set fills the gap
//! without touching rows that already exist.

use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use crate::repo::tracking_repo::TrackingRepository;
use crate::repo::RepoResult;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// Departments that received a new tracking row in this pass.
    pub created: Vec<DepartmentId>,
    /// Departments that already had one.
    pub existing: Vec<DepartmentId>,
}

/// Materializes missing tracking rows for `targets`.
pub fn fan_out<T: TrackingRepository>(
    repo: &T,
    notice_uuid: NoticeId,
    targets: &BTreeSet<DepartmentId>,
    now_ms: i64,
) -> RepoResult<FanOutReport> {
    let mut report = FanOutReport::default();
    for &department_uuid in targets {
        if repo.insert_if_absent(notice_uuid, department_uuid, now_ms)? {
            report.created.push(department_uuid);
        } else {
            report.existing.push(department_uuid);
        }
    }
    debug!(
        "event=fan_out module=fanout status=ok notice_id={notice_uuid} created={} existing={}",
        report.created.len(),
        report.existing.len()
    );
    Ok(report)
}
