//! Per-(notice, department) delivery tracking model.
//!
//! # Invariants
//! - At most one record exists per `(notice_uuid, department_uuid)`.
//! - `viewed_at` is written once; the first write wins.
//! - `downloaded` never goes back to `false`, and a download implies a view.

use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use serde::Serialize;

/// Durable delivery state for one targeted department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    pub notice_uuid: NoticeId,
    pub department_uuid: DepartmentId,
    /// Fan-out time in epoch ms.
    pub created_at: i64,
    pub viewed_at: Option<i64>,
    pub downloaded: bool,
    pub downloaded_at: Option<i64>,
}

impl TrackingRecord {
    pub fn is_viewed(&self) -> bool {
        self.viewed_at.is_some()
    }

    /// Neither viewed nor downloaded yet.
    pub fn is_pending(&self) -> bool {
        self.viewed_at.is_none() && !self.downloaded
    }
}

/// Per-notice delivery rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub targeted: u64,
    pub viewed: u64,
    pub downloaded: u64,
    pub pending: u64,
}

impl DeliveryReport {
    pub fn from_records(records: &[TrackingRecord]) -> Self {
        records.iter().fold(Self::default(), |mut report, record| {
            report.targeted += 1;
            if record.is_viewed() {
                report.viewed += 1;
            }
            if record.downloaded {
                report.downloaded += 1;
            }
            if record.is_pending() {
                report.pending += 1;
            }
            report
        })
    }
}
