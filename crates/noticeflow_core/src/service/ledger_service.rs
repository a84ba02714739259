//! Delivery tracking ledger use-case service.
//!
//! # Invariants
//! - Only departments that were fan-out targets can record events.
//! - The first view wins; repeated calls return the stored timestamp.
//! - A download sets the view as well when none was recorded.

use crate::model::department::DepartmentId;
use crate::model::notice::NoticeId;
use crate::model::tracking::TrackingRecord;
use crate::repo::tracking_repo::TrackingRepository;
use crate::service::error::EngineResult;
use crate::service::retry::with_retry;
use log::debug;

const DEFAULT_RETRY_LIMIT: u32 = 3;

/// View/download recorder.
pub struct LedgerService<T: TrackingRepository> {
    repo: T,
    retry_limit: u32,
}

impl<T: TrackingRepository> LedgerService<T> {
    pub fn new(repo: T) -> Self {
        Self {
            repo,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit.max(1);
        self
    }

    /// Records a view and returns the stored record.
    ///
    /// # Errors
    /// `NotFound` when the department was never targeted by the notice.
    pub fn record_view(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> EngineResult<TrackingRecord> {
        let record = with_retry("record_view", self.retry_limit, |_| {
            Ok(self.repo.mark_viewed(notice_uuid, department_uuid, at_ms)?)
        })?;
        debug!(
            "event=record_view module=ledger status=ok notice_id={notice_uuid} department_id={department_uuid} first_view={}",
            record.viewed_at == Some(at_ms)
        );
        Ok(record)
    }

    /// Records a download and returns the stored record.
    pub fn record_download(
        &self,
        notice_uuid: NoticeId,
        department_uuid: DepartmentId,
        at_ms: i64,
    ) -> EngineResult<TrackingRecord> {
        let record = with_retry("record_download", self.retry_limit, |_| {
            Ok(self
                .repo
                .mark_downloaded(notice_uuid, department_uuid, at_ms)?)
        })?;
        debug!(
            "event=record_download module=ledger status=ok notice_id={notice_uuid} department_id={department_uuid} first_download={}",
            record.downloaded_at == Some(at_ms)
        );
        Ok(record)
    }
}
