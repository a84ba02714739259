//! Expiry sweeper: archives approved/circulated notices past their expiry.
//!
//! # Invariants
//! - Notices without an expiry date are never touched.
//! - One failing notice is logged and skipped; the sweep continues.
//! - Running twice archives nothing the second time.

use crate::repo::department_repo::DepartmentRepository;
use crate::repo::notice_repo::NoticeRepository;
use crate::repo::tracking_repo::TrackingRepository;
use crate::service::error::EngineResult;
use crate::service::notice_service::NoticeService;
use log::{info, warn};
use serde::Serialize;
use std::time::Instant;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates found past expiry.
    pub scanned: u64,
    pub archived: u64,
    /// Candidates archived concurrently by someone else.
    pub skipped: u64,
    pub failed: u64,
}

/// Runs one expiry pass over all candidates as of `now_ms`.
///
/// Only listing the candidates can fail the sweep as a whole.
pub fn sweep_expired<N, D, T>(
    notices: &NoticeService<N, D, T>,
    now_ms: i64,
) -> EngineResult<SweepReport>
where
    N: NoticeRepository,
    D: DepartmentRepository,
    T: TrackingRepository,
{
    let started_at = Instant::now();
    let candidates = notices.expirable(now_ms)?;
    let mut report = SweepReport {
        scanned: candidates.len() as u64,
        ..SweepReport::default()
    };

    for id in candidates {
        match notices.expire(id, now_ms) {
            Ok(true) => report.archived += 1,
            Ok(false) => report.skipped += 1,
            Err(err) => {
                report.failed += 1;
                warn!(
                    "event=expiry_sweep_item module=sweeper status=error notice_id={id} error_kind={} error={err}",
                    err.kind().as_str()
                );
            }
        }
    }

    info!(
        "event=expiry_sweep module=sweeper status=ok scanned={} archived={} skipped={} failed={} duration_ms={}",
        report.scanned,
        report.archived,
        report.skipped,
        report.failed,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}
