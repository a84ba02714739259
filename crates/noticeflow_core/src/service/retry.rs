//! Bounded retry for atomic storage operations.

use crate::service::error::{EngineError, EngineResult};
use log::warn;
use std::thread;
use std::time::Duration;

const BACKOFF_STEP_MS: u64 = 5;

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `limit` attempts were spent. The closure receives the 1-based attempt number
/// and must re-read any state it validates.
pub(crate) fn with_retry<T>(
    operation: &'static str,
    limit: u32,
    mut attempt: impl FnMut(u32) -> EngineResult<T>,
) -> EngineResult<T> {
    let limit = limit.max(1);
    for current in 1..=limit {
        match attempt(current) {
            Err(err) if err.is_retryable() => {
                warn!(
                    "event=storage_retry module=service status=retry operation={operation} attempt={current} limit={limit} error={err}"
                );
                if current < limit {
                    thread::sleep(Duration::from_millis(BACKOFF_STEP_MS * u64::from(current)));
                }
            }
            other => return other,
        }
    }
    Err(EngineError::ConcurrencyConflict {
        operation,
        attempts: limit,
    })
}
