//! Domain model for notice distribution and delivery tracking.
//!
//! # Responsibility
//! - Define canonical data structures used by engine business logic.
//! - Own pure invariants: the notice transition table, priority ordering and
//!   the department forest.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Nothing in the model is ever hard-deleted; departments deactivate and
//!   notices archive.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod activity;
pub mod actor;
pub mod department;
pub mod notice;
pub mod tracking;

/// Field-level input rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Input field that failed validation.
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid `{}`: {}", self.field, self.message)
    }
}

impl Error for ValidationError {}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Trims a value and maps blank input to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
