//! Engine use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the engine's operations.
//! - Own role checks, retries and cross-repository invariants.

pub mod directory_service;
pub mod error;
pub mod expiry_sweeper;
pub mod fanout;
pub mod ledger_service;
pub mod notice_service;
pub mod report_service;
mod retry;
