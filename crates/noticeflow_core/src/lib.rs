//! Notice distribution and delivery-tracking engine.
//! This crate is the single source of truth for lifecycle and ledger invariants.

pub mod config;
pub mod db;
pub mod engine;
pub mod hooks;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig, LoggingConfig};
pub use engine::NoticeEngine;
pub use hooks::{HookRegistry, NoticeEvent, NoticeHook};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LoggingError,
};
pub use model::activity::ActivityEntry;
pub use model::actor::{Actor, Role, UserId};
pub use model::department::{
    Department, DepartmentContact, DepartmentId, DepartmentTree, NewDepartment, OfficeType,
    Province,
};
pub use model::notice::{NewNotice, Notice, NoticeAction, NoticeId, NoticeStatus, Priority};
pub use model::tracking::{DeliveryReport, TrackingRecord};
pub use model::{now_epoch_ms, ValidationError};
pub use repo::notice_repo::NoticeListQuery;
pub use repo::report_repo::{DashboardTotals, DepartmentDashboard};
pub use repo::{RepoError, RepoResult};
pub use service::error::{EngineError, EngineResult, EntityKind, ErrorKind};
pub use service::expiry_sweeper::SweepReport;
pub use service::fanout::FanOutReport;
pub use service::notice_service::ApprovalOutcome;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
