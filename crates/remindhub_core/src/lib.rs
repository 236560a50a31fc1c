//! Core domain logic for RemindHub.
//! This crate is the single source of truth for reminder scheduling
//! invariants.

pub mod db;
pub mod engine;
pub mod error;
pub mod journal;
pub mod logging;
pub mod model;
pub mod platform;
pub mod registry;
pub mod repo;
pub mod settings;
pub mod store;

pub use engine::hub::{
    HubConfig, NotificationHub, NotificationHubBuilder, ProjectionSource, ReconcileReport,
    ScheduledProjection,
};
pub use engine::ids::{derive_notification_id, Fingerprint, BACKUP_ID_OFFSET};
pub use error::{NotificationError, NotificationResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::log_entry::{DashboardSummary, LogEntry, LogEvent, LogQuery};
pub use model::module::ModuleDescriptor;
pub use model::payload::{NotificationPayload, PayloadError};
pub use model::request::{NotificationPriority, ScheduleRequest, ScheduledNotification};
pub use registry::adapter_registry::NotificationAdapter;
pub use repo::log_repo::{
    compact_scheduled, NotificationLogRepository, RepoError, RepoResult,
    SqliteNotificationLogRepository,
};
pub use store::{MemoryKeyValueStore, SqliteKeyValueStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
