//! Engine-level failure taxonomy.
//!
//! # Responsibility
//! - Describe every typed failure returned across the hub boundary.
//! - Provide stable reason codes for audit metadata.
//!
//! # Invariants
//! - `reason_code()` values are stable snake_case strings.
//! - Gate failures are never written to the audit log.

use crate::model::payload::PayloadError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type NotificationResult<T> = Result<T, NotificationError>;

/// Typed failure returned by hub operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    ModuleNotRegistered(String),
    ModuleDisabled(String),
    NotificationsDisabledGlobally,
    NotificationsDisabledForModule(String),
    ScheduleTimeInPast { scheduled_at_ms: i64, now_ms: i64 },
    QuietHoursBlocked { scheduled_at_ms: i64 },
    DeliveryFailed { native: Option<String>, plugin: String },
    PayloadUnparseable(String),
    AdapterNotRegistered(String),
    ActionNotHandled { module_id: String, action_id: String },
    MaxSnoozeReached { count: u32, max: u32 },
    InvalidNotificationId(i32),
}

impl NotificationError {
    /// Machine-readable reason code stored in `metadata.reason_code`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ModuleNotRegistered(_) => "module_not_registered",
            Self::ModuleDisabled(_) => "module_disabled",
            Self::NotificationsDisabledGlobally => "notifications_disabled_globally",
            Self::NotificationsDisabledForModule(_) => "notifications_disabled_for_module",
            Self::ScheduleTimeInPast { .. } => "schedule_time_in_past",
            Self::QuietHoursBlocked { .. } => "quiet_hours_blocked",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::PayloadUnparseable(_) => "payload_unparseable",
            Self::AdapterNotRegistered(_) => "adapter_not_registered",
            Self::ActionNotHandled { .. } => "action_not_handled",
            Self::MaxSnoozeReached { .. } => "max_snooze_reached",
            Self::InvalidNotificationId(_) => "invalid_notification_id",
        }
    }

    /// Returns whether this failure comes from a pre-pipeline gate.
    pub fn is_gate_failure(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotRegistered(_)
                | Self::ModuleDisabled(_)
                | Self::NotificationsDisabledGlobally
                | Self::NotificationsDisabledForModule(_)
        )
    }
}

impl Display for NotificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleNotRegistered(id) => write!(f, "module `{id}` is not registered"),
            Self::ModuleDisabled(id) => write!(f, "module `{id}` is disabled"),
            Self::NotificationsDisabledGlobally => write!(f, "notifications are turned off"),
            Self::NotificationsDisabledForModule(id) => {
                write!(f, "notifications are turned off for `{id}`")
            }
            Self::ScheduleTimeInPast {
                scheduled_at_ms,
                now_ms,
            } => write!(
                f,
                "reminder time {scheduled_at_ms} is already in the past (now {now_ms})"
            ),
            Self::QuietHoursBlocked { scheduled_at_ms } => write!(
                f,
                "no time outside quiet hours found after {scheduled_at_ms}"
            ),
            Self::DeliveryFailed { native, plugin } => match native {
                Some(native) => write!(
                    f,
                    "delivery failed: native path ({native}), notification path ({plugin})"
                ),
                None => write!(f, "delivery failed: {plugin}"),
            },
            Self::PayloadUnparseable(raw) => write!(f, "notification payload is unreadable: {raw}"),
            Self::AdapterNotRegistered(id) => write!(f, "no handler registered for `{id}`"),
            Self::ActionNotHandled {
                module_id,
                action_id,
            } => write!(f, "action `{action_id}` was not handled by `{module_id}`"),
            Self::MaxSnoozeReached { count, max } => {
                write!(f, "snooze limit reached ({count} of {max})")
            }
            Self::InvalidNotificationId(id) => write!(f, "notification id {id} is invalid"),
        }
    }
}

impl Error for NotificationError {}

impl From<PayloadError> for NotificationError {
    fn from(value: PayloadError) -> Self {
        Self::PayloadUnparseable(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::NotificationError;

    #[test]
    fn only_the_four_gates_are_gate_failures() {
        let gates = [
            NotificationError::ModuleNotRegistered("mood".to_string()),
            NotificationError::ModuleDisabled("task".to_string()),
            NotificationError::NotificationsDisabledGlobally,
            NotificationError::NotificationsDisabledForModule("habit".to_string()),
        ];
        assert!(gates.iter().all(NotificationError::is_gate_failure));

        let logged = NotificationError::QuietHoursBlocked { scheduled_at_ms: 0 };
        assert!(!logged.is_gate_failure());
        assert_eq!(logged.reason_code(), "quiet_hours_blocked");
    }

    #[test]
    fn delivery_failure_mentions_both_paths() {
        let err = NotificationError::DeliveryFailed {
            native: Some("exact alarm denied".to_string()),
            plugin: "channel missing".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("exact alarm denied"));
        assert!(message.contains("channel missing"));
    }
}
