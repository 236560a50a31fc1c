//! Schedule request and result models.
//!
//! # Responsibility
//! - Carry one producer call into the engine as a typed value.
//! - Describe the outcome of a successful schedule.
//!
//! # Invariants
//! - Requests are transient and never persisted.
//! - `notification_id`, when set, replaces the derived ID verbatim.

use crate::model::delivery::{DeliveryOverride, TYPE_REMINDER};
use crate::model::payload::{NotificationPayload, EXTRA_PRIORITY, EXTRA_TYPE};
use crate::model::tracked::DispatchPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority tier shown to the OS and used by smart snooze.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Default,
    High,
    Max,
}

impl NotificationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
            Self::Max => "max",
        }
    }

    /// Parses a persisted tier; unknown values map to `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "min" => Some(Self::Low),
            "default" | "normal" => Some(Self::Default),
            "high" => Some(Self::High),
            "max" | "critical" => Some(Self::Max),
            _ => None,
        }
    }
}

/// Action button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

impl NotificationAction {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One producer request to schedule a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub module_id: String,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    /// Requested fire time, epoch milliseconds.
    pub scheduled_at_ms: i64,
    /// Notification type id resolved through the type registry.
    pub type_id: String,
    pub reminder_type: String,
    pub reminder_value: i64,
    pub reminder_unit: String,
    pub extras: BTreeMap<String, String>,
    /// Request-level delivery override, applied last.
    pub overrides: DeliveryOverride,
    pub priority: Option<NotificationPriority>,
    pub icon: Option<String>,
    pub action_buttons: Vec<NotificationAction>,
    /// Forces the native path.
    pub special: bool,
    /// Adds the local day to the ID fingerprint.
    pub unique_per_day: bool,
    pub notification_id: Option<i32>,
}

impl ScheduleRequest {
    pub fn new(
        module_id: impl Into<String>,
        entity_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        scheduled_at_ms: i64,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            entity_id: entity_id.into(),
            title: title.into(),
            body: body.into(),
            scheduled_at_ms,
            type_id: TYPE_REMINDER.to_string(),
            reminder_type: String::new(),
            reminder_value: 0,
            reminder_unit: String::new(),
            extras: BTreeMap::new(),
            overrides: DeliveryOverride::default(),
            priority: None,
            icon: None,
            action_buttons: Vec::new(),
            special: false,
            unique_per_day: false,
            notification_id: None,
        }
    }

    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = type_id.into();
        self
    }

    pub fn with_reminder(
        mut self,
        reminder_type: impl Into<String>,
        reminder_value: i64,
        reminder_unit: impl Into<String>,
    ) -> Self {
        self.reminder_type = reminder_type.into();
        self.reminder_value = reminder_value;
        self.reminder_unit = reminder_unit.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn with_overrides(mut self, overrides: DeliveryOverride) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action_buttons.push(action);
        self
    }

    pub fn special(mut self) -> Self {
        self.special = true;
        self
    }

    pub fn unique_per_day(mut self) -> Self {
        self.unique_per_day = true;
        self
    }

    pub fn with_notification_id(mut self, notification_id: i32) -> Self {
        self.notification_id = Some(notification_id);
        self
    }

    /// Builds the wire payload; the type and priority travel as extras.
    pub fn payload(&self) -> NotificationPayload {
        let mut payload = NotificationPayload::new(&self.module_id, &self.entity_id)
            .with_reminder(
                &self.reminder_type,
                self.reminder_value,
                &self.reminder_unit,
            );
        payload.extras = self.extras.clone();
        payload
            .extras
            .entry(EXTRA_TYPE.to_string())
            .or_insert_with(|| self.type_id.clone());
        if let Some(priority) = self.priority {
            payload
                .extras
                .insert(EXTRA_PRIORITY.to_string(), priority.as_str().to_string());
        }
        payload
    }
}

/// Outcome of a successful schedule or snooze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub notification_id: i32,
    pub module_id: String,
    pub entity_id: String,
    /// Actual fire time after quiet-hours deferral, epoch milliseconds.
    pub fire_at_ms: i64,
    pub path: DispatchPath,
    pub deferred_by_quiet_hours: bool,
}
