//! Audit log entry model and query options.
//!
//! # Responsibility
//! - Define the append-only lifecycle event record.
//! - Define list filters and the dashboard aggregate.
//!
//! # Invariants
//! - `metadata` is always a JSON object.
//! - Entries are never mutated after creation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata key carrying the machine-readable failure reason.
pub const METADATA_REASON_CODE: &str = "reason_code";

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    Scheduled,
    Delivered,
    Tapped,
    Action,
    Snoozed,
    Cancelled,
    Missed,
    Failed,
}

impl LogEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Delivered => "delivered",
            Self::Tapped => "tapped",
            Self::Action => "action",
            Self::Snoozed => "snoozed",
            Self::Cancelled => "cancelled",
            Self::Missed => "missed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "delivered" => Some(Self::Delivered),
            "tapped" => Some(Self::Tapped),
            "action" => Some(Self::Action),
            "snoozed" => Some(Self::Snoozed),
            "cancelled" => Some(Self::Cancelled),
            "missed" => Some(Self::Missed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One audit log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub module_id: String,
    pub entity_id: String,
    pub notification_id: Option<i32>,
    pub title: String,
    pub body: String,
    pub payload: Option<String>,
    pub action_id: Option<String>,
    pub event: LogEvent,
    pub metadata: Value,
    pub timestamp_ms: i64,
}

impl LogEntry {
    /// Creates an entry with a fresh v4 id and empty metadata.
    pub fn new(
        event: LogEvent,
        module_id: impl Into<String>,
        entity_id: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.into(),
            entity_id: entity_id.into(),
            notification_id: None,
            title: String::new(),
            body: String::new(),
            payload: None,
            action_id: None,
            event,
            metadata: Value::Object(Map::new()),
            timestamp_ms,
        }
    }

    pub fn with_notification_id(mut self, notification_id: Option<i32>) -> Self {
        self.notification_id = notification_id;
        self
    }

    pub fn with_content(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.title = title.into();
        self.body = body.into();
        self
    }

    pub fn with_payload(mut self, payload: Option<String>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    /// Adds one metadata field.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.metadata.is_object() {
            self.metadata = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn reason_code(&self) -> Option<&str> {
        self.metadata.get(METADATA_REASON_CODE)?.as_str()
    }
}

/// Filters for listing log entries. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub module_id: Option<String>,
    pub entity_id: Option<String>,
    pub notification_id: Option<i32>,
    /// Empty means every event.
    pub events: Vec<LogEvent>,
    pub since_ms: Option<i64>,
    pub until_ms: Option<i64>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl LogQuery {
    pub fn for_module(module_id: impl Into<String>) -> Self {
        Self {
            module_id: Some(module_id.into()),
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = LogEvent>) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Aggregate counts for the dashboard view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_events: u64,
    pub by_module: BTreeMap<String, u64>,
    pub by_event: BTreeMap<String, u64>,
    /// Local calendar day (`YYYY-MM-DD`) to event count.
    pub by_day: BTreeMap<String, u64>,
    pub pending_count: usize,
}

#[cfg(test)]
mod tests {
    use super::{LogEntry, LogEvent};

    #[test]
    fn event_names_roundtrip() {
        for event in [
            LogEvent::Scheduled,
            LogEvent::Delivered,
            LogEvent::Tapped,
            LogEvent::Action,
            LogEvent::Snoozed,
            LogEvent::Cancelled,
            LogEvent::Missed,
            LogEvent::Failed,
        ] {
            assert_eq!(LogEvent::parse(event.as_str()), Some(event));
        }
        assert_eq!(LogEvent::parse("fired"), None);
    }

    #[test]
    fn metadata_builder_keeps_object_shape() {
        let entry = LogEntry::new(LogEvent::Failed, "finance", "bill:1", 10)
            .with_meta("reason_code", "quiet_hours_blocked")
            .with_meta("attempts", 2);
        assert!(entry.metadata.is_object());
        assert_eq!(entry.reason_code(), Some("quiet_hours_blocked"));
        assert_eq!(entry.metadata["attempts"], 2);
        assert_eq!(entry.id.len(), 36);
    }
}
