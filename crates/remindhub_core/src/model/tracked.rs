//! Journal entry model for dispatched notifications.
//!
//! # Responsibility
//! - Record what the OS will not report back: fire time, resolved delivery
//!   config, flags and payload.
//!
//! # Invariants
//! - Entries are keyed by `(path, id)`.
//! - `delivery_config()` reproduces the config the entry was dispatched with.
//! - A delivered entry is kept, marked, until its retention window lapses or
//!   a snooze or cancel replaces it.

use crate::model::delivery::{AudioStream, DeliveryConfig};
use crate::model::request::NotificationPriority;
use serde::{Deserialize, Serialize};

/// Which OS primitive carried a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPath {
    /// Native one-shot alarm player.
    Native,
    /// OS exact-alarm notification plugin.
    OsPlugin,
}

impl DispatchPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::OsPlugin => "os_plugin",
        }
    }
}

/// Persisted record of one dispatched notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub id: i32,
    pub path: DispatchPath,
    pub type_id: String,
    pub module_id: String,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    pub scheduled_time_ms: i64,
    pub channel_key: String,
    pub sound_key: String,
    pub vibration_pattern_id: String,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub is_special: bool,
    #[serde(default)]
    pub use_alarm_mode: bool,
    #[serde(default)]
    pub show_fullscreen: bool,
    #[serde(default)]
    pub bypass_quiet_hours: bool,
    /// Serialized wire payload.
    pub payload: String,
    #[serde(default)]
    pub audio_stream: AudioStream,
    /// Marked delivered by the delivery callback.
    #[serde(default = "default_one_shot")]
    pub one_shot: bool,
    pub created_at_ms: i64,
    #[serde(default)]
    pub delivered_at_ms: Option<i64>,
}

fn default_one_shot() -> bool {
    true
}

impl TrackedEntry {
    /// Delivery config this entry was dispatched with.
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            channel_key: self.channel_key.clone(),
            sound_key: self.sound_key.clone(),
            vibration_pattern_id: self.vibration_pattern_id.clone(),
            audio_stream: self.audio_stream,
            use_alarm_mode: self.use_alarm_mode,
            use_full_screen_intent: self.show_fullscreen,
            bypass_quiet_hours: self.bypass_quiet_hours,
        }
    }

    /// Returns whether the fire time has passed.
    pub fn is_past(&self, now_ms: i64) -> bool {
        self.scheduled_time_ms < now_ms
    }

    /// Still waiting to fire: in the future and not delivered.
    pub fn is_pending(&self, now_ms: i64) -> bool {
        self.delivered_at_ms.is_none() && !self.is_past(now_ms)
    }

    /// Returns whether `retention_ms` has elapsed since the later of the fire
    /// time and the delivery time.
    pub fn is_expired(&self, now_ms: i64, retention_ms: i64) -> bool {
        let anchor = self
            .delivered_at_ms
            .map_or(self.scheduled_time_ms, |at| at.max(self.scheduled_time_ms));
        now_ms > anchor.saturating_add(retention_ms)
    }
}
