//! Contracts for the OS primitives and collaborators the engine drives.
//!
//! # Responsibility
//! - Define the async seams for the exact-alarm notification plugin, the
//!   native one-shot alarm player, key-value persistence and the reminder
//!   definition repository.
//! - Define the wall-clock abstraction used for every time decision.
//!
//! # Invariants
//! - Implementations must be `Send + Sync`; the hub shares them behind `Arc`.
//! - The OS plugin cannot report fire time or resolved channel for pending
//!   entries; `PendingNotification` carries only what it can report.

mod clock;

pub use clock::{Clock, SystemClock};

use crate::model::delivery::AudioStream;
use crate::model::request::{NotificationAction, NotificationPriority};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failure reported by a platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    /// Operation name, e.g. `schedule_at`.
    pub operation: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl Display for PlatformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

impl Error for PlatformError {}

/// Exact-time notification handed to the OS plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginNotificationRequest {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub fire_at_ms: i64,
    pub channel_key: String,
    pub sound_key: String,
    pub vibration_pattern_id: String,
    pub priority: NotificationPriority,
    pub icon: Option<String>,
    pub action_buttons: Vec<NotificationAction>,
    pub full_screen_intent: bool,
    pub payload: String,
}

/// One-shot alarm handed to the native player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAlarmRequest {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub fire_at_ms: i64,
    /// Sound key or `content://` URI.
    pub sound_uri: String,
    pub vibration_pattern_id: String,
    pub audio_stream: AudioStream,
    pub use_alarm_mode: bool,
    pub full_screen: bool,
    pub payload: String,
}

/// Entry reported by the OS plugin's pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub payload: Option<String>,
}

/// Reminder definition known to the app, with its fingerprint fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDefinition {
    pub module_id: String,
    pub entity_id: String,
    pub reminder_type: String,
    pub reminder_value: i64,
    pub reminder_unit: String,
    pub title: Option<String>,
}

/// OS exact-alarm notification plugin.
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    async fn schedule_at(&self, request: &PluginNotificationRequest) -> PlatformResult<()>;
    async fn cancel(&self, id: i32) -> PlatformResult<()>;
    async fn list_pending(&self) -> PlatformResult<Vec<PendingNotification>>;
}

/// Native one-shot alarm and sound player.
#[async_trait]
pub trait NativeAlarmService: Send + Sync {
    async fn schedule_one_shot(&self, request: &NativeAlarmRequest) -> PlatformResult<()>;
    async fn cancel(&self, id: i32) -> PlatformResult<()>;
}

/// String key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PlatformResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PlatformResult<()>;
    async fn remove(&self, key: &str) -> PlatformResult<()>;
}

/// Repository of reminder definitions used to attribute bare IDs.
#[async_trait]
pub trait ReminderDefinitionSource: Send + Sync {
    async fn definitions(&self) -> PlatformResult<Vec<ReminderDefinition>>;
}
