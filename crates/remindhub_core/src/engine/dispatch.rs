//! Dual-path dispatch to the native alarm player or the OS plugin.
//!
//! # Responsibility
//! - Decide which OS primitive carries a notification.
//! - Fall back from the native path to the OS plugin exactly once.
//! - Cancel IDs on both paths.
//!
//! # Invariants
//! - The fallback reuses the resolved delivery config unchanged.
//! - Platform error text is flattened and truncated before it is logged or
//!   returned.

use crate::error::NotificationError;
use crate::logging::sanitize_message;
use crate::model::delivery::{AudioStream, DeliveryConfig};
use crate::model::request::{NotificationAction, NotificationPriority};
use crate::model::tracked::{DispatchPath, TrackedEntry};
use crate::platform::{
    NativeAlarmRequest, NativeAlarmService, NotificationScheduler, PluginNotificationRequest,
};
use log::{info, warn};
use std::sync::Arc;

const MAX_PLATFORM_ERROR_CHARS: usize = 200;

/// Returns whether `config` needs the native one-shot path.
pub fn requires_native(config: &DeliveryConfig, special: bool) -> bool {
    config.audio_stream != AudioStream::Notification
        || config.has_custom_sound_uri()
        || special
        || config.use_alarm_mode
}

/// Everything needed to put one notification on either path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOrder {
    pub id: i32,
    pub module_id: String,
    pub entity_id: String,
    pub type_id: String,
    pub title: String,
    pub body: String,
    pub fire_at_ms: i64,
    pub config: DeliveryConfig,
    pub priority: NotificationPriority,
    pub icon: Option<String>,
    pub action_buttons: Vec<NotificationAction>,
    pub special: bool,
    pub payload: String,
}

impl DispatchOrder {
    pub fn preferred_path(&self) -> DispatchPath {
        if requires_native(&self.config, self.special) {
            DispatchPath::Native
        } else {
            DispatchPath::OsPlugin
        }
    }

    /// Rebuilds an order from a journal entry, keeping its config verbatim.
    pub fn from_entry(entry: &TrackedEntry) -> Self {
        Self {
            id: entry.id,
            module_id: entry.module_id.clone(),
            entity_id: entry.entity_id.clone(),
            type_id: entry.type_id.clone(),
            title: entry.title.clone(),
            body: entry.body.clone(),
            fire_at_ms: entry.scheduled_time_ms,
            config: entry.delivery_config(),
            priority: entry.priority,
            icon: None,
            action_buttons: Vec::new(),
            special: entry.is_special,
            payload: entry.payload.clone(),
        }
    }

    pub fn plugin_request(&self) -> PluginNotificationRequest {
        PluginNotificationRequest {
            id: self.id,
            title: self.title.clone(),
            body: self.body.clone(),
            fire_at_ms: self.fire_at_ms,
            channel_key: self.config.channel_key.clone(),
            sound_key: self.config.sound_key.clone(),
            vibration_pattern_id: self.config.vibration_pattern_id.clone(),
            priority: self.priority,
            icon: self.icon.clone(),
            action_buttons: self.action_buttons.clone(),
            full_screen_intent: self.config.use_full_screen_intent,
            payload: self.payload.clone(),
        }
    }

    pub fn native_request(&self) -> NativeAlarmRequest {
        NativeAlarmRequest {
            id: self.id,
            title: self.title.clone(),
            body: self.body.clone(),
            fire_at_ms: self.fire_at_ms,
            sound_uri: self.config.sound_key.clone(),
            vibration_pattern_id: self.config.vibration_pattern_id.clone(),
            audio_stream: self.config.audio_stream,
            use_alarm_mode: self.config.use_alarm_mode,
            full_screen: self.config.use_full_screen_intent,
            payload: self.payload.clone(),
        }
    }

    /// Journal entry for this order on `path`.
    pub fn tracked_entry(&self, path: DispatchPath, created_at_ms: i64) -> TrackedEntry {
        TrackedEntry {
            id: self.id,
            path,
            type_id: self.type_id.clone(),
            module_id: self.module_id.clone(),
            entity_id: self.entity_id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            scheduled_time_ms: self.fire_at_ms,
            channel_key: self.config.channel_key.clone(),
            sound_key: self.config.sound_key.clone(),
            vibration_pattern_id: self.config.vibration_pattern_id.clone(),
            priority: self.priority,
            is_special: self.special,
            use_alarm_mode: self.config.use_alarm_mode,
            show_fullscreen: self.config.use_full_screen_intent,
            bypass_quiet_hours: self.config.bypass_quiet_hours,
            payload: self.payload.clone(),
            audio_stream: self.config.audio_stream,
            one_shot: true,
            created_at_ms,
            delivered_at_ms: None,
        }
    }
}

/// Drives both OS primitives.
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Arc<dyn NotificationScheduler>,
    native: Arc<dyn NativeAlarmService>,
}

impl Dispatcher {
    pub fn new(
        scheduler: Arc<dyn NotificationScheduler>,
        native: Arc<dyn NativeAlarmService>,
    ) -> Self {
        Self { scheduler, native }
    }

    pub fn scheduler(&self) -> &Arc<dyn NotificationScheduler> {
        &self.scheduler
    }

    /// Dispatches on `path`; a native failure retries once on the OS plugin.
    ///
    /// Returns the path that actually carried the notification.
    pub async fn dispatch(
        &self,
        order: &DispatchOrder,
        path: DispatchPath,
    ) -> Result<DispatchPath, NotificationError> {
        let native_error = match path {
            DispatchPath::Native => match self.native.schedule_one_shot(&order.native_request()).await
            {
                Ok(()) => {
                    info!(
                        "event=dispatch module=engine status=ok path=native notification_id={} stream={}",
                        order.id,
                        order.config.audio_stream.as_str()
                    );
                    return Ok(DispatchPath::Native);
                }
                Err(err) => {
                    let message = sanitize_message(&err.to_string(), MAX_PLATFORM_ERROR_CHARS);
                    warn!(
                        "event=dispatch module=engine status=error path=native notification_id={} fallback=os_plugin error={}",
                        order.id, message
                    );
                    Some(message)
                }
            },
            DispatchPath::OsPlugin => None,
        };

        match self.scheduler.schedule_at(&order.plugin_request()).await {
            Ok(()) => {
                info!(
                    "event=dispatch module=engine status=ok path=os_plugin notification_id={} fallback={}",
                    order.id,
                    native_error.is_some()
                );
                Ok(DispatchPath::OsPlugin)
            }
            Err(err) => {
                let plugin = sanitize_message(&err.to_string(), MAX_PLATFORM_ERROR_CHARS);
                warn!(
                    "event=dispatch module=engine status=error path=os_plugin notification_id={} error={}",
                    order.id, plugin
                );
                Err(NotificationError::DeliveryFailed {
                    native: native_error,
                    plugin,
                })
            }
        }
    }

    /// Cancels every id on both paths; failures are logged and skipped.
    ///
    /// Returns the number of platform cancel calls that failed.
    pub async fn cancel_everywhere(&self, ids: &[i32]) -> usize {
        let mut failures = 0;
        for &id in ids {
            if let Err(err) = self.scheduler.cancel(id).await {
                failures += 1;
                warn!(
                    "event=cancel module=engine status=error path=os_plugin notification_id={} error={}",
                    id,
                    sanitize_message(&err.to_string(), MAX_PLATFORM_ERROR_CHARS)
                );
            }
            if let Err(err) = self.native.cancel(id).await {
                failures += 1;
                warn!(
                    "event=cancel module=engine status=error path=native notification_id={} error={}",
                    id,
                    sanitize_message(&err.to_string(), MAX_PLATFORM_ERROR_CHARS)
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::requires_native;
    use crate::model::delivery::{AudioStream, DeliveryConfig};

    #[test]
    fn native_path_triggers() {
        let plain = DeliveryConfig::default();
        assert!(!requires_native(&plain, false));
        assert!(requires_native(&plain, true));

        let alarm_stream = DeliveryConfig {
            audio_stream: AudioStream::Ring,
            ..DeliveryConfig::default()
        };
        assert!(requires_native(&alarm_stream, false));

        let custom_sound = DeliveryConfig {
            sound_key: "content://media/external/audio/12".to_string(),
            ..DeliveryConfig::default()
        };
        assert!(requires_native(&custom_sound, false));

        let alarm_mode = DeliveryConfig {
            use_alarm_mode: true,
            ..DeliveryConfig::default()
        };
        assert!(requires_native(&alarm_mode, false));
    }
}
