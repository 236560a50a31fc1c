//! Global and per-module notification settings.
//!
//! # Responsibility
//! - Define persisted global settings and the sparse per-module overlay.
//! - Merge both into the single `EffectiveSettings` used by one engine call.
//!
//! # Invariants
//! - Every overlay field set to `None` inherits the global value.
//! - `max_snooze_count == UNLIMITED_SNOOZES` disables the snooze cap.

use crate::model::delivery::{
    DeliveryOverride, DEFAULT_CHANNEL_KEY, DEFAULT_SOUND_KEY, DEFAULT_VIBRATION_PATTERN_ID,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel for "no snooze cap".
pub const UNLIMITED_SNOOZES: u32 = 0;
pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;
pub const DEFAULT_MAX_SNOOZE_COUNT: u32 = 3;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Daily quiet-hours window in local wall-clock minutes.
///
/// `start_minute > end_minute` wraps past midnight (e.g. 22:00-07:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    /// Minutes after local midnight, `0..1440`.
    pub start_minute: u32,
    /// Minutes after local midnight, `0..1440`.
    pub end_minute: u32,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_minute: 22 * 60,
            end_minute: 7 * 60,
        }
    }
}

impl QuietHours {
    pub fn new(start_minute: u32, end_minute: u32) -> Self {
        Self {
            enabled: true,
            start_minute: start_minute % MINUTES_PER_DAY,
            end_minute: end_minute % MINUTES_PER_DAY,
        }
    }

    /// Builds a window from `HH:MM` pairs.
    pub fn from_hm(start: (u32, u32), end: (u32, u32)) -> Self {
        Self::new(start.0 * 60 + start.1, end.0 * 60 + end.1)
    }

    /// Returns whether the window is active and non-empty.
    pub fn is_active(&self) -> bool {
        self.enabled && self.start_minute != self.end_minute
    }

    /// Returns whether `minute_of_day` lies inside the window.
    pub fn contains_minute(&self, minute_of_day: u32) -> bool {
        if !self.is_active() {
            return false;
        }
        let minute = minute_of_day % MINUTES_PER_DAY;
        if self.start_minute < self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Persisted global notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub notifications_enabled: bool,
    pub quiet_hours: QuietHours,
    pub allow_urgent_during_quiet_hours: bool,
    pub default_channel_key: String,
    pub default_sound_key: String,
    pub default_vibration_pattern_id: String,
    /// `0` defers to the hub-level fallback.
    pub default_snooze_minutes: u32,
    pub max_snooze_count: u32,
    pub smart_snooze_enabled: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            quiet_hours: QuietHours::default(),
            allow_urgent_during_quiet_hours: false,
            default_channel_key: DEFAULT_CHANNEL_KEY.to_string(),
            default_sound_key: DEFAULT_SOUND_KEY.to_string(),
            default_vibration_pattern_id: DEFAULT_VIBRATION_PATTERN_ID.to_string(),
            default_snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            max_snooze_count: DEFAULT_MAX_SNOOZE_COUNT,
            smart_snooze_enabled: false,
        }
    }
}

/// Sparse per-module overlay on top of [`GlobalSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub notifications_enabled: bool,
    pub quiet_hours: Option<QuietHours>,
    pub allow_urgent_during_quiet_hours: Option<bool>,
    pub default_channel_key: Option<String>,
    pub default_sound_key: Option<String>,
    pub default_snooze_minutes: Option<u32>,
    pub max_snooze_count: Option<u32>,
    /// Per-type delivery overrides keyed by type id.
    pub type_overrides: BTreeMap<String, DeliveryOverride>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            quiet_hours: None,
            allow_urgent_during_quiet_hours: None,
            default_channel_key: None,
            default_sound_key: None,
            default_snooze_minutes: None,
            max_snooze_count: None,
            type_overrides: BTreeMap::new(),
        }
    }
}

/// Settings in force for one engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub module_id: String,
    pub notifications_enabled_globally: bool,
    pub notifications_enabled_for_module: bool,
    pub quiet_hours: QuietHours,
    pub allow_urgent_during_quiet_hours: bool,
    pub default_channel_key: String,
    pub default_sound_key: String,
    pub default_vibration_pattern_id: String,
    pub default_snooze_minutes: u32,
    pub max_snooze_count: u32,
    pub smart_snooze_enabled: bool,
    pub type_overrides: BTreeMap<String, DeliveryOverride>,
}

impl EffectiveSettings {
    /// Merges the module overlay onto global settings.
    pub fn merge(module_id: &str, global: &GlobalSettings, module: &ModuleSettings) -> Self {
        Self {
            module_id: module_id.to_string(),
            notifications_enabled_globally: global.notifications_enabled,
            notifications_enabled_for_module: module.notifications_enabled,
            quiet_hours: module.quiet_hours.unwrap_or(global.quiet_hours),
            allow_urgent_during_quiet_hours: module
                .allow_urgent_during_quiet_hours
                .unwrap_or(global.allow_urgent_during_quiet_hours),
            default_channel_key: module
                .default_channel_key
                .clone()
                .unwrap_or_else(|| global.default_channel_key.clone()),
            default_sound_key: module
                .default_sound_key
                .clone()
                .unwrap_or_else(|| global.default_sound_key.clone()),
            default_vibration_pattern_id: global.default_vibration_pattern_id.clone(),
            default_snooze_minutes: module
                .default_snooze_minutes
                .unwrap_or(global.default_snooze_minutes),
            max_snooze_count: module.max_snooze_count.unwrap_or(global.max_snooze_count),
            smart_snooze_enabled: global.smart_snooze_enabled,
            type_overrides: module.type_overrides.clone(),
        }
    }

    /// Returns whether another snooze is allowed after `snooze_count` snoozes.
    pub fn allows_snooze(&self, snooze_count: u32) -> bool {
        self.max_snooze_count == UNLIMITED_SNOOZES || snooze_count < self.max_snooze_count
    }
}
