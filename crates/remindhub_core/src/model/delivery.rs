//! Delivery configuration model and override layering.
//!
//! # Responsibility
//! - Define the resolved per-notification delivery configuration.
//! - Define sparse overrides and the left-to-right fold that resolves them.
//! - Declare the built-in notification types.
//!
//! # Invariants
//! - An override field set to `None` always means "inherit".
//! - Folding is order-sensitive: later layers win field by field.

use serde::{Deserialize, Serialize};

/// Sound keys starting with this prefix are custom content URIs.
pub const CONTENT_URI_PREFIX: &str = "content://";

pub const DEFAULT_CHANNEL_KEY: &str = "reminders";
pub const DEFAULT_SOUND_KEY: &str = "default";
pub const DEFAULT_VIBRATION_PATTERN_ID: &str = "default";

pub const TYPE_DEFAULT: &str = "default";
pub const TYPE_REMINDER: &str = "reminder";
pub const TYPE_URGENT: &str = "urgent";
pub const TYPE_ALARM: &str = "alarm";
pub const TYPE_SILENT: &str = "silent";

/// Platform audio stream used to play the notification sound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStream {
    /// Regular notification volume, the only stream the OS plugin can use.
    #[default]
    Notification,
    Alarm,
    Ring,
    Media,
}

impl AudioStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Alarm => "alarm",
            Self::Ring => "ring",
            Self::Media => "media",
        }
    }
}

/// Fully resolved delivery parameters for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub channel_key: String,
    pub sound_key: String,
    pub vibration_pattern_id: String,
    pub audio_stream: AudioStream,
    pub use_alarm_mode: bool,
    pub use_full_screen_intent: bool,
    pub bypass_quiet_hours: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_key: DEFAULT_CHANNEL_KEY.to_string(),
            sound_key: DEFAULT_SOUND_KEY.to_string(),
            vibration_pattern_id: DEFAULT_VIBRATION_PATTERN_ID.to_string(),
            audio_stream: AudioStream::Notification,
            use_alarm_mode: false,
            use_full_screen_intent: false,
            bypass_quiet_hours: false,
        }
    }
}

impl DeliveryConfig {
    /// Returns whether the sound is a custom content URI.
    pub fn has_custom_sound_uri(&self) -> bool {
        self.sound_key.starts_with(CONTENT_URI_PREFIX)
    }

    /// Applies one override layer; `Some` fields win.
    pub fn apply(&mut self, layer: &DeliveryOverride) {
        if let Some(value) = &layer.channel_key {
            self.channel_key = value.clone();
        }
        if let Some(value) = &layer.sound_key {
            self.sound_key = value.clone();
        }
        if let Some(value) = &layer.vibration_pattern_id {
            self.vibration_pattern_id = value.clone();
        }
        if let Some(value) = layer.audio_stream {
            self.audio_stream = value;
        }
        if let Some(value) = layer.use_alarm_mode {
            self.use_alarm_mode = value;
        }
        if let Some(value) = layer.use_full_screen_intent {
            self.use_full_screen_intent = value;
        }
        if let Some(value) = layer.bypass_quiet_hours {
            self.bypass_quiet_hours = value;
        }
    }

    /// Folds `layers` left to right on top of `self`.
    pub fn folded<'a>(mut self, layers: impl IntoIterator<Item = &'a DeliveryOverride>) -> Self {
        for layer in layers {
            self.apply(layer);
        }
        self
    }
}

/// Sparse delivery override; `None` inherits from the previous layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOverride {
    pub channel_key: Option<String>,
    pub sound_key: Option<String>,
    pub vibration_pattern_id: Option<String>,
    pub audio_stream: Option<AudioStream>,
    pub use_alarm_mode: Option<bool>,
    pub use_full_screen_intent: Option<bool>,
    pub bypass_quiet_hours: Option<bool>,
}

impl DeliveryOverride {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Layer that pins every field of `config`.
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            channel_key: Some(config.channel_key.clone()),
            sound_key: Some(config.sound_key.clone()),
            vibration_pattern_id: Some(config.vibration_pattern_id.clone()),
            audio_stream: Some(config.audio_stream),
            use_alarm_mode: Some(config.use_alarm_mode),
            use_full_screen_intent: Some(config.use_full_screen_intent),
            bypass_quiet_hours: Some(config.bypass_quiet_hours),
        }
    }
}

/// Where a notification type definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSource {
    BuiltIn,
    Adapter,
    Custom,
}

/// Named notification type with its default delivery layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTypeDef {
    pub id: String,
    pub display_name: String,
    /// Owning module for adapter-declared types.
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub defaults: DeliveryOverride,
}

impl NotificationTypeDef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            module_id: None,
            defaults: DeliveryOverride::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: DeliveryOverride) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn for_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }
}

/// Types every installation ships with.
pub fn builtin_types() -> Vec<NotificationTypeDef> {
    vec![
        NotificationTypeDef::new(TYPE_DEFAULT, "Default"),
        // No channel: plain reminders take the module or global default.
        NotificationTypeDef::new(TYPE_REMINDER, "Reminder"),
        NotificationTypeDef::new(TYPE_URGENT, "Urgent").with_defaults(DeliveryOverride {
            channel_key: Some("urgent".to_string()),
            vibration_pattern_id: Some("urgent".to_string()),
            bypass_quiet_hours: Some(true),
            ..DeliveryOverride::default()
        }),
        NotificationTypeDef::new(TYPE_ALARM, "Alarm").with_defaults(DeliveryOverride {
            channel_key: Some("alarms".to_string()),
            sound_key: Some("alarm_classic".to_string()),
            vibration_pattern_id: Some("alarm".to_string()),
            audio_stream: Some(AudioStream::Alarm),
            use_alarm_mode: Some(true),
            use_full_screen_intent: Some(true),
            bypass_quiet_hours: Some(true),
        }),
        NotificationTypeDef::new(TYPE_SILENT, "Silent").with_defaults(DeliveryOverride {
            channel_key: Some("silent".to_string()),
            sound_key: Some("none".to_string()),
            vibration_pattern_id: Some("none".to_string()),
            ..DeliveryOverride::default()
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::{AudioStream, DeliveryConfig, DeliveryOverride};

    #[test]
    fn fold_applies_later_layers_field_by_field() {
        let adapter = DeliveryOverride {
            channel_key: Some("bills".to_string()),
            sound_key: Some("coins".to_string()),
            ..DeliveryOverride::default()
        };
        let custom = DeliveryOverride {
            sound_key: Some("content://media/42".to_string()),
            ..DeliveryOverride::default()
        };
        let request = DeliveryOverride {
            audio_stream: Some(AudioStream::Alarm),
            ..DeliveryOverride::default()
        };

        let config = DeliveryConfig::default().folded([&adapter, &custom, &request]);
        assert_eq!(config.channel_key, "bills");
        assert_eq!(config.sound_key, "content://media/42");
        assert_eq!(config.audio_stream, AudioStream::Alarm);
        assert!(config.has_custom_sound_uri());
        assert!(!config.use_alarm_mode);
    }

    #[test]
    fn empty_override_is_identity() {
        let base = DeliveryConfig::default();
        let folded = base.clone().folded([&DeliveryOverride::default()]);
        assert_eq!(base, folded);
        assert!(DeliveryOverride::default().is_empty());
    }

    #[test]
    fn from_config_pins_every_field() {
        let mut config = DeliveryConfig::default();
        config.use_full_screen_intent = true;
        config.audio_stream = AudioStream::Media;
        let pinned = DeliveryOverride::from_config(&config);
        let other = DeliveryConfig {
            channel_key: "x".to_string(),
            ..DeliveryConfig::default()
        };
        assert_eq!(other.folded([&pinned]), config);
    }
}
