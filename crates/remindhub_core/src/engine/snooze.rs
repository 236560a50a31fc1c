//! Snooze duration policy and notification action parsing.

use crate::model::request::NotificationPriority;
use crate::model::settings::EffectiveSettings;
use once_cell::sync::Lazy;
use regex::Regex;

static SNOOZE_ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^snooze(?:[_:](\d{1,4}))?$").expect("valid snooze action regex"));

pub const ACTION_DISMISS: &str = "dismiss";

/// Engine-level meaning of an action id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationActionKind {
    /// `snooze`, `snooze_<m>` or `snooze:<m>`.
    Snooze { minutes: Option<u32> },
    Dismiss,
    /// Forwarded to the module adapter.
    Module(String),
}

impl NotificationActionKind {
    pub fn parse(action_id: &str) -> Self {
        let trimmed = action_id.trim();
        if let Some(captures) = SNOOZE_ACTION_RE.captures(trimmed) {
            let minutes = captures
                .get(1)
                .and_then(|value| value.as_str().parse::<u32>().ok())
                .filter(|minutes| *minutes > 0);
            return Self::Snooze { minutes };
        }
        if trimmed == ACTION_DISMISS {
            return Self::Dismiss;
        }
        Self::Module(trimmed.to_string())
    }
}

/// Minutes to snooze for.
///
/// An explicit positive duration wins. Otherwise smart snooze (when enabled)
/// picks by priority tier, else the effective default.
pub fn snooze_minutes(
    explicit: Option<u32>,
    priority: NotificationPriority,
    settings: &EffectiveSettings,
) -> u32 {
    if let Some(minutes) = explicit.filter(|minutes| *minutes > 0) {
        return minutes;
    }
    let default = settings.default_snooze_minutes.max(1);
    if !settings.smart_snooze_enabled {
        return default;
    }
    match priority {
        NotificationPriority::Max => 5,
        NotificationPriority::High => 10,
        NotificationPriority::Default => default,
        NotificationPriority::Low => 30,
    }
}

#[cfg(test)]
mod tests {
    use super::{snooze_minutes, NotificationActionKind};
    use crate::model::request::NotificationPriority;
    use crate::model::settings::{EffectiveSettings, GlobalSettings, ModuleSettings};

    #[test]
    fn parses_snooze_variants() {
        assert_eq!(
            NotificationActionKind::parse("snooze"),
            NotificationActionKind::Snooze { minutes: None }
        );
        assert_eq!(
            NotificationActionKind::parse("snooze_15"),
            NotificationActionKind::Snooze { minutes: Some(15) }
        );
        assert_eq!(
            NotificationActionKind::parse("snooze:60"),
            NotificationActionKind::Snooze { minutes: Some(60) }
        );
        assert_eq!(NotificationActionKind::parse("dismiss"), NotificationActionKind::Dismiss);
        assert_eq!(
            NotificationActionKind::parse("snoozed"),
            NotificationActionKind::Module("snoozed".to_string())
        );
        assert_eq!(
            NotificationActionKind::parse("mark_paid"),
            NotificationActionKind::Module("mark_paid".to_string())
        );
    }

    #[test]
    fn smart_snooze_uses_priority_tiers() {
        let mut global = GlobalSettings::default();
        global.smart_snooze_enabled = true;
        global.default_snooze_minutes = 12;
        let settings = EffectiveSettings::merge("task", &global, &ModuleSettings::default());

        assert_eq!(snooze_minutes(None, NotificationPriority::Max, &settings), 5);
        assert_eq!(snooze_minutes(None, NotificationPriority::High, &settings), 10);
        assert_eq!(snooze_minutes(None, NotificationPriority::Default, &settings), 12);
        assert_eq!(snooze_minutes(None, NotificationPriority::Low, &settings), 30);
        assert_eq!(snooze_minutes(Some(3), NotificationPriority::Low, &settings), 3);
    }

    #[test]
    fn plain_snooze_uses_effective_default() {
        let settings = EffectiveSettings::merge(
            "task",
            &GlobalSettings::default(),
            &ModuleSettings::default(),
        );
        assert_eq!(snooze_minutes(None, NotificationPriority::Max, &settings), 10);
        assert_eq!(snooze_minutes(Some(0), NotificationPriority::Max, &settings), 10);
    }
}
