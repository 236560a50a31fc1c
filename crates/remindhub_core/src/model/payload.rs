//! Notification payload wire codec.
//!
//! # Responsibility
//! - Serialize reminder identity into the string carried through the OS.
//! - Parse OS callback strings back into a typed payload at the boundary.
//!
//! # Invariants
//! - `parse(serialize(p)) == p` for every payload, including empty extras.
//! - Missing or short segments default instead of failing; only a missing
//!   module or entity makes a payload unparseable.
//! - Reserved characters are percent-escaped so legacy plain payloads keep
//!   their exact wire shape.
//!
//! Wire format:
//! `moduleId|entityId|reminderType|reminderValue|reminderUnit|key:value|...`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SEGMENT_SEPARATOR: char = '|';
const EXTRA_SEPARATOR: char = ':';

/// Extras key carrying the snooze counter.
pub const EXTRA_SNOOZE_COUNT: &str = "snoozeCount";
/// Extras key carrying the notification type id.
pub const EXTRA_TYPE: &str = "type";
/// Extras key carrying the resolved priority tier.
pub const EXTRA_PRIORITY: &str = "priority";

/// Typed identity recovered from a notification callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub module_id: String,
    pub entity_id: String,
    pub reminder_type: String,
    pub reminder_value: i64,
    pub reminder_unit: String,
    pub extras: BTreeMap<String, String>,
}

impl NotificationPayload {
    pub fn new(module_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }

    /// Sets the reminder offset triple (`type`, `value`, `unit`).
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

    /// Serializes into the pipe-delimited wire format.
    pub fn serialize(&self) -> String {
        let mut segments = vec![
            escape_segment(&self.module_id),
            escape_segment(&self.entity_id),
            escape_segment(&self.reminder_type),
            self.reminder_value.to_string(),
            escape_segment(&self.reminder_unit),
        ];
        for (key, value) in &self.extras {
            segments.push(format!(
                "{}{EXTRA_SEPARATOR}{}",
                escape_key(key),
                escape_segment(value)
            ));
        }
        segments.join(&SEGMENT_SEPARATOR.to_string())
    }

    /// Parses a wire string, defaulting absent segments.
    ///
    /// Extras segments without a `:` are ignored. An unparseable reminder
    /// value defaults to `0`.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        if raw.trim().is_empty() {
            return Err(PayloadError::Empty);
        }

        let mut segments = raw.split(SEGMENT_SEPARATOR);
        let module_id = unescape(segments.next().unwrap_or_default());
        let entity_id = unescape(segments.next().unwrap_or_default());
        if module_id.trim().is_empty() {
            return Err(PayloadError::MissingModule(raw.to_string()));
        }
        if entity_id.trim().is_empty() {
            return Err(PayloadError::MissingEntity(raw.to_string()));
        }

        let reminder_type = unescape(segments.next().unwrap_or_default());
        let reminder_value = segments
            .next()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let reminder_unit = unescape(segments.next().unwrap_or_default());

        let mut extras = BTreeMap::new();
        for segment in segments {
            if let Some((key, value)) = segment.split_once(EXTRA_SEPARATOR) {
                extras.insert(unescape(key), unescape(value));
            }
        }

        Ok(Self {
            module_id,
            entity_id,
            reminder_type,
            reminder_value,
            reminder_unit,
            extras,
        })
    }

    /// Snooze counter embedded in the extras (`0` when absent or garbled).
    pub fn snooze_count(&self) -> u32 {
        self.extras
            .get(EXTRA_SNOOZE_COUNT)
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0)
    }

    /// Returns a copy with the snooze counter set to `count`.
    pub fn with_snooze_count(&self, count: u32) -> Self {
        let mut next = self.clone();
        next.extras
            .insert(EXTRA_SNOOZE_COUNT.to_string(), count.to_string());
        next
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }
}

fn escape_segment(value: &str) -> String {
    value.replace('%', "%25").replace('|', "%7C")
}

fn escape_key(value: &str) -> String {
    escape_segment(value).replace(':', "%3A")
}

fn unescape(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    value
        .replace("%7C", "|")
        .replace("%7c", "|")
        .replace("%3A", ":")
        .replace("%3a", ":")
        .replace("%25", "%")
}

/// Payload parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    Empty,
    MissingModule(String),
    MissingEntity(String),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "payload is empty"),
            Self::MissingModule(raw) => write!(f, "payload `{raw}` has no module segment"),
            Self::MissingEntity(raw) => write!(f, "payload `{raw}` has no entity segment"),
        }
    }
}

impl Error for PayloadError {}

#[cfg(test)]
mod tests {
    use super::{NotificationPayload, PayloadError, EXTRA_SNOOZE_COUNT};

    #[test]
    fn serializes_legacy_wire_shape() {
        let payload = NotificationPayload::new("finance", "bill:123")
            .with_reminder("before", 2, "days")
            .with_extra("snoozeCount", "1");
        assert_eq!(payload.serialize(), "finance|bill:123|before|2|days|snoozeCount:1");
    }

    #[test]
    fn roundtrip_with_empty_extras_and_reserved_characters() {
        let plain = NotificationPayload::new("task", "t-1");
        assert_eq!(NotificationPayload::parse(&plain.serialize()).unwrap(), plain);

        let tricky = NotificationPayload::new("habit", "a|b%c")
            .with_reminder("at|time", -5, "min%")
            .with_extra("k:ey", "v:a|l%ue")
            .with_extra("", "empty key survives");
        let parsed = NotificationPayload::parse(&tricky.serialize()).unwrap();
        assert_eq!(parsed, tricky);
        assert_eq!(parsed.entity_id, "a|b%c");
        assert_eq!(parsed.extra("k:ey"), Some("v:a|l%ue"));
        assert_eq!(parsed.reminder_value, -5);
    }

    #[test]
    fn parse_defaults_short_segments() {
        let parsed = NotificationPayload::parse("finance|bill:9").unwrap();
        assert_eq!(parsed.module_id, "finance");
        assert_eq!(parsed.entity_id, "bill:9");
        assert_eq!(parsed.reminder_type, "");
        assert_eq!(parsed.reminder_value, 0);
        assert!(parsed.extras.is_empty());

        let garbled = NotificationPayload::parse("task|t|at|soon|min|junk|x:1").unwrap();
        assert_eq!(garbled.reminder_value, 0);
        assert_eq!(garbled.extras.len(), 1);
    }

    #[test]
    fn parse_rejects_missing_identity() {
        assert_eq!(NotificationPayload::parse("  "), Err(PayloadError::Empty));
        assert!(matches!(
            NotificationPayload::parse("|entity"),
            Err(PayloadError::MissingModule(_))
        ));
        assert!(matches!(
            NotificationPayload::parse("finance"),
            Err(PayloadError::MissingEntity(_))
        ));
    }

    #[test]
    fn snooze_count_reads_and_increments() {
        let payload = NotificationPayload::new("task", "t-1");
        assert_eq!(payload.snooze_count(), 0);
        let snoozed = payload.with_snooze_count(2);
        assert_eq!(snoozed.extra(EXTRA_SNOOZE_COUNT), Some("2"));
        assert_eq!(
            NotificationPayload::parse(&snoozed.serialize())
                .unwrap()
                .snooze_count(),
            2
        );
    }
}
