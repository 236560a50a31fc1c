//! Deterministic notification ID derivation and backup-ID symmetry.
//!
//! # Invariants
//! - Identical fingerprints always produce identical IDs.
//! - Derived IDs fall inside the module's reserved range, or anywhere in the
//!   non-negative 31-bit space when the module has no range.
//! - The counterparts of `N` are `N + BACKUP_ID_OFFSET` (when it fits) and
//!   `N - BACKUP_ID_OFFSET` (when `N >= BACKUP_ID_OFFSET`).

use crate::model::module::ModuleDescriptor;
use crate::model::payload::NotificationPayload;
use crate::model::request::ScheduleRequest;
use crate::platform::ReminderDefinition;
use chrono::{DateTime, FixedOffset, NaiveDate};
use sha2::{Digest, Sha256};

/// Offset between a notification ID and its backup counterpart.
pub const BACKUP_ID_OFFSET: i32 = 100_000;

const HASH_MASK: u32 = 0x7fff_ffff;

/// Inputs hashed into a notification ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub module_id: String,
    pub entity_id: String,
    pub reminder_type: String,
    pub reminder_value: i64,
    pub reminder_unit: String,
    /// Local calendar day for per-day unique reminders.
    pub day: Option<NaiveDate>,
}

impl Fingerprint {
    pub fn from_request(request: &ScheduleRequest, offset: FixedOffset) -> Self {
        let day = if request.unique_per_day {
            local_day(request.scheduled_at_ms, offset)
        } else {
            None
        };
        Self {
            module_id: request.module_id.clone(),
            entity_id: request.entity_id.clone(),
            reminder_type: request.reminder_type.clone(),
            reminder_value: request.reminder_value,
            reminder_unit: request.reminder_unit.clone(),
            day,
        }
    }

    pub fn from_payload(payload: &NotificationPayload) -> Self {
        Self {
            module_id: payload.module_id.clone(),
            entity_id: payload.entity_id.clone(),
            reminder_type: payload.reminder_type.clone(),
            reminder_value: payload.reminder_value,
            reminder_unit: payload.reminder_unit.clone(),
            day: None,
        }
    }

    pub fn from_definition(definition: &ReminderDefinition) -> Self {
        Self {
            module_id: definition.module_id.clone(),
            entity_id: definition.entity_id.clone(),
            reminder_type: definition.reminder_type.clone(),
            reminder_value: definition.reminder_value,
            reminder_unit: definition.reminder_unit.clone(),
            day: None,
        }
    }

    /// Canonical pipe-joined form that gets hashed.
    pub fn canonical(&self) -> String {
        let mut joined = format!(
            "{}|{}|{}|{}|{}",
            self.module_id,
            self.entity_id,
            self.reminder_type,
            self.reminder_value,
            self.reminder_unit
        );
        if let Some(day) = self.day {
            joined.push('|');
            joined.push_str(&day.format("%Y-%m-%d").to_string());
        }
        joined
    }
}

/// First four SHA-256 bytes of `input`, masked to 31 bits.
pub fn hash31(input: &str) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & HASH_MASK
}

/// Folds a 31-bit hash into the module's reserved range.
pub fn fold_into_range(hash: u32, module: &ModuleDescriptor) -> i32 {
    if !module.has_range() {
        return (hash & HASH_MASK) as i32;
    }
    let size = module.id_range_size as u32;
    module.id_range_start + (hash % size) as i32
}

pub fn derive_notification_id(module: &ModuleDescriptor, fingerprint: &Fingerprint) -> i32 {
    fold_into_range(hash31(&fingerprint.canonical()), module)
}

/// Backup counterparts of `id`.
pub fn counterparts(id: i32) -> Vec<i32> {
    let mut ids = Vec::with_capacity(2);
    if let Some(up) = id.checked_add(BACKUP_ID_OFFSET) {
        ids.push(up);
    }
    if id >= BACKUP_ID_OFFSET {
        ids.push(id - BACKUP_ID_OFFSET);
    }
    ids
}

/// `id` followed by its counterparts.
pub fn with_counterparts(id: i32) -> Vec<i32> {
    let mut ids = vec![id];
    ids.extend(counterparts(id));
    ids
}

/// Local calendar day of an epoch-millisecond instant.
pub fn local_day(at_ms: i64, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(at_ms).map(|utc| utc.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::{
        counterparts, derive_notification_id, fold_into_range, hash31, with_counterparts,
        Fingerprint, BACKUP_ID_OFFSET,
    };
    use crate::model::module::{builtin_modules, ModuleDescriptor};
    use chrono::NaiveDate;

    fn fingerprint(entity: &str, day: Option<NaiveDate>) -> Fingerprint {
        Fingerprint {
            module_id: "finance".to_string(),
            entity_id: entity.to_string(),
            reminder_type: "before".to_string(),
            reminder_value: 2,
            reminder_unit: "days".to_string(),
            day,
        }
    }

    #[test]
    fn derived_ids_are_deterministic_and_in_range() {
        for module in builtin_modules() {
            for index in 0..200 {
                let mut fp = fingerprint(&format!("entity:{index}"), None);
                fp.module_id = module.id.clone();
                let first = derive_notification_id(&module, &fp);
                let second = derive_notification_id(&module, &fp);
                assert_eq!(first, second);
                assert!(module.owns_id(first), "{first} outside {}", module.id);
            }
        }
    }

    #[test]
    fn day_component_changes_the_fingerprint() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date");
        assert_eq!(
            fingerprint("bill:1", Some(day)).canonical(),
            "finance|bill:1|before|2|days|2024-05-01"
        );
        assert_ne!(
            hash31(&fingerprint("bill:1", Some(day)).canonical()),
            hash31(&fingerprint("bill:1", None).canonical())
        );
    }

    #[test]
    fn rangeless_module_uses_full_31_bit_space() {
        let module = ModuleDescriptor::new("misc", "Misc", 0, 0);
        let id = fold_into_range(u32::MAX, &module);
        assert_eq!(id, i32::MAX);
        assert!(derive_notification_id(&module, &fingerprint("x", None)) >= 0);
    }

    #[test]
    fn counterparts_are_symmetric() {
        assert_eq!(counterparts(42), vec![42 + BACKUP_ID_OFFSET]);
        assert_eq!(
            counterparts(150_000),
            vec![250_000, 50_000]
        );
        assert_eq!(counterparts(i32::MAX), vec![i32::MAX - BACKUP_ID_OFFSET]);
        for id in [0, 99_999, 100_000, 123_456] {
            for other in counterparts(id) {
                assert!(counterparts(other).contains(&id));
            }
        }
        assert_eq!(with_counterparts(7)[0], 7);
    }
}
