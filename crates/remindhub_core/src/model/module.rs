//! Reminder producer module descriptors.
//!
//! # Responsibility
//! - Describe one logical reminder producer and its reserved ID range.
//! - Validate descriptor-level invariants before registration.
//!
//! # Invariants
//! - `id` is a lowercase identifier (`[a-z][a-z0-9_]*`).
//! - `id_range_start >= 0` and `id_range_start + id_range_size` fits in `i32`.
//! - `id_range_size == 0` means "no reserved range": IDs fall back to the full
//!   31-bit hash space.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODULE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid module id regex"));

/// Module ID of the finance producer (bills, debts).
pub const MODULE_FINANCE: &str = "finance";
/// Module ID of the task producer.
pub const MODULE_TASK: &str = "task";
/// Module ID of the habit producer.
pub const MODULE_HABIT: &str = "habit";
/// Module ID of the sleep routine producer.
pub const MODULE_SLEEP: &str = "sleep";
/// Module ID used by the generic reminder creator.
pub const MODULE_UNIVERSAL: &str = "universal";

/// One registered reminder producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Stable module identifier carried in every payload.
    pub id: String,
    /// User-facing module name.
    pub display_name: String,
    /// First notification ID reserved for this module.
    pub id_range_start: i32,
    /// Number of reserved IDs.
    pub id_range_size: i32,
    /// Hub-level enable state used when nothing is persisted yet.
    pub default_enabled: bool,
}

impl ModuleDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        id_range_start: i32,
        id_range_size: i32,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            id_range_start,
            id_range_size,
            default_enabled: true,
        }
    }

    /// Overrides the default enable flag.
    pub fn with_default_enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }

    /// Exclusive end of the reserved range.
    pub fn id_range_end(&self) -> i64 {
        i64::from(self.id_range_start) + i64::from(self.id_range_size)
    }

    /// Returns whether the module owns a reserved range.
    pub fn has_range(&self) -> bool {
        self.id_range_size > 0
    }

    /// Returns whether `notification_id` falls inside the reserved range.
    pub fn owns_id(&self, notification_id: i32) -> bool {
        self.has_range()
            && notification_id >= self.id_range_start
            && i64::from(notification_id) < self.id_range_end()
    }

    /// Returns whether two reserved ranges overlap.
    pub fn overlaps(&self, other: &ModuleDescriptor) -> bool {
        if !self.has_range() || !other.has_range() {
            return false;
        }
        i64::from(self.id_range_start) < other.id_range_end()
            && i64::from(other.id_range_start) < self.id_range_end()
    }

    /// Validates descriptor invariants.
    pub fn validate(&self) -> Result<(), ModuleValidationError> {
        if !MODULE_ID_RE.is_match(self.id.as_str()) {
            return Err(ModuleValidationError::InvalidId(self.id.clone()));
        }
        if self.display_name.trim().is_empty() {
            return Err(ModuleValidationError::EmptyDisplayName(self.id.clone()));
        }
        if self.id_range_start < 0 || self.id_range_size < 0 {
            return Err(ModuleValidationError::NegativeRange {
                module_id: self.id.clone(),
            });
        }
        if self.id_range_end() > i64::from(i32::MAX) {
            return Err(ModuleValidationError::RangeOverflow {
                module_id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Built-in producer modules with disjoint reserved ranges.
pub fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new(MODULE_FINANCE, "Finance", 10_000, 20_000),
        ModuleDescriptor::new(MODULE_TASK, "Tasks", 30_000, 20_000),
        ModuleDescriptor::new(MODULE_HABIT, "Habits", 50_000, 20_000),
        ModuleDescriptor::new(MODULE_SLEEP, "Sleep", 70_000, 10_000),
        ModuleDescriptor::new(MODULE_UNIVERSAL, "Reminders", 200_000, 100_000),
    ]
}

/// Descriptor-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleValidationError {
    InvalidId(String),
    EmptyDisplayName(String),
    NegativeRange { module_id: String },
    RangeOverflow { module_id: String },
}

impl Display for ModuleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(value) => write!(
                f,
                "module id `{value}` is invalid; expected lowercase [a-z][a-z0-9_]*"
            ),
            Self::EmptyDisplayName(id) => write!(f, "module `{id}` has an empty display name"),
            Self::NegativeRange { module_id } => {
                write!(f, "module `{module_id}` declares a negative id range")
            }
            Self::RangeOverflow { module_id } => {
                write!(f, "module `{module_id}` id range exceeds the 31-bit id space")
            }
        }
    }
}

impl Error for ModuleValidationError {}
