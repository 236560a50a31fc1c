//! Immutable map of registered producer modules.
//!
//! # Responsibility
//! - Validate descriptors and their reserved ID ranges at construction.
//! - Answer "which module owns this notification ID".
//!
//! # Invariants
//! - Module ids are unique.
//! - Reserved ranges of registered modules never overlap.
//! - The registry is never mutated after construction.

use crate::model::module::{builtin_modules, ModuleDescriptor, ModuleValidationError};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Module registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRegistryError {
    Invalid(ModuleValidationError),
    DuplicateModuleId(String),
    OverlappingRange { module_id: String, other: String },
}

impl Display for ModuleRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{err}"),
            Self::DuplicateModuleId(id) => write!(f, "module id already registered: {id}"),
            Self::OverlappingRange { module_id, other } => write!(
                f,
                "id range of module `{module_id}` overlaps module `{other}`"
            ),
        }
    }
}

impl Error for ModuleRegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModuleValidationError> for ModuleRegistryError {
    fn from(value: ModuleValidationError) -> Self {
        Self::Invalid(value)
    }
}

/// Registered modules keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Validates and registers every descriptor.
    pub fn new(
        modules: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> Result<Self, ModuleRegistryError> {
        let mut registered: BTreeMap<String, ModuleDescriptor> = BTreeMap::new();
        for module in modules {
            module.validate()?;
            if registered.contains_key(module.id.as_str()) {
                return Err(ModuleRegistryError::DuplicateModuleId(module.id));
            }
            if let Some(other) = registered.values().find(|other| other.overlaps(&module)) {
                return Err(ModuleRegistryError::OverlappingRange {
                    module_id: module.id.clone(),
                    other: other.id.clone(),
                });
            }
            registered.insert(module.id.clone(), module);
        }
        Ok(Self {
            modules: registered,
        })
    }

    /// Registry of the built-in producer modules.
    pub fn with_builtin() -> Result<Self, ModuleRegistryError> {
        Self::new(builtin_modules())
    }

    pub fn get(&self, module_id: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(module_id)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    /// Module whose reserved range contains `notification_id`.
    pub fn owner_of(&self, notification_id: i32) -> Option<&ModuleDescriptor> {
        self.modules
            .values()
            .find(|module| module.owns_id(notification_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// Sorted module ids.
    pub fn module_ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ModuleRegistry, ModuleRegistryError};
    use crate::model::module::ModuleDescriptor;

    #[test]
    fn builtin_registry_resolves_owners() {
        let registry = ModuleRegistry::with_builtin().expect("builtin modules should register");
        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.owner_of(10_000).map(|m| m.id.as_str()),
            Some("finance")
        );
        assert_eq!(registry.owner_of(79_999).map(|m| m.id.as_str()), Some("sleep"));
        assert!(registry.owner_of(80_000).is_none());
        assert!(registry.owner_of(5).is_none());
    }

    #[test]
    fn rejects_duplicates_and_overlaps() {
        let err = ModuleRegistry::new([
            ModuleDescriptor::new("a", "A", 0, 100),
            ModuleDescriptor::new("a", "A again", 500, 100),
        ])
        .expect_err("duplicate id must fail");
        assert_eq!(err, ModuleRegistryError::DuplicateModuleId("a".to_string()));

        let err = ModuleRegistry::new([
            ModuleDescriptor::new("a", "A", 0, 100),
            ModuleDescriptor::new("b", "B", 99, 100),
        ])
        .expect_err("overlap must fail");
        assert!(matches!(err, ModuleRegistryError::OverlappingRange { .. }));

        ModuleRegistry::new([
            ModuleDescriptor::new("a", "A", 0, 100),
            ModuleDescriptor::new("b", "B", 100, 100),
            ModuleDescriptor::new("c", "C", 0, 0),
        ])
        .expect("adjacent and rangeless modules are fine");
    }
}
