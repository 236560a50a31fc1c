//! Delivery type registry and layered config resolution.
//!
//! # Responsibility
//! - Hold built-in and adapter-declared notification types.
//! - Resolve a type id into a `DeliveryConfig` by folding override layers.
//!
//! # Invariants
//! - Layer order is fixed: built-in, adapter, custom, module settings,
//!   request. Later layers win field by field.
//! - Custom types scoped to a module only apply to that module.

use crate::model::delivery::{
    builtin_types, DeliveryConfig, DeliveryOverride, NotificationTypeDef, TypeSource,
};
use crate::model::settings::EffectiveSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Type definition annotated with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredType {
    pub def: NotificationTypeDef,
    pub source: TypeSource,
}

/// Registry of notification types.
#[derive(Debug)]
pub struct TypeRegistry {
    builtin: BTreeMap<String, NotificationTypeDef>,
    /// Keyed by `(module_id, type_id)`.
    adapter: Mutex<BTreeMap<(String, String), NotificationTypeDef>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            builtin: builtin_types()
                .into_iter()
                .map(|def| (def.id.clone(), def))
                .collect(),
            adapter: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replaces every type declared by `module_id`.
    pub fn set_adapter_types(&self, module_id: &str, types: Vec<NotificationTypeDef>) {
        if let Ok(mut adapter) = self.adapter.lock() {
            adapter.retain(|(owner, _), _| owner != module_id);
            for def in types {
                let def = def.for_module(module_id);
                adapter.insert((module_id.to_string(), def.id.clone()), def);
            }
        }
    }

    pub fn remove_adapter_types(&self, module_id: &str) {
        if let Ok(mut adapter) = self.adapter.lock() {
            adapter.retain(|(owner, _), _| owner != module_id);
        }
    }

    /// Ordered override layers for one type in one module.
    pub fn layers(
        &self,
        module_id: &str,
        type_id: &str,
        custom_types: &BTreeMap<String, NotificationTypeDef>,
        settings: &EffectiveSettings,
        request: &DeliveryOverride,
    ) -> Vec<DeliveryOverride> {
        let mut layers = Vec::with_capacity(5);
        if let Some(def) = self.builtin.get(type_id) {
            layers.push(def.defaults.clone());
        }
        if let Ok(adapter) = self.adapter.lock() {
            if let Some(def) = adapter.get(&(module_id.to_string(), type_id.to_string())) {
                layers.push(def.defaults.clone());
            }
        }
        if let Some(def) = custom_types.get(type_id) {
            let applies = def
                .module_id
                .as_deref()
                .map_or(true, |owner| owner == module_id);
            if applies {
                layers.push(def.defaults.clone());
            }
        }
        if let Some(layer) = settings.type_overrides.get(type_id) {
            layers.push(layer.clone());
        }
        layers.push(request.clone());
        layers
    }

    /// Resolves the delivery config on top of the settings defaults.
    pub fn resolve(
        &self,
        module_id: &str,
        type_id: &str,
        custom_types: &BTreeMap<String, NotificationTypeDef>,
        settings: &EffectiveSettings,
        request: &DeliveryOverride,
    ) -> DeliveryConfig {
        let base = DeliveryConfig {
            channel_key: settings.default_channel_key.clone(),
            sound_key: settings.default_sound_key.clone(),
            vibration_pattern_id: settings.default_vibration_pattern_id.clone(),
            ..DeliveryConfig::default()
        };
        let layers = self.layers(module_id, type_id, custom_types, settings, request);
        base.folded(layers.iter())
    }

    /// Every known type; custom definitions replace same-id entries.
    pub fn list(&self, custom_types: &BTreeMap<String, NotificationTypeDef>) -> Vec<RegisteredType> {
        let mut by_key: BTreeMap<(Option<String>, String), RegisteredType> = BTreeMap::new();
        for def in self.builtin.values() {
            by_key.insert(
                (None, def.id.clone()),
                RegisteredType {
                    def: def.clone(),
                    source: TypeSource::BuiltIn,
                },
            );
        }
        if let Ok(adapter) = self.adapter.lock() {
            for def in adapter.values() {
                by_key.insert(
                    (def.module_id.clone(), def.id.clone()),
                    RegisteredType {
                        def: def.clone(),
                        source: TypeSource::Adapter,
                    },
                );
            }
        }
        for def in custom_types.values() {
            by_key.insert(
                (def.module_id.clone(), def.id.clone()),
                RegisteredType {
                    def: def.clone(),
                    source: TypeSource::Custom,
                },
            );
        }
        by_key.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::TypeRegistry;
    use crate::model::delivery::{
        AudioStream, DeliveryOverride, NotificationTypeDef, TypeSource, TYPE_ALARM,
        TYPE_REMINDER,
    };
    use crate::model::settings::{EffectiveSettings, GlobalSettings, ModuleSettings};
    use std::collections::BTreeMap;

    fn settings(module: &ModuleSettings) -> EffectiveSettings {
        EffectiveSettings::merge("finance", &GlobalSettings::default(), module)
    }

    #[test]
    fn layers_fold_in_fixed_order() {
        let registry = TypeRegistry::new();
        registry.set_adapter_types(
            "finance",
            vec![NotificationTypeDef::new("bill_due", "Bill due").with_defaults(
                DeliveryOverride {
                    channel_key: Some("bills".to_string()),
                    sound_key: Some("coins".to_string()),
                    ..DeliveryOverride::default()
                },
            )],
        );
        let mut custom = BTreeMap::new();
        custom.insert(
            "bill_due".to_string(),
            NotificationTypeDef::new("bill_due", "Bill due").with_defaults(DeliveryOverride {
                sound_key: Some("content://media/7".to_string()),
                ..DeliveryOverride::default()
            }),
        );
        let mut module = ModuleSettings::default();
        module.type_overrides.insert(
            "bill_due".to_string(),
            DeliveryOverride {
                vibration_pattern_id: Some("long".to_string()),
                ..DeliveryOverride::default()
            },
        );
        let request = DeliveryOverride {
            channel_key: Some("request".to_string()),
            ..DeliveryOverride::default()
        };

        let config = registry.resolve("finance", "bill_due", &custom, &settings(&module), &request);
        assert_eq!(config.channel_key, "request");
        assert_eq!(config.sound_key, "content://media/7");
        assert_eq!(config.vibration_pattern_id, "long");

        let other_module =
            registry.resolve("task", "bill_due", &BTreeMap::new(), &settings(&module), &DeliveryOverride::default());
        assert_eq!(other_module.channel_key, "reminders");
    }

    #[test]
    fn unknown_type_resolves_to_settings_defaults() {
        let registry = TypeRegistry::new();
        let module = ModuleSettings {
            default_sound_key: Some("chime".to_string()),
            ..ModuleSettings::default()
        };
        let config = registry.resolve(
            "finance",
            "nope",
            &BTreeMap::new(),
            &settings(&module),
            &DeliveryOverride::default(),
        );
        assert_eq!(config.sound_key, "chime");

        let alarm = registry.resolve(
            "finance",
            TYPE_ALARM,
            &BTreeMap::new(),
            &settings(&module),
            &DeliveryOverride::default(),
        );
        assert_eq!(alarm.audio_stream, AudioStream::Alarm);
        assert!(alarm.bypass_quiet_hours);
    }

    #[test]
    fn reminder_type_uses_the_module_default_channel() {
        let registry = TypeRegistry::new();
        let module = ModuleSettings {
            default_channel_key: Some("bills".to_string()),
            ..ModuleSettings::default()
        };
        let config = registry.resolve(
            "finance",
            TYPE_REMINDER,
            &BTreeMap::new(),
            &settings(&module),
            &DeliveryOverride::default(),
        );
        assert_eq!(config.channel_key, "bills");

        let plain = registry.resolve(
            "finance",
            TYPE_REMINDER,
            &BTreeMap::new(),
            &settings(&ModuleSettings::default()),
            &DeliveryOverride::default(),
        );
        assert_eq!(plain.channel_key, "reminders");
    }

    #[test]
    fn list_marks_sources_and_removal_drops_adapter_types() {
        let registry = TypeRegistry::new();
        registry.set_adapter_types("habit", vec![NotificationTypeDef::new("streak", "Streak")]);
        let mut custom = BTreeMap::new();
        custom.insert(
            "urgent".to_string(),
            NotificationTypeDef::new("urgent", "Very urgent"),
        );

        let listed = registry.list(&custom);
        let urgent = listed
            .iter()
            .find(|item| item.def.id == "urgent")
            .expect("urgent should be listed");
        assert_eq!(urgent.source, TypeSource::Custom);
        assert!(listed
            .iter()
            .any(|item| item.def.id == "streak" && item.source == TypeSource::Adapter));

        registry.remove_adapter_types("habit");
        assert!(!registry
            .list(&BTreeMap::new())
            .iter()
            .any(|item| item.def.id == "streak"));
    }
}
