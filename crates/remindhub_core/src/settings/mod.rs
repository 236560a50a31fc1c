//! Persisted settings over the key-value store.
//!
//! # Responsibility
//! - Load and save global settings, per-module overlays, custom types and
//!   the hub-level module enable map.
//! - Merge global and module settings into `EffectiveSettings`.
//!
//! # Invariants
//! - Missing or unreadable values degrade to defaults with a warning; loads
//!   never fail.
//! - Saves surface the store error to the caller.

use crate::model::delivery::NotificationTypeDef;
use crate::model::settings::{EffectiveSettings, GlobalSettings, ModuleSettings};
use crate::platform::{KeyValueStore, PlatformError, PlatformResult};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const KEY_GLOBAL: &str = "settings.global";
const KEY_MODULE_PREFIX: &str = "settings.module.";
const KEY_CUSTOM_TYPES: &str = "settings.custom_types";
const KEY_MODULE_ENABLED: &str = "hub.module_enabled";

/// Settings persistence facade.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn global(&self) -> GlobalSettings {
        self.load_or_default(KEY_GLOBAL).await
    }

    pub async fn save_global(&self, settings: &GlobalSettings) -> PlatformResult<()> {
        self.save(KEY_GLOBAL, settings).await
    }

    pub async fn module(&self, module_id: &str) -> ModuleSettings {
        self.load_or_default(&module_key(module_id)).await
    }

    pub async fn save_module(
        &self,
        module_id: &str,
        settings: &ModuleSettings,
    ) -> PlatformResult<()> {
        self.save(&module_key(module_id), settings).await
    }

    /// Reloads both layers and merges them.
    pub async fn effective(&self, module_id: &str) -> EffectiveSettings {
        let global = self.global().await;
        let module = self.module(module_id).await;
        EffectiveSettings::merge(module_id, &global, &module)
    }

    /// Custom type definitions keyed by type id.
    pub async fn custom_types(&self) -> BTreeMap<String, NotificationTypeDef> {
        self.load_or_default(KEY_CUSTOM_TYPES).await
    }

    /// Inserts or replaces a custom type by id.
    pub async fn save_custom_type(&self, def: &NotificationTypeDef) -> PlatformResult<()> {
        let mut types = self.custom_types().await;
        types.insert(def.id.clone(), def.clone());
        self.save(KEY_CUSTOM_TYPES, &types).await
    }

    /// Returns whether a type was removed.
    pub async fn remove_custom_type(&self, type_id: &str) -> PlatformResult<bool> {
        let mut types = self.custom_types().await;
        if types.remove(type_id).is_none() {
            return Ok(false);
        }
        self.save(KEY_CUSTOM_TYPES, &types).await?;
        Ok(true)
    }

    /// Persisted hub-level enable flags; absent modules use their default.
    pub async fn module_enabled_map(&self) -> BTreeMap<String, bool> {
        self.load_or_default(KEY_MODULE_ENABLED).await
    }

    pub async fn save_module_enabled_map(
        &self,
        enabled: &BTreeMap<String, bool>,
    ) -> PlatformResult<()> {
        self.save(KEY_MODULE_ENABLED, enabled).await
    }

    async fn load_or_default<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(err) => {
                warn!(
                    "event=settings_load module=settings status=error key={} error_code=store_read_failed error={}",
                    key, err
                );
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "event=settings_load module=settings status=error key={} error_code=settings_corrupt error={}",
                    key, err
                );
                T::default()
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> PlatformResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|err| PlatformError::new("settings_encode", err.to_string()))?;
        self.store.set(key, &raw).await
    }
}

fn module_key(module_id: &str) -> String {
    format!("{KEY_MODULE_PREFIX}{module_id}")
}

#[cfg(test)]
mod tests {
    use super::SettingsStore;
    use crate::model::delivery::NotificationTypeDef;
    use crate::model::settings::{GlobalSettings, ModuleSettings};
    use crate::platform::KeyValueStore;
    use crate::store::MemoryKeyValueStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn corrupt_values_degrade_to_defaults() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set("settings.global", "{not json").await.expect("seed");
        let store = SettingsStore::new(kv);
        assert_eq!(store.global().await, GlobalSettings::default());
        assert!(store.custom_types().await.is_empty());
    }

    #[tokio::test]
    async fn module_overlay_is_merged_after_save() {
        let store = SettingsStore::new(Arc::new(MemoryKeyValueStore::new()));
        let global = GlobalSettings {
            default_snooze_minutes: 15,
            ..GlobalSettings::default()
        };
        store.save_global(&global).await.expect("save global");
        store
            .save_module(
                "habit",
                &ModuleSettings {
                    notifications_enabled: false,
                    default_channel_key: Some("habits".to_string()),
                    ..ModuleSettings::default()
                },
            )
            .await
            .expect("save module");

        let effective = store.effective("habit").await;
        assert!(!effective.notifications_enabled_for_module);
        assert_eq!(effective.default_channel_key, "habits");
        assert_eq!(effective.default_snooze_minutes, 15);
        assert!(store.effective("task").await.notifications_enabled_for_module);
    }

    #[tokio::test]
    async fn custom_types_save_and_remove() {
        let store = SettingsStore::new(Arc::new(MemoryKeyValueStore::new()));
        store
            .save_custom_type(&NotificationTypeDef::new("loud", "Loud"))
            .await
            .expect("save type");
        assert!(store.custom_types().await.contains_key("loud"));
        assert!(store.remove_custom_type("loud").await.expect("remove"));
        assert!(!store.remove_custom_type("loud").await.expect("remove again"));
    }
}
