//! Module adapter registry with bounded wait for late registration.
//!
//! # Responsibility
//! - Map a module id to the adapter that reacts to taps, actions and deletes.
//! - Let callbacks that arrive before module startup wait for registration.
//!
//! # Invariants
//! - Registering the same module again replaces the adapter.
//! - Every registry change bumps a `watch` generation; waiters wake on change
//!   and give up at the deadline.

use crate::model::delivery::NotificationTypeDef;
use crate::model::payload::NotificationPayload;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Module-side handler for notification callbacks.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// Module this adapter serves.
    fn module_id(&self) -> &str;

    /// Types this module declares; merged into the type registry.
    fn notification_types(&self) -> Vec<NotificationTypeDef> {
        Vec::new()
    }

    /// Returns whether the tap was handled.
    async fn on_tap(&self, payload: &NotificationPayload) -> bool;

    /// Returns whether the action was handled.
    async fn on_action(
        &self,
        action_id: &str,
        payload: &NotificationPayload,
        notification_id: Option<i32>,
    ) -> bool;

    async fn on_deleted(&self, _payload: &NotificationPayload, _notification_id: Option<i32>) {}
}

/// Adapter registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRegistryError {
    EmptyModuleId,
    LockPoisoned,
}

impl Display for AdapterRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyModuleId => write!(f, "adapter module id cannot be empty"),
            Self::LockPoisoned => write!(f, "adapter registry lock poisoned"),
        }
    }
}

impl Error for AdapterRegistryError {}

/// Runtime adapter registry.
pub struct AdapterRegistry {
    adapters: Mutex<BTreeMap<String, Arc<dyn NotificationAdapter>>>,
    generation: watch::Sender<u64>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            adapters: Mutex::new(BTreeMap::new()),
            generation,
        }
    }

    /// Registers or replaces the adapter for its module.
    ///
    /// Returns the adapter it replaced, if any.
    pub fn register(
        &self,
        adapter: Arc<dyn NotificationAdapter>,
    ) -> Result<Option<Arc<dyn NotificationAdapter>>, AdapterRegistryError> {
        let module_id = adapter.module_id().trim().to_string();
        if module_id.is_empty() {
            return Err(AdapterRegistryError::EmptyModuleId);
        }
        let previous = {
            let mut adapters = self
                .adapters
                .lock()
                .map_err(|_| AdapterRegistryError::LockPoisoned)?;
            adapters.insert(module_id, adapter)
        };
        self.bump();
        Ok(previous)
    }

    /// Removes the adapter for `module_id`; missing modules are a no-op.
    pub fn unregister(&self, module_id: &str) -> bool {
        let removed = self
            .adapters
            .lock()
            .map(|mut adapters| adapters.remove(module_id.trim()).is_some())
            .unwrap_or(false);
        if removed {
            self.bump();
        }
        removed
    }

    pub fn get(&self, module_id: &str) -> Option<Arc<dyn NotificationAdapter>> {
        self.adapters
            .lock()
            .ok()
            .and_then(|adapters| adapters.get(module_id.trim()).cloned())
    }

    /// Sorted registered module ids.
    pub fn module_ids(&self) -> Vec<String> {
        self.adapters
            .lock()
            .map(|adapters| adapters.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Waits up to `timeout` for an adapter for `module_id`.
    pub async fn wait_for(
        &self,
        module_id: &str,
        timeout: Duration,
    ) -> Option<Arc<dyn NotificationAdapter>> {
        // Subscribe before the first lookup so a registration in between
        // still wakes this waiter.
        let mut changes = self.generation.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(adapter) = self.get(module_id) {
                return Some(adapter);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.get(module_id),
            }
        }
    }

    fn bump(&self) {
        self.generation.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterRegistry, AdapterRegistryError, NotificationAdapter};
    use crate::model::payload::NotificationPayload;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubAdapter(&'static str);

    #[async_trait]
    impl NotificationAdapter for StubAdapter {
        fn module_id(&self) -> &str {
            self.0
        }

        async fn on_tap(&self, _payload: &NotificationPayload) -> bool {
            true
        }

        async fn on_action(
            &self,
            _action_id: &str,
            _payload: &NotificationPayload,
            _notification_id: Option<i32>,
        ) -> bool {
            false
        }
    }

    #[test]
    fn register_replaces_and_unregister_is_idempotent() {
        let registry = AdapterRegistry::new();
        assert!(registry
            .register(Arc::new(StubAdapter("task")))
            .expect("first register")
            .is_none());
        assert!(registry
            .register(Arc::new(StubAdapter("task")))
            .expect("second register")
            .is_some());
        assert_eq!(registry.module_ids(), vec!["task".to_string()]);

        assert!(registry.unregister("task"));
        assert!(!registry.unregister("task"));
        assert_eq!(
            registry.register(Arc::new(StubAdapter("  "))).err(),
            Some(AdapterRegistryError::EmptyModuleId)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_wakes_on_late_registration() {
        let registry = Arc::new(AdapterRegistry::new());
        let late = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            late.register(Arc::new(StubAdapter("habit")))
                .expect("late register");
        });

        let found = registry.wait_for("habit", Duration::from_secs(3)).await;
        assert!(found.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let registry = AdapterRegistry::new();
        registry
            .register(Arc::new(StubAdapter("task")))
            .expect("register");
        let found = registry.wait_for("habit", Duration::from_secs(3)).await;
        assert!(found.is_none());
    }
}
