//! Cancellation by ID, entity and module.
//!
//! # Invariants
//! - Every cancel covers the ID and its backup counterparts on both paths
//!   and purges their journal entries.
//! - Sweeps count logical reminders: a backup ID whose primary was also
//!   matched is not counted twice.
//! - Journal entries kept only for snooze are purged by sweeps but not
//!   counted.

use super::NotificationHub;
use crate::engine::ids::{counterparts, with_counterparts, BACKUP_ID_OFFSET};
use crate::model::log_entry::{LogEntry, LogEvent};
use crate::model::module::ModuleDescriptor;
use crate::model::payload::NotificationPayload;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

const UNKNOWN_SOURCE: &str = "unknown";

/// What a sweep is looking for.
enum SweepTarget<'a> {
    Entity { module_id: &'a str, entity_id: &'a str },
    Module(&'a ModuleDescriptor),
}

impl SweepTarget<'_> {
    fn module_id(&self) -> &str {
        match self {
            Self::Entity { module_id, .. } => *module_id,
            Self::Module(module) => module.id.as_str(),
        }
    }

    fn matches(&self, module_id: &str, entity_id: &str) -> bool {
        match self {
            Self::Entity {
                module_id: wanted_module,
                entity_id: wanted_entity,
            } => module_id == *wanted_module && entity_id == *wanted_entity,
            Self::Module(module) => module_id == module.id,
        }
    }

    /// Range fallback for OS entries without a readable payload.
    fn matches_unattributed(&self, notification_id: i32) -> bool {
        match self {
            Self::Entity { .. } => false,
            Self::Module(module) => {
                module.owns_id(notification_id)
                    || counterparts(notification_id)
                        .into_iter()
                        .any(|id| module.owns_id(id))
            }
        }
    }
}

/// Who a cancelled ID belonged to, for the audit entry.
#[derive(Debug, Clone)]
struct Attribution {
    module_id: String,
    entity_id: String,
    title: String,
    body: String,
    payload: Option<String>,
}

impl Attribution {
    fn unknown() -> Self {
        Self {
            module_id: UNKNOWN_SOURCE.to_string(),
            entity_id: String::new(),
            title: String::new(),
            body: String::new(),
            payload: None,
        }
    }
}

impl NotificationHub {
    /// Cancels one notification and its backup counterparts.
    ///
    /// Returns `false` for a negative ID or when every platform cancel failed.
    pub async fn cancel_by_notification_id(
        &self,
        notification_id: i32,
        payload: Option<&str>,
    ) -> bool {
        self.initialize().await;
        if notification_id < 0 {
            warn!(
                "event=cancel module=engine status=error notification_id={} reason_code=invalid_notification_id",
                notification_id
            );
            return false;
        }

        let attribution = self.attribute(notification_id, payload).await;
        let ids = with_counterparts(notification_id);
        let failures = self.cancel_ids(&ids).await;
        let succeeded = failures < ids.len() * 2;

        self.log_cancelled(notification_id, &attribution, "notification_id");
        info!(
            "event=cancel module=engine status={} notification_id={} module_id={} failures={}",
            if succeeded { "ok" } else { "error" },
            notification_id,
            attribution.module_id,
            failures
        );
        succeeded
    }

    /// Cancels every reminder of one entity; returns the distinct count.
    pub async fn cancel_for_entity(&self, module_id: &str, entity_id: &str) -> usize {
        self.initialize().await;
        self.sweep(SweepTarget::Entity {
            module_id,
            entity_id,
        })
        .await
    }

    /// Cancels every reminder of one module; returns the distinct count.
    pub async fn cancel_for_module(&self, module_id: &str) -> usize {
        self.initialize().await;
        let module = self
            .modules
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| ModuleDescriptor::new(module_id, module_id, 0, 0));
        self.sweep(SweepTarget::Module(&module)).await
    }

    async fn sweep(&self, target: SweepTarget<'_>) -> usize {
        let mut matched: BTreeMap<i32, Attribution> = BTreeMap::new();
        let mut retained: BTreeSet<i32> = BTreeSet::new();
        let now_ms = self.clock.now_ms();

        for entry in self.journal.entries().await {
            if !target.matches(&entry.module_id, &entry.entity_id) {
                continue;
            }
            if !entry.is_pending(now_ms) {
                retained.insert(entry.id);
                continue;
            }
            matched.entry(entry.id).or_insert_with(|| Attribution {
                module_id: entry.module_id.clone(),
                entity_id: entry.entity_id.clone(),
                title: entry.title.clone(),
                body: entry.body.clone(),
                payload: Some(entry.payload.clone()),
            });
        }

        match self.dispatcher.scheduler().list_pending().await {
            Ok(pending) => {
                for item in pending {
                    let parsed = item
                        .payload
                        .as_deref()
                        .and_then(|raw| NotificationPayload::parse(raw).ok());
                    let hit = match &parsed {
                        Some(parsed) => target.matches(&parsed.module_id, &parsed.entity_id),
                        None => target.matches_unattributed(item.id),
                    };
                    if !hit {
                        continue;
                    }
                    matched.entry(item.id).or_insert_with(|| Attribution {
                        module_id: parsed
                            .as_ref()
                            .map_or_else(|| target.module_id().to_string(), |p| p.module_id.clone()),
                        entity_id: parsed.map(|p| p.entity_id).unwrap_or_default(),
                        title: item.title.clone(),
                        body: item.body.clone(),
                        payload: item.payload.clone(),
                    });
                }
            }
            Err(err) => {
                warn!(
                    "event=cancel_sweep module=engine status=error module_id={} error={}",
                    target.module_id(),
                    err
                );
            }
        }

        let logical: Vec<i32> = matched
            .keys()
            .copied()
            .filter(|id| !(*id >= BACKUP_ID_OFFSET && matched.contains_key(&(id - BACKUP_ID_OFFSET))))
            .collect();
        let all_ids: BTreeSet<i32> = matched
            .keys()
            .chain(retained.iter())
            .flat_map(|id| with_counterparts(*id))
            .collect();
        let all_ids: Vec<i32> = all_ids.into_iter().collect();
        let failures = self.cancel_ids(&all_ids).await;

        for id in &logical {
            if let Some(attribution) = matched.get(id) {
                self.log_cancelled(*id, attribution, "sweep");
            }
        }
        info!(
            "event=cancel_sweep module=engine status=ok module_id={} cancelled={} ids={} failures={}",
            target.module_id(),
            logical.len(),
            all_ids.len(),
            failures
        );
        logical.len()
    }

    /// Cancels `ids` on both paths, purges the journal and forgets the
    /// dedup cache. Returns the number of failed platform calls.
    pub(super) async fn cancel_ids(&self, ids: &[i32]) -> usize {
        let failures = self.dispatcher.cancel_everywhere(ids).await;
        if let Err(err) = self.journal.remove_ids(ids).await {
            warn!(
                "event=journal_remove module=engine status=error ids={} error={}",
                ids.len(),
                err
            );
        }
        self.forget_scheduled(ids);
        failures
    }

    async fn attribute(&self, notification_id: i32, payload: Option<&str>) -> Attribution {
        if let Some(raw) = payload {
            if let Ok(parsed) = NotificationPayload::parse(raw) {
                return Attribution {
                    module_id: parsed.module_id,
                    entity_id: parsed.entity_id,
                    title: String::new(),
                    body: String::new(),
                    payload: Some(raw.to_string()),
                };
            }
        }

        for id in with_counterparts(notification_id) {
            if let Some(entry) = self.journal.find(id).await {
                return Attribution {
                    module_id: entry.module_id,
                    entity_id: entry.entity_id,
                    title: entry.title,
                    body: entry.body,
                    payload: Some(entry.payload),
                };
            }
        }

        match self.history.latest_scheduled_by_notification(notification_id) {
            Ok(Some(entry)) => {
                return Attribution {
                    module_id: entry.module_id,
                    entity_id: entry.entity_id,
                    title: entry.title,
                    body: entry.body,
                    payload: entry.payload,
                };
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    "event=cancel module=engine status=error notification_id={} lookup=history error={}",
                    notification_id, err
                );
            }
        }

        match self.resolve_source(notification_id, payload).await {
            Some(source) => Attribution {
                module_id: source.module_id,
                entity_id: source.entity_id.unwrap_or_default(),
                payload: payload.map(str::to_string),
                ..Attribution::unknown()
            },
            None => Attribution {
                payload: payload.map(str::to_string),
                ..Attribution::unknown()
            },
        }
    }

    fn log_cancelled(&self, notification_id: i32, attribution: &Attribution, scope: &str) {
        let entry = LogEntry::new(
            LogEvent::Cancelled,
            &attribution.module_id,
            &attribution.entity_id,
            self.clock.now_ms(),
        )
        .with_notification_id(Some(notification_id))
        .with_content(&attribution.title, &attribution.body)
        .with_payload(attribution.payload.clone())
        .with_meta("scope", scope);
        self.append_log(entry);
    }
}
