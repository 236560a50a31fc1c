//! Attributes a bare notification ID to its module and entity.
//!
//! Order of evidence: the payload when it parses, then the module whose
//! reserved range holds the ID, then a scan of reminder definitions whose
//! derived ID (or its backup counterpart) matches.

use crate::engine::ids::{counterparts, derive_notification_id, Fingerprint};
use crate::model::module::ModuleDescriptor;
use crate::model::payload::NotificationPayload;
use crate::platform::ReminderDefinitionSource;
use crate::registry::module_registry::ModuleRegistry;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a source was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Payload,
    ModuleRange,
    DefinitionScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub module_id: String,
    /// Unknown when only the ID range matched.
    pub entity_id: Option<String>,
    pub payload: Option<NotificationPayload>,
    pub method: ResolutionMethod,
}

pub struct SourceResolver<'a> {
    modules: &'a ModuleRegistry,
    definitions: Option<&'a Arc<dyn ReminderDefinitionSource>>,
}

impl<'a> SourceResolver<'a> {
    pub fn new(
        modules: &'a ModuleRegistry,
        definitions: Option<&'a Arc<dyn ReminderDefinitionSource>>,
    ) -> Self {
        Self {
            modules,
            definitions,
        }
    }

    pub async fn resolve(
        &self,
        notification_id: i32,
        payload: Option<&str>,
    ) -> Option<ResolvedSource> {
        if let Some(parsed) = payload.and_then(|raw| NotificationPayload::parse(raw).ok()) {
            return Some(ResolvedSource {
                module_id: parsed.module_id.clone(),
                entity_id: Some(parsed.entity_id.clone()),
                payload: Some(parsed),
                method: ResolutionMethod::Payload,
            });
        }

        if let Some(module) = self.owner_of(notification_id) {
            return Some(ResolvedSource {
                module_id: module.id.clone(),
                entity_id: None,
                payload: None,
                method: ResolutionMethod::ModuleRange,
            });
        }

        self.scan_definitions(notification_id).await
    }

    fn owner_of(&self, notification_id: i32) -> Option<&ModuleDescriptor> {
        self.modules.owner_of(notification_id).or_else(|| {
            counterparts(notification_id)
                .into_iter()
                .find_map(|id| self.modules.owner_of(id))
        })
    }

    async fn scan_definitions(&self, notification_id: i32) -> Option<ResolvedSource> {
        let source = self.definitions?;
        let definitions = match source.definitions().await {
            Ok(definitions) => definitions,
            Err(err) => {
                warn!(
                    "event=source_resolve module=engine status=error notification_id={} error={}",
                    notification_id, err
                );
                return None;
            }
        };

        let mut candidates = vec![notification_id];
        candidates.extend(counterparts(notification_id));
        for definition in definitions {
            let fingerprint = Fingerprint::from_definition(&definition);
            let derived = match self.modules.get(&definition.module_id) {
                Some(module) => derive_notification_id(module, &fingerprint),
                None => {
                    let rangeless =
                        ModuleDescriptor::new(definition.module_id.as_str(), "unregistered", 0, 0);
                    derive_notification_id(&rangeless, &fingerprint)
                }
            };
            if candidates.contains(&derived) {
                return Some(ResolvedSource {
                    module_id: definition.module_id,
                    entity_id: Some(definition.entity_id),
                    payload: None,
                    method: ResolutionMethod::DefinitionScan,
                });
            }
        }
        None
    }
}
