//! OS callback routing: tap, action, delete and delivery.

use super::{FailureContext, NotificationHub};
use crate::engine::ids::with_counterparts;
use crate::engine::snooze::NotificationActionKind;
use crate::error::NotificationError;
use crate::model::log_entry::{LogEntry, LogEvent};
use crate::model::payload::NotificationPayload;
use crate::registry::adapter_registry::NotificationAdapter;
use log::{info, warn};
use std::sync::Arc;

impl NotificationHub {
    /// Routes a tap to the owning module adapter. Returns whether it was
    /// handled.
    pub async fn handle_notification_tap(&self, payload: &str) -> bool {
        self.initialize().await;
        let Some(parsed) = self.parse_callback_payload("tap", payload, None) else {
            return false;
        };
        let Some(adapter) = self.await_adapter("tap", payload, &parsed, None).await else {
            return false;
        };

        let handled = adapter.on_tap(&parsed).await;
        let entry = LogEntry::new(
            LogEvent::Tapped,
            &parsed.module_id,
            &parsed.entity_id,
            self.clock.now_ms(),
        )
        .with_notification_id(self.derive_for_payload(&parsed))
        .with_payload(Some(payload.to_string()))
        .with_meta("handled", handled);
        self.append_log(entry);
        info!(
            "event=tap module=engine status=ok module_id={} handled={}",
            parsed.module_id, handled
        );
        handled
    }

    /// Routes an action button press.
    ///
    /// Snooze and dismiss are engine actions; anything else goes to the
    /// module adapter.
    pub async fn handle_notification_action(
        &self,
        action_id: &str,
        payload: &str,
        notification_id: Option<i32>,
    ) -> bool {
        self.initialize().await;
        let Some(parsed) = self.parse_callback_payload("action", payload, notification_id) else {
            return false;
        };
        let resolved_id = notification_id.or_else(|| self.derive_for_payload(&parsed));

        let handled = match NotificationActionKind::parse(action_id) {
            NotificationActionKind::Snooze { minutes } => {
                let (title, body) = match resolved_id {
                    Some(id) => self
                        .journal
                        .find(id)
                        .await
                        .map(|entry| (entry.title, entry.body))
                        .unwrap_or_default(),
                    None => Default::default(),
                };
                self.snooze(payload, &title, &body, resolved_id, minutes)
                    .await
            }
            NotificationActionKind::Dismiss => match resolved_id {
                Some(id) => self.cancel_by_notification_id(id, Some(payload)).await,
                None => false,
            },
            NotificationActionKind::Module(action) => {
                let Some(adapter) = self
                    .await_adapter("action", payload, &parsed, resolved_id)
                    .await
                else {
                    return false;
                };
                let handled = adapter.on_action(&action, &parsed, resolved_id).await;
                if !handled {
                    let err = NotificationError::ActionNotHandled {
                        module_id: parsed.module_id.clone(),
                        action_id: action.clone(),
                    };
                    let mut context = FailureContext::from_payload("action", payload, Some(&parsed))
                        .with_notification_id(resolved_id);
                    context.action_id = Some(action);
                    self.record_failure(&err, context);
                }
                handled
            }
        };

        if handled {
            let entry = LogEntry::new(
                LogEvent::Action,
                &parsed.module_id,
                &parsed.entity_id,
                self.clock.now_ms(),
            )
            .with_notification_id(resolved_id)
            .with_payload(Some(payload.to_string()))
            .with_action_id(action_id.trim());
            self.append_log(entry);
        }
        info!(
            "event=action module=engine status={} module_id={} action_id={}",
            if handled { "ok" } else { "skipped" },
            parsed.module_id,
            action_id.trim()
        );
        handled
    }

    /// Forwards a user dismissal from the shade and purges the journal.
    pub async fn handle_notification_deleted(
        &self,
        payload: &str,
        notification_id: Option<i32>,
    ) -> bool {
        self.initialize().await;
        let Some(parsed) = self.parse_callback_payload("deleted", payload, notification_id) else {
            return false;
        };
        let resolved_id = notification_id.or_else(|| self.derive_for_payload(&parsed));
        if let Some(adapter) = self.adapters.get(&parsed.module_id) {
            adapter.on_deleted(&parsed, resolved_id).await;
        }
        if let Some(id) = resolved_id {
            if let Err(err) = self.journal.remove_ids(&with_counterparts(id)).await {
                warn!(
                    "event=deleted module=engine status=error notification_id={} error={}",
                    id, err
                );
            }
        }
        true
    }

    /// Records that the OS delivered a notification.
    ///
    /// One-shot entries stay journalled, marked delivered, so a later snooze
    /// replays their path and delivery config.
    pub async fn record_delivered(&self, payload: &str, notification_id: i32) -> bool {
        self.initialize().await;
        let parsed = NotificationPayload::parse(payload).ok();
        let (module_id, entity_id) = parsed
            .as_ref()
            .map(|parsed| (parsed.module_id.clone(), parsed.entity_id.clone()))
            .unwrap_or_default();

        let now_ms = self.clock.now_ms();
        let tracked = self.journal.find(notification_id).await;
        let mut path = None;
        if let Some(entry) = tracked.filter(|entry| entry.one_shot) {
            path = Some(entry.path);
            if let Err(err) = self
                .journal
                .mark_delivered(entry.path, notification_id, now_ms)
                .await
            {
                warn!(
                    "event=delivered module=engine status=error notification_id={} error={}",
                    notification_id, err
                );
            }
        }

        let mut entry = LogEntry::new(LogEvent::Delivered, module_id, entity_id, now_ms)
            .with_notification_id(Some(notification_id))
            .with_payload(Some(payload.to_string()));
        if let Some(path) = path {
            entry = entry.with_meta("path", path.as_str());
        }
        self.append_log(entry);
        true
    }

    fn parse_callback_payload(
        &self,
        operation: &'static str,
        payload: &str,
        notification_id: Option<i32>,
    ) -> Option<NotificationPayload> {
        match NotificationPayload::parse(payload) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                let context = FailureContext::from_payload(operation, payload, None)
                    .with_notification_id(notification_id);
                self.record_failure(&NotificationError::from(err), context);
                None
            }
        }
    }

    async fn await_adapter(
        &self,
        operation: &'static str,
        payload: &str,
        parsed: &NotificationPayload,
        notification_id: Option<i32>,
    ) -> Option<Arc<dyn NotificationAdapter>> {
        let adapter = self
            .adapters
            .wait_for(&parsed.module_id, self.config.adapter_wait_timeout)
            .await;
        if adapter.is_none() {
            let err = NotificationError::AdapterNotRegistered(parsed.module_id.clone());
            let context = FailureContext::from_payload(operation, payload, Some(parsed))
                .with_notification_id(notification_id);
            self.record_failure(&err, context);
        }
        adapter
    }
}
