//! Snooze rescheduling.
//!
//! Reuses the journalled path and delivery config when the entry is known,
//! delivered entries included while inside the retention window; otherwise
//! rebuilds a request from the payload and runs the pipeline with the
//! explicit ID.

use super::{FailureContext, NotificationHub, MS_PER_MINUTE};
use crate::engine::dispatch::DispatchOrder;
use crate::engine::snooze::snooze_minutes;
use crate::error::{NotificationError, NotificationResult};
use crate::model::delivery::TYPE_REMINDER;
use crate::model::log_entry::{LogEntry, LogEvent};
use crate::model::payload::{NotificationPayload, EXTRA_PRIORITY, EXTRA_TYPE};
use crate::model::request::{NotificationPriority, ScheduleRequest, ScheduledNotification};
use log::info;

impl NotificationHub {
    /// Boolean form of [`NotificationHub::snooze_notification`].
    pub async fn snooze(
        &self,
        payload: &str,
        title: &str,
        body: &str,
        notification_id: Option<i32>,
        duration_minutes: Option<u32>,
    ) -> bool {
        self.snooze_notification(payload, title, body, notification_id, duration_minutes)
            .await
            .is_ok()
    }

    /// Reschedules a delivered notification `duration_minutes` from now.
    ///
    /// `MaxSnoozeReached` leaves every store and the OS untouched.
    pub async fn snooze_notification(
        &self,
        payload: &str,
        title: &str,
        body: &str,
        notification_id: Option<i32>,
        duration_minutes: Option<u32>,
    ) -> NotificationResult<ScheduledNotification> {
        self.initialize().await;
        let parsed = match NotificationPayload::parse(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = NotificationError::from(err);
                let context = FailureContext::from_payload("snooze", payload, None)
                    .with_notification_id(notification_id)
                    .with_content(title, body);
                self.record_failure(&err, context);
                return Err(err);
            }
        };

        let module = match self.modules.get(&parsed.module_id) {
            Some(module) => module.clone(),
            None => {
                let err = NotificationError::ModuleNotRegistered(parsed.module_id.clone());
                self.report_gate(&err, "snooze", &parsed.module_id);
                return Err(err);
            }
        };
        let settings = self.effective_settings(&module.id).await;

        let count = parsed.snooze_count();
        if !settings.allows_snooze(count) {
            return Err(NotificationError::MaxSnoozeReached {
                count,
                max: settings.max_snooze_count,
            });
        }

        let resolved_id = match notification_id {
            Some(id) if id < 0 => None,
            Some(id) => Some(id),
            None => self.derive_for_payload(&parsed),
        };
        let next = parsed.with_snooze_count(count.saturating_add(1));
        let next_raw = next.serialize();
        let context = FailureContext::from_payload("snooze", &next_raw, Some(&parsed))
            .with_notification_id(resolved_id)
            .with_content(title, body);

        let Some(id) = resolved_id else {
            let err = NotificationError::InvalidNotificationId(notification_id.unwrap_or(-1));
            self.record_failure(&err, context);
            return Err(err);
        };

        let now_ms = self.clock.now_ms();
        let entry = self
            .journal
            .find(id)
            .await
            .filter(|entry| !entry.is_expired(now_ms, self.retention_ms()));
        let priority = entry
            .as_ref()
            .map(|entry| entry.priority)
            .or_else(|| parsed.extra(EXTRA_PRIORITY).and_then(NotificationPriority::parse))
            .unwrap_or_default();
        let minutes = snooze_minutes(duration_minutes, priority, &settings);
        let fire_at_ms = now_ms + i64::from(minutes) * MS_PER_MINUTE;

        let outcome = match entry {
            Some(entry) => {
                let mut order = DispatchOrder::from_entry(&entry);
                if !title.trim().is_empty() {
                    order.title = title.to_string();
                }
                if !body.trim().is_empty() {
                    order.body = body.to_string();
                }
                order.fire_at_ms = fire_at_ms;
                order.payload = next_raw.clone();
                self.replace_and_dispatch(&order, entry.path)
                    .await
                    .map(|path| ScheduledNotification {
                        notification_id: id,
                        module_id: module.id.clone(),
                        entity_id: parsed.entity_id.clone(),
                        fire_at_ms,
                        path,
                        deferred_by_quiet_hours: false,
                    })
            }
            None => {
                let request = rebuild_request(&next, title, body, fire_at_ms, priority, id);
                self.schedule_with(&request, &module, &settings).await
            }
        };

        match outcome {
            Ok(scheduled) => {
                if let Ok(mut cache) = self.scheduled_cache.lock() {
                    cache.insert(scheduled.notification_id, scheduled.fire_at_ms);
                }
                let entry = LogEntry::new(
                    LogEvent::Snoozed,
                    &scheduled.module_id,
                    &scheduled.entity_id,
                    self.clock.now_ms(),
                )
                .with_notification_id(Some(scheduled.notification_id))
                .with_content(title, body)
                .with_payload(Some(next_raw))
                .with_meta("snooze_count", count.saturating_add(1))
                .with_meta("duration_minutes", minutes)
                .with_meta("fire_at_ms", scheduled.fire_at_ms)
                .with_meta("path", scheduled.path.as_str());
                self.append_log(entry);
                info!(
                    "event=snooze module=engine status=ok module_id={} notification_id={} minutes={} count={}",
                    scheduled.module_id,
                    scheduled.notification_id,
                    minutes,
                    count.saturating_add(1)
                );
                Ok(scheduled)
            }
            Err(err) => {
                self.record_failure(&err, context);
                Err(err)
            }
        }
    }
}

fn rebuild_request(
    payload: &NotificationPayload,
    title: &str,
    body: &str,
    fire_at_ms: i64,
    priority: NotificationPriority,
    notification_id: i32,
) -> ScheduleRequest {
    let type_id = payload
        .extra(EXTRA_TYPE)
        .filter(|value| !value.is_empty())
        .unwrap_or(TYPE_REMINDER)
        .to_string();
    let mut request = ScheduleRequest::new(
        &payload.module_id,
        &payload.entity_id,
        title,
        body,
        fire_at_ms,
    )
    .with_type(type_id)
    .with_reminder(
        &payload.reminder_type,
        payload.reminder_value,
        &payload.reminder_unit,
    )
    .with_priority(priority)
    .with_notification_id(notification_id);
    request.extras = payload.extras.clone();
    request
}

#[cfg(test)]
mod tests {
    use super::rebuild_request;
    use crate::model::payload::{NotificationPayload, EXTRA_SNOOZE_COUNT};
    use crate::model::request::NotificationPriority;

    #[test]
    fn rebuilt_request_keeps_payload_identity() {
        let payload = NotificationPayload::new("finance", "bill:123")
            .with_reminder("before", 1, "days")
            .with_extra("type", "bill_due")
            .with_extra(EXTRA_SNOOZE_COUNT, "2");
        let request =
            rebuild_request(&payload, "Rent", "Due", 1_000, NotificationPriority::High, 4242);

        assert_eq!(request.type_id, "bill_due");
        assert_eq!(request.notification_id, Some(4242));
        let rebuilt = request.payload();
        assert_eq!(rebuilt.module_id, "finance");
        assert_eq!(rebuilt.snooze_count(), 2);
        assert_eq!(rebuilt.extra("priority"), Some("high"));
    }

    #[test]
    fn missing_type_defaults_to_reminder() {
        let payload = NotificationPayload::new("task", "t1");
        let request =
            rebuild_request(&payload, "", "", 0, NotificationPriority::Default, 7);
        assert_eq!(request.type_id, "reminder");
    }
}
