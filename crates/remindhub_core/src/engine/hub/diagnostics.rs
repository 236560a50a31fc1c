//! Journal versus OS state: reconciliation and the scheduled projection.

use super::{FailureContext, NotificationHub};
use crate::engine::dispatch::DispatchOrder;
use crate::model::delivery::AudioStream;
use crate::model::log_entry::{LogEntry, LogEvent, LogQuery};
use crate::model::payload::NotificationPayload;
use crate::model::tracked::{DispatchPath, TrackedEntry};
use crate::platform::PendingNotification;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of one [`NotificationHub::reconcile`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Future entries the OS had dropped and that were dispatched again.
    pub restored: usize,
    /// Past entries with no delivery record, dropped from the journal.
    pub missed: usize,
    /// Past entries with a delivery record, left for the retention window.
    pub consumed: usize,
    pub failed: usize,
}

/// Which side knew about a projected notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSource {
    Journal,
    Os,
    Both,
}

/// Diagnostics row merging the journal and the OS pending list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledProjection {
    pub id: i32,
    pub module_id: String,
    pub entity_id: String,
    pub title: String,
    pub body: String,
    pub payload: Option<String>,
    /// Unknown for OS-only rows.
    pub fire_at_ms: Option<i64>,
    pub channel_key: Option<String>,
    pub sound_key: Option<String>,
    pub audio_stream: Option<AudioStream>,
    pub path: Option<DispatchPath>,
    pub source: ProjectionSource,
}

impl ScheduledProjection {
    fn from_entry(entry: TrackedEntry) -> Self {
        Self {
            id: entry.id,
            module_id: entry.module_id,
            entity_id: entry.entity_id,
            title: entry.title,
            body: entry.body,
            payload: Some(entry.payload),
            fire_at_ms: Some(entry.scheduled_time_ms),
            channel_key: Some(entry.channel_key),
            sound_key: Some(entry.sound_key),
            audio_stream: Some(entry.audio_stream),
            path: Some(entry.path),
            source: ProjectionSource::Journal,
        }
    }

    fn from_pending(pending: PendingNotification) -> Self {
        let parsed = pending
            .payload
            .as_deref()
            .and_then(|raw| NotificationPayload::parse(raw).ok());
        let (module_id, entity_id) = parsed
            .map(|parsed| (parsed.module_id, parsed.entity_id))
            .unwrap_or_default();
        Self {
            id: pending.id,
            module_id,
            entity_id,
            title: pending.title,
            body: pending.body,
            payload: pending.payload,
            fire_at_ms: None,
            channel_key: None,
            sound_key: None,
            audio_stream: None,
            path: Some(DispatchPath::OsPlugin),
            source: ProjectionSource::Os,
        }
    }
}

impl NotificationHub {
    /// Re-dispatches OS-plugin entries the OS evicted and drops stale ones.
    ///
    /// A past entry absent from the OS list counts as missed only when
    /// neither the journal nor the audit log saw it delivered.
    pub async fn reconcile(&self) -> ReconcileReport {
        self.initialize().await;
        let mut report = ReconcileReport::default();
        let pending = match self.dispatcher.scheduler().list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(
                    "event=reconcile module=engine status=error error={}",
                    err
                );
                return report;
            }
        };
        let live: BTreeSet<i32> = pending.iter().map(|item| item.id).collect();
        let now_ms = self.clock.now_ms();

        for entry in self.journal.entries().await {
            if entry.path != DispatchPath::OsPlugin || live.contains(&entry.id) {
                continue;
            }
            if entry.is_pending(now_ms) {
                let order = DispatchOrder::from_entry(&entry);
                match self.dispatcher.dispatch(&order, DispatchPath::OsPlugin).await {
                    Ok(_) => report.restored += 1,
                    Err(err) => {
                        report.failed += 1;
                        let context = FailureContext {
                            operation: "reconcile",
                            module_id: entry.module_id.clone(),
                            entity_id: entry.entity_id.clone(),
                            notification_id: Some(entry.id),
                            title: entry.title.clone(),
                            body: entry.body.clone(),
                            payload: Some(entry.payload.clone()),
                            action_id: None,
                        };
                        self.record_failure(&err, context);
                    }
                }
                continue;
            }
            if entry.delivered_at_ms.is_some() || self.was_delivered(&entry) {
                report.consumed += 1;
                continue;
            }

            report.missed += 1;
            let missed = LogEntry::new(
                LogEvent::Missed,
                &entry.module_id,
                &entry.entity_id,
                now_ms,
            )
            .with_notification_id(Some(entry.id))
            .with_content(&entry.title, &entry.body)
            .with_payload(Some(entry.payload.clone()))
            .with_meta("fire_at_ms", entry.scheduled_time_ms);
            self.append_log(missed);
            if let Err(err) = self.journal.remove(entry.path, entry.id).await {
                warn!(
                    "event=reconcile module=engine status=error notification_id={} error={}",
                    entry.id, err
                );
            }
        }

        info!(
            "event=reconcile module=engine status=ok restored={} missed={} consumed={} failed={}",
            report.restored, report.missed, report.consumed, report.failed
        );
        report
    }

    fn was_delivered(&self, entry: &TrackedEntry) -> bool {
        let query = LogQuery {
            notification_id: Some(entry.id),
            events: vec![LogEvent::Delivered],
            since_ms: Some(entry.created_at_ms),
            limit: Some(1),
            ..LogQuery::default()
        };
        match self.history.list(&query) {
            Ok(found) => !found.is_empty(),
            Err(err) => {
                warn!(
                    "event=reconcile module=engine status=error notification_id={} error={}",
                    entry.id, err
                );
                true
            }
        }
    }

    /// Every notification the engine or the OS believes is pending.
    ///
    /// Journal values win; OS-only rows carry what the OS reports.
    pub async fn get_all_scheduled_notifications(&self) -> Vec<ScheduledProjection> {
        self.initialize().await;
        let mut rows: BTreeMap<i32, ScheduledProjection> = BTreeMap::new();
        let now_ms = self.clock.now_ms();
        for entry in self.journal.pending_entries(now_ms, self.retention_ms()).await {
            rows.entry(entry.id)
                .or_insert_with(|| ScheduledProjection::from_entry(entry));
        }

        match self.dispatcher.scheduler().list_pending().await {
            Ok(pending) => {
                for item in pending {
                    match rows.get_mut(&item.id) {
                        Some(row) => {
                            row.source = ProjectionSource::Both;
                            if row.payload.is_none() {
                                row.payload = item.payload;
                            }
                        }
                        None => {
                            rows.insert(item.id, ScheduledProjection::from_pending(item));
                        }
                    }
                }
            }
            Err(err) => {
                warn!(
                    "event=list_scheduled module=engine status=error error={}",
                    err
                );
            }
        }

        let mut rows: Vec<ScheduledProjection> = rows.into_values().collect();
        rows.sort_by_key(|row| (row.fire_at_ms.is_none(), row.fire_at_ms, row.id));
        rows
    }
}
