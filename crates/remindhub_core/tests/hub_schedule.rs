mod common;

use chrono::FixedOffset;
use common::{harness, harness_with, local_ms, utc};
use remindhub_core::model::delivery::{
    DeliveryOverride, NotificationTypeDef, TYPE_ALARM, TYPE_URGENT,
};
use remindhub_core::model::settings::{GlobalSettings, ModuleSettings, QuietHours};
use remindhub_core::model::tracked::DispatchPath;
use remindhub_core::platform::Clock;
use remindhub_core::{
    HubConfig, LogEvent, LogQuery, NotificationError, NotificationHub, NotificationLogRepository,
    ProjectionSource, ScheduleRequest, BACKUP_ID_OFFSET,
};

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

fn bill_request(at_ms: i64) -> ScheduleRequest {
    ScheduleRequest::new("finance", "bill:123", "Rent due", "Pay the landlord", at_ms)
        .with_reminder("before", 1, "days")
}

fn events(h: &common::Harness, event: LogEvent) -> usize {
    h.history
        .list(&LogQuery::default().with_events([event]))
        .unwrap()
        .len()
}

#[tokio::test]
async fn schedule_derives_an_id_inside_the_module_range() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    let scheduled = h.hub.schedule(bill_request(at)).await.unwrap();

    assert!((10_000..30_000).contains(&scheduled.notification_id));
    assert_eq!(scheduled.module_id, "finance");
    assert_eq!(scheduled.fire_at_ms, at);
    assert_eq!(scheduled.path, DispatchPath::OsPlugin);
    assert!(!scheduled.deferred_by_quiet_hours);
    assert_eq!(h.scheduler.pending_ids(), vec![scheduled.notification_id]);

    let sent = h.scheduler.scheduled();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].payload.starts_with("finance|bill:123|before|1|days"));
}

#[tokio::test]
async fn identical_schedule_is_idempotent_and_logged_once() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    let first = h.hub.schedule(bill_request(at)).await.unwrap();
    let second = h.hub.schedule(bill_request(at)).await.unwrap();

    assert_eq!(first.notification_id, second.notification_id);
    assert_eq!(h.scheduler.pending_ids(), vec![first.notification_id]);
    assert_eq!(events(&h, LogEvent::Scheduled), 1);

    let projection = h.hub.get_all_scheduled_notifications().await;
    assert_eq!(projection.len(), 1);
    assert_eq!(projection[0].source, ProjectionSource::Both);
    assert_eq!(projection[0].fire_at_ms, Some(at));

    h.hub.schedule(bill_request(at + HOUR_MS)).await.unwrap();
    assert_eq!(events(&h, LogEvent::Scheduled), 2);
    assert_eq!(h.scheduler.pending_ids(), vec![first.notification_id]);
}

#[tokio::test]
async fn unique_per_day_changes_the_id_across_days() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    let today = h
        .hub
        .schedule(bill_request(at).unique_per_day())
        .await
        .unwrap();
    let tomorrow = h
        .hub
        .schedule(bill_request(at + DAY_MS).unique_per_day())
        .await
        .unwrap();

    assert_ne!(today.notification_id, tomorrow.notification_id);
    assert_eq!(h.scheduler.pending_ids().len(), 2);
}

#[tokio::test]
async fn past_time_is_rejected_and_logged() {
    let h = harness();
    let at = h.clock.now_ms() - 1;

    let err = h.hub.schedule(bill_request(at)).await.unwrap_err();

    assert!(matches!(err, NotificationError::ScheduleTimeInPast { .. }));
    assert!(h.scheduler.scheduled().is_empty());
    let failed = h
        .history
        .list(&LogQuery::default().with_events([LogEvent::Failed]))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason_code(), Some("schedule_time_in_past"));
    assert_eq!(failed[0].entity_id, "bill:123");
}

#[tokio::test]
async fn unregistered_module_leaves_no_trace() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;
    let request = ScheduleRequest::new("mood", "checkin", "How are you?", "", at);

    let err = h.hub.schedule(request).await.unwrap_err();

    assert_eq!(err, NotificationError::ModuleNotRegistered("mood".to_string()));
    assert!(h.history.list(&LogQuery::default()).unwrap().is_empty());
    assert!(h.scheduler.scheduled().is_empty());
    assert!(h.store.keys().is_empty());
}

#[tokio::test]
async fn disabled_gates_short_circuit_without_logging() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    h.hub.set_module_enabled("finance", false).await.unwrap();
    let err = h.hub.schedule(bill_request(at)).await.unwrap_err();
    assert_eq!(err, NotificationError::ModuleDisabled("finance".to_string()));
    h.hub.set_module_enabled("finance", true).await.unwrap();

    let mut module = ModuleSettings::default();
    module.notifications_enabled = false;
    h.hub.save_module_settings("finance", &module).await.unwrap();
    let err = h.hub.schedule(bill_request(at)).await.unwrap_err();
    assert_eq!(
        err,
        NotificationError::NotificationsDisabledForModule("finance".to_string())
    );

    let mut global = GlobalSettings::default();
    global.notifications_enabled = false;
    h.hub.save_global_settings(&global).await.unwrap();
    let err = h.hub.schedule(bill_request(at)).await.unwrap_err();
    assert_eq!(err, NotificationError::NotificationsDisabledGlobally);

    assert!(h.history.list(&LogQuery::default()).unwrap().is_empty());
    assert!(h.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn module_enable_flag_survives_a_new_hub() {
    let h = harness();
    h.hub.set_module_enabled("habit", false).await.unwrap();
    assert!(!h.hub.is_module_enabled("habit").await);

    let reopened = NotificationHub::builder(
        h.scheduler.clone(),
        h.native.clone(),
        h.store.clone(),
        h.history.clone(),
    )
    .clock(h.clock.clone())
    .build()
    .unwrap();
    assert!(!reopened.is_module_enabled("habit").await);
    assert!(reopened.is_module_enabled("finance").await);

    let err = reopened.set_module_enabled("mood", true).await.unwrap_err();
    assert_eq!(err, NotificationError::ModuleNotRegistered("mood".to_string()));
}

#[tokio::test]
async fn quiet_hours_defer_two_am_to_seven_local() {
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    let h = harness_with(offset, HubConfig::default(), None);
    let mut global = GlobalSettings::default();
    global.quiet_hours = QuietHours::from_hm((22, 0), (7, 0));
    h.hub.save_global_settings(&global).await.unwrap();

    let requested = local_ms(offset, 2, 0) + DAY_MS;
    let scheduled = h.hub.schedule(bill_request(requested)).await.unwrap();

    assert!(scheduled.deferred_by_quiet_hours);
    assert_eq!(scheduled.fire_at_ms, local_ms(offset, 7, 0) + DAY_MS);
    assert_eq!(h.scheduler.scheduled()[0].fire_at_ms, scheduled.fire_at_ms);

    let logged = h
        .history
        .list(&LogQuery::default().with_events([LogEvent::Scheduled]))
        .unwrap();
    assert_eq!(logged[0].metadata["deferred_by_quiet_hours"], true);
}

#[tokio::test]
async fn urgent_types_bypass_quiet_hours() {
    let h = harness();
    let mut global = GlobalSettings::default();
    global.quiet_hours = QuietHours::from_hm((22, 0), (7, 0));
    h.hub.save_global_settings(&global).await.unwrap();

    let requested = local_ms(utc(), 2, 0) + DAY_MS;
    let scheduled = h
        .hub
        .schedule(bill_request(requested).with_type(TYPE_URGENT))
        .await
        .unwrap();

    assert_eq!(scheduled.fire_at_ms, requested);
    assert!(!scheduled.deferred_by_quiet_hours);
}

#[tokio::test]
async fn alarm_type_uses_the_native_path() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    let scheduled = h
        .hub
        .schedule(bill_request(at).with_type(TYPE_ALARM))
        .await
        .unwrap();

    assert_eq!(scheduled.path, DispatchPath::Native);
    assert_eq!(h.native.scheduled_ids(), vec![scheduled.notification_id]);
    assert!(h.scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn native_failure_falls_back_to_the_plugin() {
    let h = harness();
    h.native.set_failing(true);
    let at = h.clock.now_ms() + HOUR_MS;

    let scheduled = h
        .hub
        .schedule(bill_request(at).with_type(TYPE_ALARM))
        .await
        .unwrap();

    assert_eq!(scheduled.path, DispatchPath::OsPlugin);
    let sent = h.scheduler.scheduled();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel_key, "alarms");
    assert!(sent[0].full_screen_intent);
}

#[tokio::test]
async fn both_paths_failing_reports_both_reasons() {
    let h = harness();
    h.native.set_failing(true);
    h.scheduler.set_failing(true);
    let at = h.clock.now_ms() + HOUR_MS;

    let err = h
        .hub
        .schedule(bill_request(at).with_type(TYPE_ALARM))
        .await
        .unwrap_err();

    match err {
        NotificationError::DeliveryFailed { native, plugin } => {
            assert!(native.unwrap().contains("exact alarm permission denied"));
            assert!(plugin.contains("plugin unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let failed = h
        .history
        .list(&LogQuery::default().with_events([LogEvent::Failed]))
        .unwrap();
    assert_eq!(failed[0].reason_code(), Some("delivery_failed"));
    assert!(h.hub.get_all_scheduled_notifications().await.is_empty());
}

#[tokio::test]
async fn explicit_ids_replace_their_backup_counterpart() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;

    h.hub
        .schedule(bill_request(at).with_notification_id(12_345))
        .await
        .unwrap();

    let cancelled = h.scheduler.cancelled();
    assert!(cancelled.contains(&12_345));
    assert!(cancelled.contains(&(12_345 + BACKUP_ID_OFFSET)));
    assert!(h.native.cancelled().contains(&(12_345 + BACKUP_ID_OFFSET)));

    let err = h
        .hub
        .schedule(bill_request(at).with_notification_id(-4))
        .await
        .unwrap_err();
    assert_eq!(err, NotificationError::InvalidNotificationId(-4));
}

#[tokio::test]
async fn custom_types_shape_the_plugin_request() {
    let h = harness();
    let bill_due = NotificationTypeDef::new("bill_due", "Bill due").with_defaults(DeliveryOverride {
        channel_key: Some("bills".to_string()),
        sound_key: Some("coins".to_string()),
        ..DeliveryOverride::default()
    });
    h.hub.save_custom_type(&bill_due).await.unwrap();
    let at = h.clock.now_ms() + HOUR_MS;

    h.hub
        .schedule(bill_request(at).with_type("bill_due"))
        .await
        .unwrap();

    let sent = h.scheduler.scheduled();
    assert_eq!(sent[0].channel_key, "bills");
    assert_eq!(sent[0].sound_key, "coins");
    assert!(sent[0].payload.contains("type:bill_due"));
    assert!(h
        .hub
        .notification_types()
        .await
        .iter()
        .any(|registered| registered.def.id == "bill_due"));
}

#[tokio::test]
async fn module_default_channel_reaches_plain_reminders() {
    let h = harness();
    let module = ModuleSettings {
        default_channel_key: Some("bills".to_string()),
        ..ModuleSettings::default()
    };
    h.hub.save_module_settings("finance", &module).await.unwrap();

    h.hub
        .schedule(bill_request(h.clock.now_ms() + HOUR_MS))
        .await
        .unwrap();

    let sent = h.scheduler.scheduled();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel_key, "bills");
}

#[tokio::test]
async fn failed_reschedule_does_not_hide_the_next_scheduled_entry() {
    let h = harness();
    let at = h.clock.now_ms() + HOUR_MS;
    h.hub.schedule(bill_request(at)).await.unwrap();
    assert_eq!(events(&h, LogEvent::Scheduled), 1);

    h.scheduler.set_failing(true);
    assert!(h.hub.schedule(bill_request(at)).await.is_err());
    assert_eq!(events(&h, LogEvent::Failed), 1);

    h.scheduler.set_failing(false);
    h.hub.schedule(bill_request(at)).await.unwrap();
    assert_eq!(events(&h, LogEvent::Scheduled), 2);
}
