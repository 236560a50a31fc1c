#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};
use remindhub_core::model::payload::NotificationPayload;
use remindhub_core::platform::{
    Clock, NativeAlarmRequest, NativeAlarmService, NotificationScheduler, PendingNotification,
    PlatformError, PlatformResult, PluginNotificationRequest, ReminderDefinition,
    ReminderDefinitionSource,
};
use remindhub_core::{
    HubConfig, MemoryKeyValueStore, NotificationAdapter, NotificationHub,
    SqliteNotificationLogRepository,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// OS plugin double: keeps a pending list and records every call.
#[derive(Default)]
pub struct RecordingScheduler {
    pending: Mutex<BTreeMap<i32, PendingNotification>>,
    scheduled: Mutex<Vec<PluginNotificationRequest>>,
    cancelled: Mutex<Vec<i32>>,
    fail_schedule: AtomicBool,
}

impl RecordingScheduler {
    pub fn set_failing(&self, failing: bool) {
        self.fail_schedule.store(failing, Ordering::SeqCst);
    }

    pub fn pending_ids(&self) -> Vec<i32> {
        self.pending.lock().unwrap().keys().copied().collect()
    }

    pub fn scheduled(&self) -> Vec<PluginNotificationRequest> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Simulates the OS dropping a pending notification.
    pub fn evict(&self, id: i32) {
        self.pending.lock().unwrap().remove(&id);
    }

    /// Adds a pending entry the engine never scheduled.
    pub fn inject(&self, pending: PendingNotification) {
        self.pending.lock().unwrap().insert(pending.id, pending);
    }
}

#[async_trait]
impl NotificationScheduler for RecordingScheduler {
    async fn schedule_at(&self, request: &PluginNotificationRequest) -> PlatformResult<()> {
        if self.fail_schedule.load(Ordering::SeqCst) {
            return Err(PlatformError::new("schedule_at", "plugin unavailable"));
        }
        self.scheduled.lock().unwrap().push(request.clone());
        self.pending.lock().unwrap().insert(
            request.id,
            PendingNotification {
                id: request.id,
                title: request.title.clone(),
                body: request.body.clone(),
                payload: Some(request.payload.clone()),
            },
        );
        Ok(())
    }

    async fn cancel(&self, id: i32) -> PlatformResult<()> {
        self.cancelled.lock().unwrap().push(id);
        self.pending.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_pending(&self) -> PlatformResult<Vec<PendingNotification>> {
        Ok(self.pending.lock().unwrap().values().cloned().collect())
    }
}

/// Native alarm double.
#[derive(Default)]
pub struct RecordingNativeService {
    scheduled: Mutex<BTreeMap<i32, NativeAlarmRequest>>,
    cancelled: Mutex<Vec<i32>>,
    fail_schedule: AtomicBool,
}

impl RecordingNativeService {
    pub fn set_failing(&self, failing: bool) {
        self.fail_schedule.store(failing, Ordering::SeqCst);
    }

    pub fn scheduled_ids(&self) -> Vec<i32> {
        self.scheduled.lock().unwrap().keys().copied().collect()
    }

    pub fn request(&self, id: i32) -> Option<NativeAlarmRequest> {
        self.scheduled.lock().unwrap().get(&id).cloned()
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl NativeAlarmService for RecordingNativeService {
    async fn schedule_one_shot(&self, request: &NativeAlarmRequest) -> PlatformResult<()> {
        if self.fail_schedule.load(Ordering::SeqCst) {
            return Err(PlatformError::new(
                "schedule_one_shot",
                "exact alarm permission denied",
            ));
        }
        self.scheduled
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn cancel(&self, id: i32) -> PlatformResult<()> {
        self.cancelled.lock().unwrap().push(id);
        self.scheduled.lock().unwrap().remove(&id);
        Ok(())
    }
}

/// Settable clock with a fixed offset.
pub struct ManualClock {
    now_ms: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now_ms: i64, offset: FixedOffset) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
            offset,
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.now_ms.fetch_add(minutes * 60_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Adapter double with fixed answers.
pub struct StubAdapter {
    module_id: String,
    tap_result: bool,
    action_result: bool,
    pub taps: AtomicUsize,
    pub actions: Mutex<Vec<String>>,
    pub deletes: AtomicUsize,
}

impl StubAdapter {
    pub fn new(module_id: &str, tap_result: bool, action_result: bool) -> Self {
        Self {
            module_id: module_id.to_string(),
            tap_result,
            action_result,
            taps: AtomicUsize::new(0),
            actions: Mutex::new(Vec::new()),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NotificationAdapter for StubAdapter {
    fn module_id(&self) -> &str {
        &self.module_id
    }

    async fn on_tap(&self, _payload: &NotificationPayload) -> bool {
        self.taps.fetch_add(1, Ordering::SeqCst);
        self.tap_result
    }

    async fn on_action(
        &self,
        action_id: &str,
        _payload: &NotificationPayload,
        _notification_id: Option<i32>,
    ) -> bool {
        self.actions.lock().unwrap().push(action_id.to_string());
        self.action_result
    }

    async fn on_deleted(&self, _payload: &NotificationPayload, _notification_id: Option<i32>) {
        self.deletes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct StaticDefinitions(pub Vec<ReminderDefinition>);

#[async_trait]
impl ReminderDefinitionSource for StaticDefinitions {
    async fn definitions(&self) -> PlatformResult<Vec<ReminderDefinition>> {
        Ok(self.0.clone())
    }
}

pub struct Harness {
    pub hub: NotificationHub,
    pub scheduler: Arc<RecordingScheduler>,
    pub native: Arc<RecordingNativeService>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryKeyValueStore>,
    pub history: Arc<SqliteNotificationLogRepository>,
}

/// 2024-06-03 in the given offset.
pub fn local_ms(offset: FixedOffset, hour: u32, minute: u32) -> i64 {
    offset
        .with_ymd_and_hms(2024, 6, 3, hour, minute, 0)
        .single()
        .unwrap()
        .timestamp_millis()
}

pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

/// Hub over recording doubles with the clock at 2024-06-03 12:00 UTC.
pub fn harness() -> Harness {
    harness_with(utc(), HubConfig::default(), None)
}

pub fn harness_with(
    offset: FixedOffset,
    config: HubConfig,
    definitions: Option<Arc<dyn ReminderDefinitionSource>>,
) -> Harness {
    let scheduler = Arc::new(RecordingScheduler::default());
    let native = Arc::new(RecordingNativeService::default());
    let clock = Arc::new(ManualClock::new(local_ms(offset, 12, 0), offset));
    let store = Arc::new(MemoryKeyValueStore::new());
    let history = Arc::new(SqliteNotificationLogRepository::open_in_memory().unwrap());

    let mut builder = NotificationHub::builder(
        scheduler.clone(),
        native.clone(),
        store.clone(),
        history.clone(),
    )
    .config(config)
    .clock(clock.clone());
    if let Some(definitions) = definitions {
        builder = builder.definitions(definitions);
    }

    Harness {
        hub: builder.build().unwrap(),
        scheduler,
        native,
        clock,
        store,
        history,
    }
}
