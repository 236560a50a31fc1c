//! Notification hub: the orchestration entry point for producers and UI.
//!
//! # Responsibility
//! - Own every registry, store and cache the engine needs.
//! - Run the schedule pipeline: gates, settings, ID, delivery config, time
//!   check, quiet hours, idempotent replace, dispatch, journal, audit log.
//!
//! # Invariants
//! - Public operations never panic and never surface plumbing errors.
//! - Gate failures are never written to the audit log.
//! - Std mutexes guarding in-memory state are never held across `.await`.
//! - A `scheduled` audit entry is written only when the fire time for an
//!   ID differs from the last one seen in this process.

mod callbacks;
mod cancel;
mod diagnostics;
mod history;
mod snooze;

pub use diagnostics::{ProjectionSource, ReconcileReport, ScheduledProjection};

use crate::engine::dispatch::{DispatchOrder, Dispatcher};
use crate::engine::ids::{derive_notification_id, with_counterparts, Fingerprint};
use crate::engine::quiet_hours::{QuietHoursDecision, QuietHoursPolicy};
use crate::engine::resolver::{ResolvedSource, SourceResolver};
use crate::error::{NotificationError, NotificationResult};
use crate::journal::PendingStateJournal;
use crate::model::delivery::NotificationTypeDef;
use crate::model::log_entry::{LogEntry, LogEvent, METADATA_REASON_CODE};
use crate::model::module::{builtin_modules, ModuleDescriptor};
use crate::model::payload::NotificationPayload;
use crate::model::request::{ScheduleRequest, ScheduledNotification};
use crate::model::settings::{EffectiveSettings, GlobalSettings, ModuleSettings};
use crate::model::tracked::DispatchPath;
use crate::platform::{
    Clock, KeyValueStore, NativeAlarmService, NotificationScheduler, PlatformResult,
    ReminderDefinitionSource, SystemClock,
};
use crate::registry::adapter_registry::{AdapterRegistry, AdapterRegistryError, NotificationAdapter};
use crate::registry::module_registry::{ModuleRegistry, ModuleRegistryError};
use crate::registry::type_registry::{RegisteredType, TypeRegistry};
use crate::repo::log_repo::NotificationLogRepository;
use crate::settings::SettingsStore;
use log::{error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

const MS_PER_MINUTE: i64 = 60_000;

/// Tunables for one hub instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Bound on waiting for a late adapter during tap/action handling.
    pub adapter_wait_timeout: Duration,
    pub quiet_hours_step_minutes: u32,
    pub quiet_hours_horizon_days: u32,
    /// Used when settings carry no snooze default.
    pub default_snooze_minutes: u32,
    /// Window covered by the dashboard summary.
    pub dashboard_days: u32,
    /// How long a fired or delivered journal entry stays available to snooze.
    pub journal_retention: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            adapter_wait_timeout: Duration::from_secs(3),
            quiet_hours_step_minutes: 15,
            quiet_hours_horizon_days: 7,
            default_snooze_minutes: 10,
            dashboard_days: 7,
            journal_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Builder for [`NotificationHub`].
pub struct NotificationHubBuilder {
    scheduler: Arc<dyn NotificationScheduler>,
    native: Arc<dyn NativeAlarmService>,
    store: Arc<dyn KeyValueStore>,
    history: Arc<dyn NotificationLogRepository>,
    modules: Vec<ModuleDescriptor>,
    config: HubConfig,
    clock: Arc<dyn Clock>,
    definitions: Option<Arc<dyn ReminderDefinitionSource>>,
}

impl NotificationHubBuilder {
    /// Replaces the built-in module set.
    pub fn modules(mut self, modules: Vec<ModuleDescriptor>) -> Self {
        self.modules = modules;
        self
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn definitions(mut self, definitions: Arc<dyn ReminderDefinitionSource>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn build(self) -> Result<NotificationHub, ModuleRegistryError> {
        let modules = ModuleRegistry::new(self.modules)?;
        let quiet_hours = QuietHoursPolicy::new(
            self.config.quiet_hours_step_minutes,
            self.config.quiet_hours_horizon_days.saturating_mul(24 * 60),
        );
        Ok(NotificationHub {
            quiet_hours,
            modules,
            types: TypeRegistry::new(),
            adapters: AdapterRegistry::new(),
            settings: SettingsStore::new(Arc::clone(&self.store)),
            journal: PendingStateJournal::new(self.store),
            history: self.history,
            dispatcher: Dispatcher::new(self.scheduler, self.native),
            definitions: self.definitions,
            clock: self.clock,
            config: self.config,
            module_enabled: Mutex::new(BTreeMap::new()),
            scheduled_cache: Mutex::new(HashMap::new()),
            init: OnceCell::new(),
        })
    }
}

/// Where a failure happened, for the `failed` audit entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureContext {
    operation: &'static str,
    module_id: String,
    entity_id: String,
    notification_id: Option<i32>,
    title: String,
    body: String,
    payload: Option<String>,
    action_id: Option<String>,
}

impl FailureContext {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    fn from_payload(operation: &'static str, raw: &str, parsed: Option<&NotificationPayload>) -> Self {
        let mut context = Self::new(operation);
        context.payload = Some(raw.to_string());
        if let Some(parsed) = parsed {
            context.module_id = parsed.module_id.clone();
            context.entity_id = parsed.entity_id.clone();
        }
        context
    }

    fn with_notification_id(mut self, notification_id: Option<i32>) -> Self {
        self.notification_id = notification_id;
        self
    }

    fn with_content(mut self, title: &str, body: &str) -> Self {
        self.title = title.to_string();
        self.body = body.to_string();
        self
    }
}

/// Scheduling and delivery orchestration engine.
pub struct NotificationHub {
    config: HubConfig,
    quiet_hours: QuietHoursPolicy,
    modules: ModuleRegistry,
    types: TypeRegistry,
    adapters: AdapterRegistry,
    settings: SettingsStore,
    journal: PendingStateJournal,
    history: Arc<dyn NotificationLogRepository>,
    dispatcher: Dispatcher,
    definitions: Option<Arc<dyn ReminderDefinitionSource>>,
    clock: Arc<dyn Clock>,
    module_enabled: Mutex<BTreeMap<String, bool>>,
    /// Last logged fire time per notification ID.
    scheduled_cache: Mutex<HashMap<i32, i64>>,
    init: OnceCell<()>,
}

impl NotificationHub {
    /// Starts a builder with the built-in modules and default config.
    pub fn builder(
        scheduler: Arc<dyn NotificationScheduler>,
        native: Arc<dyn NativeAlarmService>,
        store: Arc<dyn KeyValueStore>,
        history: Arc<dyn NotificationLogRepository>,
    ) -> NotificationHubBuilder {
        NotificationHubBuilder {
            scheduler,
            native,
            store,
            history,
            modules: builtin_modules(),
            config: HubConfig::default(),
            clock: Arc::new(SystemClock),
            definitions: None,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// One-time setup; concurrent callers await the same in-flight run.
    pub async fn initialize(&self) {
        self.init
            .get_or_init(|| async {
                let persisted = self.settings.module_enabled_map().await;
                let enabled_count = persisted.len();
                if let Ok(mut enabled) = self.module_enabled.lock() {
                    for (module_id, value) in persisted {
                        enabled.entry(module_id).or_insert(value);
                    }
                }
                let pending = self
                    .journal
                    .pending_entries(self.clock.now_ms(), self.retention_ms())
                    .await
                    .len();
                info!(
                    "event=hub_init module=engine status=ok modules={} persisted_flags={} pending={}",
                    self.modules.len(),
                    enabled_count,
                    pending
                );
            })
            .await;
    }

    /// Hub-level enable state; unset modules use their descriptor default.
    pub async fn is_module_enabled(&self, module_id: &str) -> bool {
        self.initialize().await;
        match self.modules.get(module_id) {
            Some(module) => self.module_enabled_now(module),
            None => false,
        }
    }

    pub async fn set_module_enabled(
        &self,
        module_id: &str,
        enabled: bool,
    ) -> NotificationResult<()> {
        self.initialize().await;
        if !self.modules.contains(module_id) {
            return Err(NotificationError::ModuleNotRegistered(module_id.to_string()));
        }
        let snapshot = match self.module_enabled.lock() {
            Ok(mut flags) => {
                flags.insert(module_id.to_string(), enabled);
                flags.clone()
            }
            Err(_) => BTreeMap::from([(module_id.to_string(), enabled)]),
        };
        if let Err(err) = self.settings.save_module_enabled_map(&snapshot).await {
            error!(
                "event=module_enable module=engine status=error module_id={} error={}",
                module_id, err
            );
        } else {
            info!(
                "event=module_enable module=engine status=ok module_id={} enabled={}",
                module_id, enabled
            );
        }
        Ok(())
    }

    pub fn register_adapter(
        &self,
        adapter: Arc<dyn NotificationAdapter>,
    ) -> Result<(), AdapterRegistryError> {
        let module_id = adapter.module_id().trim().to_string();
        let types = adapter.notification_types();
        let type_count = types.len();
        let replaced = self.adapters.register(adapter)?;
        self.types.set_adapter_types(&module_id, types);
        info!(
            "event=adapter_register module=engine status=ok module_id={} types={} replaced={}",
            module_id,
            type_count,
            replaced.is_some()
        );
        Ok(())
    }

    pub fn unregister_adapter(&self, module_id: &str) -> bool {
        let removed = self.adapters.unregister(module_id);
        self.types.remove_adapter_types(module_id.trim());
        removed
    }

    pub async fn global_settings(&self) -> GlobalSettings {
        self.settings.global().await
    }

    pub async fn save_global_settings(&self, settings: &GlobalSettings) -> PlatformResult<()> {
        self.settings.save_global(settings).await
    }

    pub async fn module_settings(&self, module_id: &str) -> ModuleSettings {
        self.settings.module(module_id).await
    }

    pub async fn save_module_settings(
        &self,
        module_id: &str,
        settings: &ModuleSettings,
    ) -> PlatformResult<()> {
        self.settings.save_module(module_id, settings).await
    }

    pub async fn save_custom_type(&self, def: &NotificationTypeDef) -> PlatformResult<()> {
        self.settings.save_custom_type(def).await
    }

    pub async fn remove_custom_type(&self, type_id: &str) -> PlatformResult<bool> {
        self.settings.remove_custom_type(type_id).await
    }

    /// Built-in, adapter and custom types with their source.
    pub async fn notification_types(&self) -> Vec<RegisteredType> {
        let custom = self.settings.custom_types().await;
        self.types.list(&custom)
    }

    /// Attributes a bare notification ID to its module and entity.
    pub async fn resolve_source(
        &self,
        notification_id: i32,
        payload: Option<&str>,
    ) -> Option<ResolvedSource> {
        SourceResolver::new(&self.modules, self.definitions.as_ref())
            .resolve(notification_id, payload)
            .await
    }

    /// Schedules one reminder, replacing any live entry for the same ID.
    pub async fn schedule(
        &self,
        request: ScheduleRequest,
    ) -> NotificationResult<ScheduledNotification> {
        self.initialize().await;
        let (module, settings) = match self.check_gates(&request.module_id).await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.report_gate(&err, "schedule", &request.module_id);
                return Err(err);
            }
        };

        match self.schedule_with(&request, &module, &settings).await {
            Ok(scheduled) => {
                if self.should_log_scheduled(scheduled.notification_id, scheduled.fire_at_ms) {
                    let entry = LogEntry::new(
                        LogEvent::Scheduled,
                        &scheduled.module_id,
                        &scheduled.entity_id,
                        self.clock.now_ms(),
                    )
                    .with_notification_id(Some(scheduled.notification_id))
                    .with_content(&request.title, &request.body)
                    .with_payload(Some(request.payload().serialize()))
                    .with_meta("fire_at_ms", scheduled.fire_at_ms)
                    .with_meta("path", scheduled.path.as_str())
                    .with_meta("type_id", request.type_id.as_str())
                    .with_meta("deferred_by_quiet_hours", scheduled.deferred_by_quiet_hours);
                    self.append_log(entry);
                }
                info!(
                    "event=schedule module=engine status=ok module_id={} notification_id={} path={} deferred={}",
                    scheduled.module_id,
                    scheduled.notification_id,
                    scheduled.path.as_str(),
                    scheduled.deferred_by_quiet_hours
                );
                Ok(scheduled)
            }
            Err(err) => {
                let context = FailureContext {
                    operation: "schedule",
                    module_id: request.module_id.clone(),
                    entity_id: request.entity_id.clone(),
                    notification_id: request.notification_id,
                    title: request.title.clone(),
                    body: request.body.clone(),
                    payload: Some(request.payload().serialize()),
                    action_id: None,
                };
                self.record_failure(&err, context);
                Err(err)
            }
        }
    }

    /// Pipeline after the gates; writes nothing to the audit log.
    async fn schedule_with(
        &self,
        request: &ScheduleRequest,
        module: &ModuleDescriptor,
        settings: &EffectiveSettings,
    ) -> NotificationResult<ScheduledNotification> {
        let offset = self.clock.local_offset();
        let notification_id = match request.notification_id {
            Some(id) if id < 0 => return Err(NotificationError::InvalidNotificationId(id)),
            Some(id) => id,
            None => derive_notification_id(module, &Fingerprint::from_request(request, offset)),
        };

        let custom_types = self.settings.custom_types().await;
        let config = self.types.resolve(
            &module.id,
            &request.type_id,
            &custom_types,
            settings,
            &request.overrides,
        );

        let now_ms = self.clock.now_ms();
        if request.scheduled_at_ms < now_ms {
            return Err(NotificationError::ScheduleTimeInPast {
                scheduled_at_ms: request.scheduled_at_ms,
                now_ms,
            });
        }

        let allowed = config.bypass_quiet_hours || settings.allow_urgent_during_quiet_hours;
        let decision =
            self.quiet_hours
                .apply(&settings.quiet_hours, request.scheduled_at_ms, offset, allowed);
        let fire_at_ms = decision
            .fire_at_ms()
            .ok_or(NotificationError::QuietHoursBlocked {
                scheduled_at_ms: request.scheduled_at_ms,
            })?;

        let order = DispatchOrder {
            id: notification_id,
            module_id: module.id.clone(),
            entity_id: request.entity_id.clone(),
            type_id: request.type_id.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            fire_at_ms,
            config,
            priority: request.priority.unwrap_or_default(),
            icon: request.icon.clone(),
            action_buttons: request.action_buttons.clone(),
            special: request.special,
            payload: request.payload().serialize(),
        };
        let path = self
            .replace_and_dispatch(&order, order.preferred_path())
            .await?;

        Ok(ScheduledNotification {
            notification_id,
            module_id: module.id.clone(),
            entity_id: request.entity_id.clone(),
            fire_at_ms,
            path,
            deferred_by_quiet_hours: matches!(decision, QuietHoursDecision::Deferred(_)),
        })
    }

    /// Cancels the ID pair everywhere, dispatches, then journals the result.
    ///
    /// A failed dispatch leaves nothing live for the ID, so its dedup entry
    /// is dropped too.
    async fn replace_and_dispatch(
        &self,
        order: &DispatchOrder,
        path: DispatchPath,
    ) -> NotificationResult<DispatchPath> {
        let ids = with_counterparts(order.id);
        self.dispatcher.cancel_everywhere(&ids).await;
        if let Err(err) = self.journal.remove_ids(&ids).await {
            warn!(
                "event=journal_remove module=engine status=error notification_id={} error={}",
                order.id, err
            );
        }

        let used = match self.dispatcher.dispatch(order, path).await {
            Ok(used) => used,
            Err(err) => {
                self.forget_scheduled(&ids);
                return Err(err);
            }
        };
        let entry = order.tracked_entry(used, self.clock.now_ms());
        if let Err(err) = self.journal.record(entry).await {
            warn!(
                "event=journal_record module=engine status=error notification_id={} error={}",
                order.id, err
            );
        }
        Ok(used)
    }

    async fn check_gates(
        &self,
        module_id: &str,
    ) -> NotificationResult<(ModuleDescriptor, EffectiveSettings)> {
        let module = self
            .modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| NotificationError::ModuleNotRegistered(module_id.to_string()))?;
        if !self.module_enabled_now(&module) {
            return Err(NotificationError::ModuleDisabled(module.id));
        }
        let settings = self.effective_settings(module_id).await;
        if !settings.notifications_enabled_globally {
            return Err(NotificationError::NotificationsDisabledGlobally);
        }
        if !settings.notifications_enabled_for_module {
            return Err(NotificationError::NotificationsDisabledForModule(module.id));
        }
        Ok((module, settings))
    }

    async fn effective_settings(&self, module_id: &str) -> EffectiveSettings {
        let mut settings = self.settings.effective(module_id).await;
        if settings.default_snooze_minutes == 0 {
            settings.default_snooze_minutes = self.config.default_snooze_minutes.max(1);
        }
        settings
    }

    fn module_enabled_now(&self, module: &ModuleDescriptor) -> bool {
        self.module_enabled
            .lock()
            .ok()
            .and_then(|flags| flags.get(module.id.as_str()).copied())
            .unwrap_or(module.default_enabled)
    }

    fn derive_for_payload(&self, payload: &NotificationPayload) -> Option<i32> {
        self.modules
            .get(&payload.module_id)
            .map(|module| derive_notification_id(module, &Fingerprint::from_payload(payload)))
    }

    /// Returns whether `fire_at_ms` is new for `notification_id`, and
    /// remembers it.
    fn should_log_scheduled(&self, notification_id: i32, fire_at_ms: i64) -> bool {
        match self.scheduled_cache.lock() {
            Ok(mut cache) => cache.insert(notification_id, fire_at_ms) != Some(fire_at_ms),
            Err(_) => true,
        }
    }

    fn retention_ms(&self) -> i64 {
        i64::try_from(self.config.journal_retention.as_millis()).unwrap_or(i64::MAX)
    }

    fn forget_scheduled(&self, ids: &[i32]) {
        if let Ok(mut cache) = self.scheduled_cache.lock() {
            for id in ids {
                cache.remove(id);
            }
        }
    }

    fn append_log(&self, entry: LogEntry) {
        if let Err(err) = self.history.append(&entry) {
            error!(
                "event=audit_append module=engine status=error log_event={} error={}",
                entry.event.as_str(),
                err
            );
        }
    }

    fn report_gate(&self, err: &NotificationError, operation: &str, module_id: &str) {
        info!(
            "event={} module=engine status=skipped module_id={} reason_code={}",
            operation,
            module_id,
            err.reason_code()
        );
    }

    /// Logs a `failed` audit entry unless `err` is a gate failure.
    fn record_failure(&self, err: &NotificationError, context: FailureContext) {
        if err.is_gate_failure() {
            self.report_gate(err, context.operation, &context.module_id);
            return;
        }
        warn!(
            "event={} module=engine status=error module_id={} notification_id={} reason_code={}",
            context.operation,
            context.module_id,
            context
                .notification_id
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
            err.reason_code()
        );
        let mut entry = LogEntry::new(
            LogEvent::Failed,
            context.module_id,
            context.entity_id,
            self.clock.now_ms(),
        )
        .with_notification_id(context.notification_id)
        .with_content(context.title, context.body)
        .with_payload(context.payload)
        .with_meta(METADATA_REASON_CODE, err.reason_code())
        .with_meta("operation", context.operation)
        .with_meta("message", err.to_string());
        if let Some(action_id) = context.action_id {
            entry = entry.with_action_id(action_id);
        }
        self.append_log(entry);
    }
}
