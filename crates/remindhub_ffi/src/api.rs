//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Keep the payload codec and ID derivation identical on both sides of
//!   the bridge by routing Dart through the core implementations.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures are reported through envelope `ok/message` fields.

use chrono::FixedOffset;
use log::warn;
use remindhub_core::engine::ids::{local_day, with_counterparts};
use remindhub_core::engine::quiet_hours::{QuietHoursDecision, QuietHoursPolicy, QuietHoursState};
use remindhub_core::model::settings::QuietHours;
use remindhub_core::registry::module_registry::ModuleRegistry;
use remindhub_core::{
    compact_scheduled, core_version as core_version_inner, derive_notification_id as derive_inner,
    init_logging as init_logging_inner, ping as ping_inner, Fingerprint, LogEntry, LogQuery,
    ModuleDescriptor, NotificationLogRepository, NotificationPayload,
    SqliteNotificationLogRepository,
};
use std::path::PathBuf;
use std::sync::OnceLock;

const HISTORY_DEFAULT_LIMIT: u32 = 50;
const HISTORY_LIMIT_MAX: u32 = 500;
const HISTORY_DB_FILE_NAME: &str = "remindhub_history.sqlite3";
static HISTORY_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// One `key:value` extra carried in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadExtra {
    pub key: String,
    pub value: String,
}

/// Parsed payload envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadResponse {
    pub ok: bool,
    pub module_id: String,
    pub entity_id: String,
    pub reminder_type: String,
    pub reminder_value: i64,
    pub reminder_unit: String,
    /// Sorted by key.
    pub extras: Vec<PayloadExtra>,
    pub message: String,
}

/// Parses an OS callback payload string.
///
/// # FFI contract
/// - Sync call, pure.
/// - `ok=false` with a message when module or entity is missing.
#[flutter_rust_bridge::frb(sync)]
pub fn payload_parse(raw: String) -> PayloadResponse {
    match NotificationPayload::parse(&raw) {
        Ok(payload) => PayloadResponse {
            ok: true,
            extras: payload
                .extras
                .iter()
                .map(|(key, value)| PayloadExtra {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            module_id: payload.module_id,
            entity_id: payload.entity_id,
            reminder_type: payload.reminder_type,
            reminder_value: payload.reminder_value,
            reminder_unit: payload.reminder_unit,
            message: String::new(),
        },
        Err(err) => PayloadResponse {
            ok: false,
            module_id: String::new(),
            entity_id: String::new(),
            reminder_type: String::new(),
            reminder_value: 0,
            reminder_unit: String::new(),
            extras: Vec::new(),
            message: format!("payload_parse failed: {err}"),
        },
    }
}

/// Serializes payload fields into the wire string.
#[flutter_rust_bridge::frb(sync)]
pub fn payload_serialize(
    module_id: String,
    entity_id: String,
    reminder_type: String,
    reminder_value: i64,
    reminder_unit: String,
    extras: Vec<PayloadExtra>,
) -> String {
    let mut payload = NotificationPayload::new(module_id, entity_id).with_reminder(
        reminder_type,
        reminder_value,
        reminder_unit,
    );
    for extra in extras {
        payload = payload.with_extra(extra.key, extra.value);
    }
    payload.serialize()
}

/// Derived ID envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIdResponse {
    pub ok: bool,
    pub notification_id: Option<i32>,
    /// The ID followed by its backup counterparts.
    pub cancel_ids: Vec<i32>,
    pub message: String,
}

/// Derives the stable notification ID for a reminder fingerprint.
///
/// Input semantics:
/// - `day_epoch_ms`: set for once-per-day reminders; the local day of this
///   instant (at `utc_offset_minutes`) joins the fingerprint.
/// - Unknown modules hash over the full 31-bit space.
#[flutter_rust_bridge::frb(sync)]
pub fn derive_notification_id(
    module_id: String,
    entity_id: String,
    reminder_type: String,
    reminder_value: i64,
    reminder_unit: String,
    day_epoch_ms: Option<i64>,
    utc_offset_minutes: i32,
) -> NotificationIdResponse {
    let registry = match ModuleRegistry::with_builtin() {
        Ok(registry) => registry,
        Err(err) => return NotificationIdResponse::failure(format!("module registry: {err}")),
    };
    let day = match day_epoch_ms {
        Some(at_ms) => {
            let Some(offset) = offset_from_minutes(utc_offset_minutes) else {
                return NotificationIdResponse::failure(format!(
                    "utc_offset_minutes out of range: {utc_offset_minutes}"
                ));
            };
            match local_day(at_ms, offset) {
                Some(day) => Some(day),
                None => {
                    return NotificationIdResponse::failure(format!(
                        "day_epoch_ms out of range: {at_ms}"
                    ))
                }
            }
        }
        None => None,
    };

    let fingerprint = Fingerprint {
        module_id: module_id.trim().to_string(),
        entity_id,
        reminder_type,
        reminder_value,
        reminder_unit,
        day,
    };
    let rangeless;
    let module = match registry.get(&fingerprint.module_id) {
        Some(module) => module,
        None => {
            rangeless = ModuleDescriptor::new(fingerprint.module_id.as_str(), "unregistered", 0, 0);
            &rangeless
        }
    };
    let id = derive_inner(module, &fingerprint);
    NotificationIdResponse {
        ok: true,
        notification_id: Some(id),
        cancel_ids: with_counterparts(id),
        message: String::new(),
    }
}

impl NotificationIdResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            notification_id: None,
            cancel_ids: Vec::new(),
            message: message.into(),
        }
    }
}

/// Quiet-hours preview for settings UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietHoursPreview {
    pub ok: bool,
    /// `outside|inside_allowed|inside_blocked`.
    pub state: String,
    /// Fire time after deferral; `None` when blocked.
    pub fire_at_ms: Option<i64>,
    pub deferred: bool,
    pub message: String,
}

/// Shows where a fire time would land under a quiet-hours window.
#[flutter_rust_bridge::frb(sync)]
pub fn preview_quiet_hours(
    start_minute: u32,
    end_minute: u32,
    at_epoch_ms: i64,
    utc_offset_minutes: i32,
    allowed: bool,
) -> QuietHoursPreview {
    let Some(offset) = offset_from_minutes(utc_offset_minutes) else {
        return QuietHoursPreview {
            ok: false,
            state: String::new(),
            fire_at_ms: None,
            deferred: false,
            message: format!("utc_offset_minutes out of range: {utc_offset_minutes}"),
        };
    };
    let window = QuietHours::new(start_minute, end_minute);
    let policy = QuietHoursPolicy::default();
    let state = match policy.classify(&window, at_epoch_ms, offset, allowed) {
        QuietHoursState::Outside => "outside",
        QuietHoursState::InsideAllowed => "inside_allowed",
        QuietHoursState::InsideBlocked => "inside_blocked",
    };
    let decision = policy.apply(&window, at_epoch_ms, offset, allowed);
    QuietHoursPreview {
        ok: true,
        state: state.to_string(),
        fire_at_ms: decision.fire_at_ms(),
        deferred: matches!(decision, QuietHoursDecision::Deferred(_)),
        message: String::new(),
    }
}

/// One audit log row for history screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub id: String,
    pub module_id: String,
    pub entity_id: String,
    pub notification_id: Option<i32>,
    pub event: String,
    pub title: String,
    pub body: String,
    pub action_id: Option<String>,
    /// JSON object text.
    pub metadata_json: String,
    pub timestamp_ms: i64,
}

/// History list envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryListResponse {
    pub items: Vec<HistoryItem>,
    pub message: String,
    pub applied_limit: u32,
}

/// Generic action envelope for history maintenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryActionResponse {
    pub ok: bool,
    pub affected: u64,
    pub message: String,
}

/// Lists audit entries newest first.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Limit defaults to 50 and is capped at 500.
#[flutter_rust_bridge::frb(sync)]
pub fn history_list(module_id: Option<String>, limit: Option<u32>) -> HistoryListResponse {
    let applied_limit = normalize_history_limit(limit);
    let query = LogQuery {
        module_id: module_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        limit: Some(applied_limit),
        ..LogQuery::default()
    };
    match with_history_repo(|repo| repo.list(&query)) {
        Ok(entries) => {
            let items: Vec<HistoryItem> = entries.into_iter().map(to_history_item).collect();
            let message = if items.is_empty() {
                "No history.".to_string()
            } else {
                format!("Found {} entr(ies).", items.len())
            };
            HistoryListResponse {
                items,
                message,
                applied_limit,
            }
        }
        Err(err) => {
            warn!("event=history_list module=ffi status=error error={}", err);
            HistoryListResponse {
                items: Vec::new(),
                message: format!("history_list failed: {err}"),
                applied_limit,
            }
        }
    }
}

/// Deletes every audit entry.
#[flutter_rust_bridge::frb(sync)]
pub fn history_clear() -> HistoryActionResponse {
    history_action("history_clear", |repo| repo.clear())
}

/// Keeps only the newest `scheduled` entry per notification.
#[flutter_rust_bridge::frb(sync)]
pub fn history_compact() -> HistoryActionResponse {
    history_action("history_compact", |repo| compact_scheduled(repo))
}

fn history_action(
    operation: &str,
    f: impl FnOnce(&SqliteNotificationLogRepository) -> remindhub_core::RepoResult<usize>,
) -> HistoryActionResponse {
    match with_history_repo(f) {
        Ok(affected) => HistoryActionResponse {
            ok: true,
            affected: affected as u64,
            message: format!("Removed {affected} entr(ies)."),
        },
        Err(err) => {
            warn!("event={} module=ffi status=error error={}", operation, err);
            HistoryActionResponse {
                ok: false,
                affected: 0,
                message: format!("{operation} failed: {err}"),
            }
        }
    }
}

fn normalize_history_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => HISTORY_DEFAULT_LIMIT,
        Some(value) => value.min(HISTORY_LIMIT_MAX),
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

fn resolve_history_db_path() -> PathBuf {
    HISTORY_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("REMINDHUB_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(HISTORY_DB_FILE_NAME)
        })
        .clone()
}

fn with_history_repo<T>(
    f: impl FnOnce(&SqliteNotificationLogRepository) -> remindhub_core::RepoResult<T>,
) -> Result<T, String> {
    let repo = SqliteNotificationLogRepository::open(resolve_history_db_path())
        .map_err(|err| format!("history DB open failed: {err}"))?;
    f(&repo).map_err(|err| err.to_string())
}

fn to_history_item(entry: LogEntry) -> HistoryItem {
    HistoryItem {
        id: entry.id,
        module_id: entry.module_id,
        entity_id: entry.entity_id,
        notification_id: entry.notification_id,
        event: entry.event.as_str().to_string(),
        title: entry.title,
        body: entry.body,
        action_id: entry.action_id,
        metadata_json: serde_json::to_string(&entry.metadata)
            .unwrap_or_else(|_| "{}".to_string()),
        timestamp_ms: entry.timestamp_ms,
    }
}
