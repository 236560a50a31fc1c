//! Audit log repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append lifecycle events and list them with filters.
//! - Provide the aggregates behind the dashboard and history compaction.
//!
//! # Invariants
//! - Rows are never updated; removal is bulk delete by id only.
//! - Read paths reject rows with unknown event names instead of masking them.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::log_entry::{LogEntry, LogEvent, LogQuery};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Mutex;

const LOG_SELECT_SQL: &str = "SELECT
    id,
    module_id,
    entity_id,
    notification_id,
    title,
    body,
    payload,
    action_id,
    event,
    metadata,
    timestamp
FROM notification_log";

const MS_PER_SECOND: i64 = 1_000;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for audit log persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    LockPoisoned,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted log data: {message}"),
            Self::LockPoisoned => write!(f, "log repository lock poisoned"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::LockPoisoned => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Grouping key for [`NotificationLogRepository::count_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogGroup {
    Module,
    Event,
    /// Local calendar day for the given UTC offset.
    Day { offset_seconds: i32 },
}

/// Repository interface for the notification audit log.
pub trait NotificationLogRepository: Send + Sync {
    fn append(&self, entry: &LogEntry) -> RepoResult<()>;
    fn list(&self, query: &LogQuery) -> RepoResult<Vec<LogEntry>>;
    /// Newest `scheduled` entry recorded for one notification ID.
    fn latest_scheduled_by_notification(&self, notification_id: i32)
        -> RepoResult<Option<LogEntry>>;
    fn delete_by_ids(&self, ids: &[String]) -> RepoResult<usize>;
    fn clear(&self) -> RepoResult<usize>;
    /// Counts entries at or after `since_ms`, grouped by `group`.
    fn count_by(&self, group: LogGroup, since_ms: i64) -> RepoResult<Vec<(String, u64)>>;
}

/// SQLite-backed audit log repository.
pub struct SqliteNotificationLogRepository {
    conn: Mutex<Connection>,
}

impl SqliteNotificationLogRepository {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self.conn.lock().map_err(|_| RepoError::LockPoisoned)?;
        f(&conn)
    }
}

impl NotificationLogRepository for SqliteNotificationLogRepository {
    fn append(&self, entry: &LogEntry) -> RepoResult<()> {
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|err| RepoError::InvalidData(format!("metadata is not serializable: {err}")))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_log (
                    id,
                    module_id,
                    entity_id,
                    notification_id,
                    title,
                    body,
                    payload,
                    action_id,
                    event,
                    metadata,
                    timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    entry.id.as_str(),
                    entry.module_id.as_str(),
                    entry.entity_id.as_str(),
                    entry.notification_id,
                    entry.title.as_str(),
                    entry.body.as_str(),
                    entry.payload.as_deref(),
                    entry.action_id.as_deref(),
                    entry.event.as_str(),
                    metadata,
                    entry.timestamp_ms,
                ],
            )?;
            Ok(())
        })
    }

    fn list(&self, query: &LogQuery) -> RepoResult<Vec<LogEntry>> {
        let mut sql = format!("{LOG_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(module_id) = &query.module_id {
            sql.push_str(" AND module_id = ?");
            bind_values.push(Value::Text(module_id.clone()));
        }
        if let Some(entity_id) = &query.entity_id {
            sql.push_str(" AND entity_id = ?");
            bind_values.push(Value::Text(entity_id.clone()));
        }
        if let Some(notification_id) = query.notification_id {
            sql.push_str(" AND notification_id = ?");
            bind_values.push(Value::Integer(i64::from(notification_id)));
        }
        if !query.events.is_empty() {
            let placeholders = vec!["?"; query.events.len()].join(", ");
            sql.push_str(&format!(" AND event IN ({placeholders})"));
            for event in &query.events {
                bind_values.push(Value::Text(event.as_str().to_string()));
            }
        }
        if let Some(since_ms) = query.since_ms {
            sql.push_str(" AND timestamp >= ?");
            bind_values.push(Value::Integer(since_ms));
        }
        if let Some(until_ms) = query.until_ms {
            sql.push_str(" AND timestamp < ?");
            bind_values.push(Value::Integer(until_ms));
        }

        sql.push_str(" ORDER BY timestamp DESC, rowid DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(parse_log_row(row)?);
            }
            Ok(entries)
        })
    }

    fn latest_scheduled_by_notification(
        &self,
        notification_id: i32,
    ) -> RepoResult<Option<LogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{LOG_SELECT_SQL}
                 WHERE notification_id = ?1 AND event = ?2
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT 1;"
            ))?;
            let mut rows = stmt.query(params![
                notification_id,
                LogEvent::Scheduled.as_str()
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_log_row(row)?)),
                None => Ok(None),
            }
        })
    }

    fn delete_by_ids(&self, ids: &[String]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM notification_log WHERE id = ?1;")?;
                for id in ids {
                    deleted += stmt.execute([id.as_str()])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    fn clear(&self) -> RepoResult<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM notification_log;", [])?))
    }

    fn count_by(&self, group: LogGroup, since_ms: i64) -> RepoResult<Vec<(String, u64)>> {
        let (key_sql, bind_values) = match group {
            LogGroup::Module => ("module_id".to_string(), vec![Value::Integer(since_ms)]),
            LogGroup::Event => ("event".to_string(), vec![Value::Integer(since_ms)]),
            LogGroup::Day { offset_seconds } => (
                "strftime('%Y-%m-%d', (timestamp / ?) + ?, 'unixepoch')".to_string(),
                vec![
                    Value::Integer(MS_PER_SECOND),
                    Value::Integer(i64::from(offset_seconds)),
                    Value::Integer(since_ms),
                ],
            ),
        };
        let sql = format!(
            "SELECT {key_sql} AS group_key, COUNT(*) AS total
             FROM notification_log
             WHERE timestamp >= ?
             GROUP BY group_key
             ORDER BY group_key ASC;"
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut counts = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get("group_key")?;
                let total: i64 = row.get("total")?;
                counts.push((key, u64::try_from(total).unwrap_or(0)));
            }
            Ok(counts)
        })
    }
}

/// Dedup key for `scheduled` compaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CompactionKey {
    Notification(i32),
    Entity(String, String),
}

impl CompactionKey {
    fn of(entry: &LogEntry) -> Self {
        match entry.notification_id {
            Some(id) => Self::Notification(id),
            None => Self::Entity(entry.module_id.clone(), entry.entity_id.clone()),
        }
    }
}

/// Keeps only the newest `scheduled` entry per notification ID.
///
/// Entries without an ID are grouped by module and entity. Returns the
/// number of deleted rows.
pub fn compact_scheduled(repo: &dyn NotificationLogRepository) -> RepoResult<usize> {
    let query = LogQuery::default().with_events([LogEvent::Scheduled]);
    let mut seen = HashSet::new();
    let redundant: Vec<String> = repo
        .list(&query)?
        .into_iter()
        .filter(|entry| !seen.insert(CompactionKey::of(entry)))
        .map(|entry| entry.id)
        .collect();
    if redundant.is_empty() {
        return Ok(0);
    }
    repo.delete_by_ids(&redundant)
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<LogEntry> {
    let event_text: String = row.get("event")?;
    let event = LogEvent::parse(&event_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid event `{event_text}` in notification_log.event"
        ))
    })?;

    let metadata_text: String = row.get("metadata")?;
    let metadata: serde_json::Value = serde_json::from_str(&metadata_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid metadata json in notification_log: {err}"))
    })?;
    if !metadata.is_object() {
        return Err(RepoError::InvalidData(
            "notification_log.metadata is not a JSON object".to_string(),
        ));
    }

    let notification_id = match row.get::<_, Option<i64>>("notification_id")? {
        Some(value) => Some(i32::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!(
                "notification id `{value}` out of range in notification_log"
            ))
        })?),
        None => None,
    };

    Ok(LogEntry {
        id: row.get("id")?,
        module_id: row.get("module_id")?,
        entity_id: row.get("entity_id")?,
        notification_id,
        title: row.get("title")?,
        body: row.get("body")?,
        payload: row.get("payload")?,
        action_id: row.get("action_id")?,
        event,
        metadata,
        timestamp_ms: row.get("timestamp")?,
    })
}
