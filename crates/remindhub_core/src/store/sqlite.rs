use super::{to_platform_error, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::platform::{KeyValueStore, PlatformResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Key-value store persisted in the `kv_entries` table.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&conn)?)
    }

    fn get_sync(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
    }

    fn set_sync(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at;",
                params![key, value],
            )
        })?;
        Ok(())
    }

    fn remove_sync(&self, key: &str) -> StoreResult<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1;", [key]))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<String>> {
        self.get_sync(key)
            .map_err(|err| to_platform_error("kv_get", err))
    }

    async fn set(&self, key: &str, value: &str) -> PlatformResult<()> {
        self.set_sync(key, value)
            .map_err(|err| to_platform_error("kv_set", err))
    }

    async fn remove(&self, key: &str) -> PlatformResult<()> {
        self.remove_sync(key)
            .map_err(|err| to_platform_error("kv_remove", err))
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteKeyValueStore;
    use crate::platform::KeyValueStore;

    #[tokio::test]
    async fn upsert_overwrites_value() {
        let store = SqliteKeyValueStore::open_in_memory().expect("store should open");
        store.set("settings.global", "{}").await.expect("first set");
        store
            .set("settings.global", r#"{"notifications_enabled":false}"#)
            .await
            .expect("second set");
        let value = store.get("settings.global").await.expect("get");
        assert_eq!(value.as_deref(), Some(r#"{"notifications_enabled":false}"#));

        store.remove("settings.global").await.expect("remove");
        assert_eq!(store.get("settings.global").await.expect("get"), None);
    }
}
