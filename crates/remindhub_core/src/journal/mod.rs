//! Pending-state journal for dispatched notifications.
//!
//! # Responsibility
//! - Persist one `TrackedEntry` per `(path, id)` for everything dispatched.
//! - Serve lookups for snooze parity, diagnostics and reconciliation.
//!
//! # Invariants
//! - Read-modify-write sequences hold the write lock for their whole span.
//! - Unreadable journal data degrades to an empty journal with a warning.
//! - Entries are sorted by `(path, id)` when persisted.

use crate::model::tracked::{DispatchPath, TrackedEntry};
use crate::platform::{KeyValueStore, PlatformError, PlatformResult};
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const KEY_JOURNAL: &str = "journal.pending";

type EntryMap = BTreeMap<(DispatchPath, i32), TrackedEntry>;

/// Journal of pending notifications across both dispatch paths.
pub struct PendingStateJournal {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl PendingStateJournal {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Inserts or overwrites the entry for `(entry.path, entry.id)`.
    pub async fn record(&self, entry: TrackedEntry) -> PlatformResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        entries.insert((entry.path, entry.id), entry);
        self.persist(&entries).await
    }

    pub async fn get(&self, path: DispatchPath, id: i32) -> Option<TrackedEntry> {
        self.load().await.remove(&(path, id))
    }

    /// Entry for `id` on either path, native first.
    pub async fn find(&self, id: i32) -> Option<TrackedEntry> {
        let mut entries = self.load().await;
        entries
            .remove(&(DispatchPath::Native, id))
            .or_else(|| entries.remove(&(DispatchPath::OsPlugin, id)))
    }

    /// Removes every entry whose id is in `ids`, on both paths.
    ///
    /// Returns the number of removed entries.
    pub async fn remove_ids(&self, ids: &[i32]) -> PlatformResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let before = entries.len();
        entries.retain(|(_, id), _| !ids.contains(id));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    pub async fn remove(&self, path: DispatchPath, id: i32) -> PlatformResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        if entries.remove(&(path, id)).is_none() {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    /// All entries sorted by `(path, id)`.
    pub async fn entries(&self) -> Vec<TrackedEntry> {
        self.load().await.into_values().collect()
    }

    /// Stamps the entry as delivered; returns false when it is unknown.
    pub async fn mark_delivered(
        &self,
        path: DispatchPath,
        id: i32,
        at_ms: i64,
    ) -> PlatformResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let Some(entry) = entries.get_mut(&(path, id)) else {
            return Ok(false);
        };
        entry.delivered_at_ms = Some(at_ms);
        self.persist(&entries).await?;
        Ok(true)
    }

    /// Drops entries whose retention window has lapsed and returns the rest.
    ///
    /// Past and delivered entries inside the window are kept for snooze.
    pub async fn entries_pruned(&self, now_ms: i64, retention_ms: i64) -> Vec<TrackedEntry> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now_ms, retention_ms));
        if entries.len() != before {
            if let Err(err) = self.persist(&entries).await {
                warn!(
                    "event=journal_prune module=journal status=error pruned={} error={}",
                    before - entries.len(),
                    err
                );
            }
        }
        entries.into_values().collect()
    }

    /// Pruned entries that have not fired yet.
    pub async fn pending_entries(&self, now_ms: i64, retention_ms: i64) -> Vec<TrackedEntry> {
        self.entries_pruned(now_ms, retention_ms)
            .await
            .into_iter()
            .filter(|entry| entry.is_pending(now_ms))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.load().await.is_empty()
    }

    async fn load(&self) -> EntryMap {
        let raw = match self.store.get(KEY_JOURNAL).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return EntryMap::new(),
            Err(err) => {
                warn!(
                    "event=journal_load module=journal status=error error_code=store_read_failed error={}",
                    err
                );
                return EntryMap::new();
            }
        };
        match serde_json::from_str::<Vec<TrackedEntry>>(&raw) {
            Ok(list) => list
                .into_iter()
                .map(|entry| ((entry.path, entry.id), entry))
                .collect(),
            Err(err) => {
                warn!(
                    "event=journal_load module=journal status=error error_code=journal_corrupt error={}",
                    err
                );
                EntryMap::new()
            }
        }
    }

    async fn persist(&self, entries: &EntryMap) -> PlatformResult<()> {
        if entries.is_empty() {
            return self.store.remove(KEY_JOURNAL).await;
        }
        let list: Vec<&TrackedEntry> = entries.values().collect();
        let raw = serde_json::to_string(&list)
            .map_err(|err| PlatformError::new("journal_encode", err.to_string()))?;
        self.store.set(KEY_JOURNAL, &raw).await
    }
}
