//! Audit log reads, compaction and the dashboard summary.

use super::NotificationHub;
use crate::model::log_entry::{DashboardSummary, LogEntry, LogQuery};
use crate::repo::log_repo::{compact_scheduled, LogGroup};
use log::{info, warn};
use std::collections::BTreeMap;

const MS_PER_DAY: i64 = 86_400_000;

impl NotificationHub {
    /// Audit entries matching `query`, newest first.
    pub async fn get_history(&self, query: &LogQuery) -> Vec<LogEntry> {
        self.initialize().await;
        match self.history.list(query) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("event=history_list module=engine status=error error={}", err);
                Vec::new()
            }
        }
    }

    /// Deletes every audit entry; returns the removed count.
    pub async fn clear_history(&self) -> usize {
        self.initialize().await;
        match self.history.clear() {
            Ok(removed) => {
                info!(
                    "event=history_clear module=engine status=ok removed={}",
                    removed
                );
                removed
            }
            Err(err) => {
                warn!("event=history_clear module=engine status=error error={}", err);
                0
            }
        }
    }

    /// Keeps only the newest `scheduled` entry per notification ID.
    ///
    /// Entries without an ID are grouped by module and entity.
    pub async fn compact_redundant_history_entries(&self) -> usize {
        self.initialize().await;
        match compact_scheduled(self.history.as_ref()) {
            Ok(removed) => {
                info!(
                    "event=history_compact module=engine status=ok removed={}",
                    removed
                );
                removed
            }
            Err(err) => {
                warn!("event=history_compact module=engine status=error error={}", err);
                0
            }
        }
    }

    /// Counts for the configured window plus the live journal size.
    pub async fn get_dashboard_summary(&self) -> DashboardSummary {
        self.initialize().await;
        let now_ms = self.clock.now_ms();
        let since_ms = now_ms - i64::from(self.config.dashboard_days) * MS_PER_DAY;
        let offset_seconds = self.clock.local_offset().local_minus_utc();

        let by_module = self.count_group(LogGroup::Module, since_ms);
        let by_event = self.count_group(LogGroup::Event, since_ms);
        let by_day = self.count_group(LogGroup::Day { offset_seconds }, since_ms);
        let pending_count = self
            .journal
            .pending_entries(now_ms, self.retention_ms())
            .await
            .len();

        DashboardSummary {
            total_events: by_event.values().sum(),
            by_module,
            by_event,
            by_day,
            pending_count,
        }
    }

    fn count_group(&self, group: LogGroup, since_ms: i64) -> BTreeMap<String, u64> {
        match self.history.count_by(group, since_ms) {
            Ok(rows) => rows.into_iter().collect(),
            Err(err) => {
                warn!(
                    "event=dashboard module=engine status=error group={:?} error={}",
                    group, err
                );
                BTreeMap::new()
            }
        }
    }
}
