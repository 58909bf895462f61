//! The raw Event Store: one JSON-lines partition per `(website_id, day)`.
//!
//! Writers to the same partition are serialized by a per-partition mutex and
//! publish through an atomic rename, so concurrent appends lose nothing and
//! readers always observe a complete snapshot. Reads never take the lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use sitepulse_core::event::Event;

use crate::partition::{self, StoreError};

/// Optional equality filters plus an exact timestamp-range filter for reads.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub event_category: Option<String>,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn matches(&self, event: &Event) -> bool {
        if self.event_type.as_deref().is_some_and(|v| v != event.event_type) {
            return false;
        }
        if self
            .event_category
            .as_deref()
            .is_some_and(|v| v != event.event_category)
        {
            return false;
        }
        if self.session_id.as_deref().is_some_and(|v| v != event.session_id) {
            return false;
        }
        if self.visitor_id.as_deref().is_some_and(|v| v != event.visitor_id) {
            return false;
        }
        if self.from.is_some_and(|from| event.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| event.timestamp > to) {
            return false;
        }
        true
    }
}

pub struct EventStore {
    root: PathBuf,
    /// Oldest-evicted cap per partition. Aggregation run before the cap is
    /// reached is the only way to capture full history for heavy days.
    partition_cap: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EventStore {
    pub fn new(data_dir: &Path, partition_cap: usize) -> Self {
        Self {
            root: data_dir.join("events"),
            partition_cap,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn partition_path(&self, website_id: &str, date: NaiveDate) -> PathBuf {
        partition::day_path(&self.root, website_id, date, "jsonl")
    }

    /// One lock per live `(website_id, date)` partition key.
    async fn partition_lock(&self, website_id: &str, date: NaiveDate) -> Arc<Mutex<()>> {
        let key = format!("{website_id}/{date}");
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }

    pub async fn append(
        &self,
        website_id: &str,
        date: NaiveDate,
        event: Event,
    ) -> Result<(), StoreError> {
        self.append_many(website_id, date, vec![event]).await
    }

    /// Append events to one partition under its writer lock.
    ///
    /// The partition is read back, extended, capped, and republished via
    /// atomic rename. Eviction drops the oldest entries first.
    pub async fn append_many(
        &self,
        website_id: &str,
        date: NaiveDate,
        events: Vec<Event>,
    ) -> Result<(), StoreError> {
        partition::validate_key(website_id)?;
        if events.is_empty() {
            return Ok(());
        }
        let lock = self.partition_lock(website_id, date).await;
        let _guard = lock.lock().await;

        let path = self.partition_path(website_id, date);
        let mut existing: Vec<Event> = partition::read_lines(&path)?;
        existing.extend(events);
        if existing.len() > self.partition_cap {
            let evict = existing.len() - self.partition_cap;
            warn!(
                website_id,
                %date,
                evicted = evict,
                cap = self.partition_cap,
                "partition cap reached, evicting oldest events"
            );
            existing.drain(..evict);
        }
        partition::write_lines(&path, &existing)
    }

    /// Read events across `[start_date, end_date]`, touching only the
    /// partitions overlapping the window, filtered and sorted ascending by
    /// timestamp.
    pub async fn read(
        &self,
        website_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StoreError> {
        partition::validate_key(website_id)?;
        let mut out = Vec::new();
        let mut day = start_date;
        while day <= end_date {
            let partition: Vec<Event> = partition::read_lines(&self.partition_path(website_id, day))?;
            out.extend(partition.into_iter().filter(|e| filter.matches(e)));
            day += chrono::Duration::days(1);
        }
        out.sort_by_key(|e| e.timestamp);
        Ok(out)
    }

    /// Read raw events in an exact timestamp window. Used by the realtime
    /// path, which deliberately bypasses aggregation.
    pub async fn read_window(
        &self,
        website_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let filter = EventFilter {
            from: Some(from),
            to: Some(to),
            ..EventFilter::default()
        };
        self.read(website_id, from.date_naive(), to.date_naive(), &filter)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitepulse_core::device::DeviceInfo;
    use std::sync::Arc;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("sitepulse-events-{name}-{nanos}"))
    }

    fn event(session: &str, visitor: &str, ts: DateTime<Utc>) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            website_id: "site-a".to_string(),
            session_id: session.to_string(),
            visitor_id: visitor.to_string(),
            event_type: "pageview".to_string(),
            event_category: "page".to_string(),
            event_action: "view".to_string(),
            event_label: None,
            event_value: None,
            path: Some("/".to_string()),
            referrer: None,
            user_agent: None,
            ip: None,
            device: DeviceInfo::default(),
            location: None,
            metadata: serde_json::json!({}),
            timestamp: ts,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).expect("date")
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, h, m, 0).single().expect("ts")
    }

    #[tokio::test]
    async fn reads_come_back_sorted_and_filtered() {
        let store = EventStore::new(&temp_dir("sorted"), 1000);
        store
            .append_many(
                "site-a",
                day(),
                vec![event("s2", "v2", ts(10, 0)), event("s1", "v1", ts(9, 0))],
            )
            .await
            .expect("append");

        let all = store
            .read("site-a", day(), day(), &EventFilter::default())
            .await
            .expect("read");
        assert_eq!(all.len(), 2);
        assert!(all[0].timestamp < all[1].timestamp);

        let filtered = store
            .read(
                "site-a",
                day(),
                day(),
                &EventFilter {
                    session_id: Some("s1".to_string()),
                    ..EventFilter::default()
                },
            )
            .await
            .expect("read filtered");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].visitor_id, "v1");
    }

    #[tokio::test]
    async fn retention_cap_evicts_oldest() {
        let store = EventStore::new(&temp_dir("cap"), 3);
        for minute in 0..5 {
            store
                .append("site-a", day(), event("s", "v", ts(1, minute)))
                .await
                .expect("append");
        }
        let all = store
            .read("site-a", day(), day(), &EventFilter::default())
            .await
            .expect("read");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, ts(1, 2));
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_partition_lose_nothing() {
        let store = Arc::new(EventStore::new(&temp_dir("concurrent"), 10_000));
        let mut handles = Vec::new();
        for task in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for minute in 0..5 {
                    store
                        .append(
                            "site-a",
                            day(),
                            event(&format!("s{task}"), &format!("v{task}"), ts(2, minute)),
                        )
                        .await
                        .expect("append");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        let all = store
            .read("site-a", day(), day(), &EventFilter::default())
            .await
            .expect("read");
        assert_eq!(all.len(), 40);
    }

    #[tokio::test]
    async fn traversal_shaped_website_id_never_touches_disk() {
        let dir = temp_dir("traversal");
        let store = EventStore::new(&dir, 1000);
        let escaped = format!("../../{}", "sitepulse-escape");

        let err = store
            .append(&escaped, day(), event("s1", "v1", ts(9, 0)))
            .await
            .expect_err("append must be rejected");
        assert!(matches!(err, StoreError::InvalidKey { .. }));
        assert!(store
            .read(&escaped, day(), day(), &EventFilter::default())
            .await
            .is_err());

        // Nothing may exist outside the events root. The rejected id would
        // have landed two levels up, next to the store directory itself.
        assert!(!std::env::temp_dir().join("sitepulse-escape").exists());
    }

    #[tokio::test]
    async fn partitions_are_isolated_by_day_and_website() {
        let store = EventStore::new(&temp_dir("isolated"), 1000);
        let other_day = NaiveDate::from_ymd_opt(2026, 8, 2).expect("date");
        store
            .append("site-a", day(), event("s1", "v1", ts(9, 0)))
            .await
            .expect("append");
        store
            .append("site-b", day(), event("s9", "v9", ts(9, 0)))
            .await
            .expect("append");

        let site_a = store
            .read("site-a", day(), other_day, &EventFilter::default())
            .await
            .expect("read");
        assert_eq!(site_a.len(), 1);
        assert_eq!(site_a[0].session_id, "s1");
    }
}
