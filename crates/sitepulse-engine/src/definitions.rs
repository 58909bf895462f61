//! CRUD stores for user-authored report definitions and scheduled reports.
//! One JSON collection file per website, guarded by a per-website mutex and
//! published atomically like every other partition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use sitepulse_core::report::{CreateReportRequest, CustomReport, UpdateReportRequest};
use sitepulse_core::schedule::{
    CreateScheduleRequest, ScheduledReport, UpdateScheduleRequest,
};

use crate::partition::{self, StoreError};

struct CollectionFiles {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionFiles {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn path(&self, website_id: &str) -> PathBuf {
        self.root.join(format!("{website_id}.json"))
    }

    async fn lock(&self, website_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(website_id.to_string()).or_default())
    }

    fn load<T: serde::de::DeserializeOwned>(&self, website_id: &str) -> Result<Vec<T>, StoreError> {
        partition::validate_key(website_id)?;
        Ok(partition::read_doc(&self.path(website_id))?.unwrap_or_default())
    }

    fn save<T: serde::Serialize>(&self, website_id: &str, items: &[T]) -> Result<(), StoreError> {
        partition::validate_key(website_id)?;
        partition::write_doc(&self.path(website_id), &items)
    }

    /// Websites that have a collection file — drives the scheduler loop.
    fn websites(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut out: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        out.sort();
        out
    }
}

pub struct ReportStore {
    files: CollectionFiles,
}

impl ReportStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            files: CollectionFiles::new(data_dir.join("reports")),
        }
    }

    pub async fn list(&self, website_id: &str) -> Result<Vec<CustomReport>, StoreError> {
        self.files.load(website_id)
    }

    pub async fn get(
        &self,
        website_id: &str,
        report_id: &str,
    ) -> Result<Option<CustomReport>, StoreError> {
        Ok(self
            .files
            .load::<CustomReport>(website_id)?
            .into_iter()
            .find(|r| r.id == report_id))
    }

    pub async fn create(
        &self,
        website_id: &str,
        req: CreateReportRequest,
    ) -> Result<CustomReport, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now().to_rfc3339();
        let report = CustomReport {
            id: uuid::Uuid::new_v4().to_string(),
            website_id: website_id.to_string(),
            name: req.name,
            description: req.description,
            date_range: req.date_range,
            charts: req.charts,
            filters: req.filters,
            created_at: now.clone(),
            updated_at: now,
        };
        let mut all: Vec<CustomReport> = self.files.load(website_id)?;
        all.push(report.clone());
        self.files.save(website_id, &all)?;
        Ok(report)
    }

    pub async fn update(
        &self,
        website_id: &str,
        report_id: &str,
        req: UpdateReportRequest,
    ) -> Result<Option<CustomReport>, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<CustomReport> = self.files.load(website_id)?;
        let Some(report) = all.iter_mut().find(|r| r.id == report_id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            report.name = name;
        }
        if let Some(description) = req.description {
            report.description = Some(description);
        }
        if let Some(date_range) = req.date_range {
            report.date_range = date_range;
        }
        if let Some(charts) = req.charts {
            report.charts = charts;
        }
        if let Some(filters) = req.filters {
            report.filters = filters;
        }
        report.updated_at = Utc::now().to_rfc3339();
        let updated = report.clone();
        self.files.save(website_id, &all)?;
        Ok(Some(updated))
    }

    pub async fn delete(&self, website_id: &str, report_id: &str) -> Result<bool, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<CustomReport> = self.files.load(website_id)?;
        let before = all.len();
        all.retain(|r| r.id != report_id);
        if all.len() == before {
            return Ok(false);
        }
        self.files.save(website_id, &all)?;
        Ok(true)
    }
}

pub struct ScheduleStore {
    files: CollectionFiles,
}

impl ScheduleStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            files: CollectionFiles::new(data_dir.join("schedules")),
        }
    }

    pub async fn list(&self, website_id: &str) -> Result<Vec<ScheduledReport>, StoreError> {
        self.files.load(website_id)
    }

    pub async fn get(
        &self,
        website_id: &str,
        schedule_id: &str,
    ) -> Result<Option<ScheduledReport>, StoreError> {
        Ok(self
            .files
            .load::<ScheduledReport>(website_id)?
            .into_iter()
            .find(|s| s.id == schedule_id))
    }

    /// `next_send` is computed by the caller (it is recomputed on every save
    /// per the recurrence contract) and persisted here.
    pub async fn create(
        &self,
        website_id: &str,
        req: CreateScheduleRequest,
        next_send: DateTime<Utc>,
    ) -> Result<ScheduledReport, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now().to_rfc3339();
        let item = ScheduledReport {
            id: uuid::Uuid::new_v4().to_string(),
            website_id: website_id.to_string(),
            report_id: req.report_id,
            schedule: req.schedule,
            recipients: req.recipients,
            format: req.format,
            enabled: req.enabled,
            last_sent: None,
            next_send: Some(next_send),
            created_at: now.clone(),
            updated_at: now,
        };
        let mut all: Vec<ScheduledReport> = self.files.load(website_id)?;
        all.push(item.clone());
        self.files.save(website_id, &all)?;
        Ok(item)
    }

    pub async fn update(
        &self,
        website_id: &str,
        schedule_id: &str,
        req: UpdateScheduleRequest,
        next_send: DateTime<Utc>,
    ) -> Result<Option<ScheduledReport>, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<ScheduledReport> = self.files.load(website_id)?;
        let Some(item) = all.iter_mut().find(|s| s.id == schedule_id) else {
            return Ok(None);
        };
        if let Some(report_id) = req.report_id {
            item.report_id = report_id;
        }
        if let Some(schedule) = req.schedule {
            item.schedule = schedule;
        }
        if let Some(recipients) = req.recipients {
            item.recipients = recipients;
        }
        if let Some(format) = req.format {
            item.format = format;
        }
        if let Some(enabled) = req.enabled {
            item.enabled = enabled;
        }
        item.next_send = Some(next_send);
        item.updated_at = Utc::now().to_rfc3339();
        let updated = item.clone();
        self.files.save(website_id, &all)?;
        Ok(Some(updated))
    }

    pub async fn delete(&self, website_id: &str, schedule_id: &str) -> Result<bool, StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<ScheduledReport> = self.files.load(website_id)?;
        let before = all.len();
        all.retain(|s| s.id != schedule_id);
        if all.len() == before {
            return Ok(false);
        }
        self.files.save(website_id, &all)?;
        Ok(true)
    }

    /// Enabled items whose `next_send` has passed. `next_send` is the sole
    /// liveness authority.
    pub async fn list_due(
        &self,
        website_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledReport>, StoreError> {
        Ok(self
            .files
            .load::<ScheduledReport>(website_id)?
            .into_iter()
            .filter(|s| s.enabled && s.next_send.is_some_and(|next| next <= now))
            .collect())
    }

    /// Record a successful dispatch: advance `last_sent` and `next_send`.
    /// Failed dispatches never reach this, so the item stays due and is
    /// retried on the next tick.
    pub async fn record_fire(
        &self,
        website_id: &str,
        schedule_id: &str,
        sent_at: DateTime<Utc>,
        next_send: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<ScheduledReport> = self.files.load(website_id)?;
        if let Some(item) = all.iter_mut().find(|s| s.id == schedule_id) {
            item.last_sent = Some(sent_at);
            item.next_send = Some(next_send);
            item.updated_at = sent_at.to_rfc3339();
            self.files.save(website_id, &all)?;
        }
        Ok(())
    }

    /// Force a specific `next_send`. Test/ops escape hatch for making an
    /// item due without waiting for its rule to elapse.
    pub async fn set_next_send(
        &self,
        website_id: &str,
        schedule_id: &str,
        next_send: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let lock = self.files.lock(website_id).await;
        let _guard = lock.lock().await;

        let mut all: Vec<ScheduledReport> = self.files.load(website_id)?;
        if let Some(item) = all.iter_mut().find(|s| s.id == schedule_id) {
            item.next_send = Some(next_send);
            self.files.save(website_id, &all)?;
        }
        Ok(())
    }

    pub fn websites(&self) -> Vec<String> {
        self.files.websites()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sitepulse_core::schedule::{Frequency, ReportFormat, Schedule};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("sitepulse-definitions-{name}-{nanos}"))
    }

    fn schedule_req(report_id: &str) -> CreateScheduleRequest {
        CreateScheduleRequest {
            report_id: report_id.to_string(),
            schedule: Schedule {
                frequency: Frequency::Daily,
                day_of_week: None,
                day_of_month: None,
                time: "09:00".to_string(),
                timezone: None,
            },
            recipients: vec!["ops@example.com".to_string()],
            format: ReportFormat::Csv,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn report_crud_round_trip() {
        let store = ReportStore::new(&temp_dir("reports"));
        let created = store
            .create(
                "site-a",
                CreateReportRequest {
                    name: "Weekly KPI".to_string(),
                    description: None,
                    date_range: Default::default(),
                    charts: vec![],
                    filters: vec![],
                },
            )
            .await
            .expect("create");

        assert_eq!(store.list("site-a").await.expect("list").len(), 1);

        let updated = store
            .update(
                "site-a",
                &created.id,
                UpdateReportRequest {
                    name: Some("Monthly KPI".to_string()),
                    description: None,
                    date_range: None,
                    charts: None,
                    filters: None,
                },
            )
            .await
            .expect("update")
            .expect("found");
        assert_eq!(updated.name, "Monthly KPI");

        assert!(store.delete("site-a", &created.id).await.expect("delete"));
        assert!(!store.delete("site-a", &created.id).await.expect("redelete"));
        assert!(store.list("site-a").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn due_detection_follows_next_send() {
        let store = ScheduleStore::new(&temp_dir("due"));
        let now = Utc::now();
        let due = store
            .create("site-a", schedule_req("r1"), now - Duration::minutes(1))
            .await
            .expect("create due");
        store
            .create("site-a", schedule_req("r2"), now + Duration::hours(1))
            .await
            .expect("create future");

        let due_items = store.list_due("site-a", now).await.expect("list_due");
        assert_eq!(due_items.len(), 1);
        assert_eq!(due_items[0].id, due.id);

        store
            .record_fire("site-a", &due.id, now, now + Duration::days(1))
            .await
            .expect("record fire");
        assert!(store
            .list_due("site-a", now)
            .await
            .expect("list_due")
            .is_empty());
    }

    #[tokio::test]
    async fn disabled_items_are_never_due() {
        let store = ScheduleStore::new(&temp_dir("disabled"));
        let now = Utc::now();
        let mut req = schedule_req("r1");
        req.enabled = false;
        store
            .create("site-a", req, now - Duration::minutes(5))
            .await
            .expect("create");
        assert!(store
            .list_due("site-a", now)
            .await
            .expect("list_due")
            .is_empty());
    }

    #[tokio::test]
    async fn websites_lists_collection_owners() {
        let dir = temp_dir("owners");
        let store = ScheduleStore::new(&dir);
        let now = Utc::now();
        store
            .create("site-a", schedule_req("r1"), now)
            .await
            .expect("create a");
        store
            .create("site-b", schedule_req("r2"), now)
            .await
            .expect("create b");
        assert_eq!(store.websites(), vec!["site-a", "site-b"]);
    }
}
