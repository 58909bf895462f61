//! The Aggregate Store: one JSON document per `(website_id, date)`.
//! `put` is an atomic whole-record replace, never a merge, which is what
//! makes re-running aggregation idempotent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use sitepulse_core::aggregate::DailyAggregate;

use crate::partition::{self, StoreError};

pub struct AggregateStore {
    root: PathBuf,
}

impl AggregateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("aggregates"),
        }
    }

    fn record_path(&self, website_id: &str, date: NaiveDate) -> PathBuf {
        partition::day_path(&self.root, website_id, date, "json")
    }

    pub async fn put(&self, record: &DailyAggregate) -> Result<(), StoreError> {
        partition::validate_key(&record.website_id)?;
        partition::write_doc(&self.record_path(&record.website_id, record.date), record)
    }

    pub async fn get(
        &self,
        website_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregate>, StoreError> {
        partition::validate_key(website_id)?;
        partition::read_doc(&self.record_path(website_id, date))
    }

    /// Records present in `[start, end]`, keyed by date. Missing days are
    /// simply absent; the dashboard zero-fills them.
    pub async fn get_range(
        &self,
        website_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyAggregate>, StoreError> {
        let mut out = BTreeMap::new();
        let mut day = start;
        while day <= end {
            if let Some(record) = self.get(website_id, day).await? {
                out.insert(day, record);
            }
            day += chrono::Duration::days(1);
        }
        Ok(out)
    }
}
