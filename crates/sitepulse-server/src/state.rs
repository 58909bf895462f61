use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use sitepulse_core::config::Config;
use sitepulse_engine::{
    AggregateStore, Aggregator, DashboardEngine, EventStore, ReportStore, ScheduleStore,
};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`]. Heavy resources are wrapped in `Arc`.
pub struct AppState {
    pub config: Arc<Config>,
    pub events: Arc<EventStore>,
    pub aggregates: Arc<AggregateStore>,
    pub reports: Arc<ReportStore>,
    pub schedules: Arc<ScheduleStore>,
    pub aggregator: Aggregator,
    pub dashboard: DashboardEngine,

    /// Websites currently inside `process_due`. Overlapping scheduler ticks
    /// for the same website would double-send; the guard makes the second
    /// entrant a no-op.
    processing: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let data_dir = Path::new(&config.data_dir);
        let events = Arc::new(EventStore::new(data_dir, config.partition_cap));
        let aggregates = Arc::new(AggregateStore::new(data_dir));
        let reports = Arc::new(ReportStore::new(data_dir));
        let schedules = Arc::new(ScheduleStore::new(data_dir));
        let aggregator = Aggregator::new(Arc::clone(&events), Arc::clone(&aggregates));
        let dashboard = DashboardEngine::new(
            Arc::clone(&aggregates),
            Arc::clone(&events),
            config.realtime_window_secs,
        );
        Self {
            config: Arc::new(config),
            events,
            aggregates,
            reports,
            schedules,
            aggregator,
            dashboard,
            processing: Mutex::new(HashSet::new()),
        }
    }

    /// Try to claim the per-website scheduler guard. Returns `false` when a
    /// `process_due` for this website is already in flight.
    pub async fn begin_processing(&self, website_id: &str) -> bool {
        self.processing.lock().await.insert(website_id.to_string())
    }

    pub async fn end_processing(&self, website_id: &str) {
        self.processing.lock().await.remove(website_id);
    }
}
