pub mod aggregates;
pub mod aggregator;
pub mod dashboard;
pub mod definitions;
pub mod events;
pub mod partition;
pub mod renderer;
pub mod traffic;

pub use aggregates::AggregateStore;
pub use aggregator::Aggregator;
pub use dashboard::DashboardEngine;
pub use definitions::{ReportStore, ScheduleStore};
pub use events::{EventFilter, EventStore};
pub use partition::StoreError;
