pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod error;
pub mod event;
pub mod report;
pub mod schedule;
