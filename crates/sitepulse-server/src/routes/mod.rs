pub mod aggregate;
pub mod dashboard;
pub mod health;
pub mod reports;
pub mod schedules;
pub mod track;
