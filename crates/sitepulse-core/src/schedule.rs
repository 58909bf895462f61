use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    /// No dedicated rule shape yet; behaves as daily.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Csv,
    Excel,
    Json,
}

/// A recurrence rule: frequency plus the fields that frequency needs.
/// `time` is 24h "HH:MM" local to `timezone` (UTC when absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday. Required for weekly.
    pub day_of_week: Option<u32>,
    /// 1-31. Required for monthly; clamped to the month's last day.
    pub day_of_month: Option<u32>,
    pub time: String,
    pub timezone: Option<String>,
}

/// A recurrence rule bound to one custom report, with recipients and format.
/// `next_send` is the sole liveness authority: recomputed on every save and
/// on every successful fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReport {
    pub id: String,
    pub website_id: String,
    pub report_id: String,
    pub schedule: Schedule,
    pub recipients: Vec<String>,
    pub format: ReportFormat,
    pub enabled: bool,
    pub last_sent: Option<DateTime<Utc>>,
    pub next_send: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleRequest {
    pub report_id: String,
    pub schedule: Schedule,
    pub recipients: Vec<String>,
    pub format: ReportFormat,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScheduleRequest {
    pub report_id: Option<String>,
    pub schedule: Option<Schedule>,
    pub recipients: Option<Vec<String>>,
    pub format: Option<ReportFormat>,
    pub enabled: Option<bool>,
}

/// Compute the next fire instant strictly after `now`.
///
/// - daily (and custom): today at `time`, plus one day if already past.
/// - weekly: the next occurrence of `day_of_week` at `time`; if that lands
///   today but the time has passed, seven days later.
/// - monthly: this month at `day_of_month` (clamped to the month's length),
///   advanced one month — clamped again — if already past.
pub fn compute_next_send(schedule: &Schedule, now: DateTime<Utc>) -> Result<DateTime<Utc>, CoreError> {
    let time = parse_time(&schedule.time)?;
    let tz = parse_timezone(schedule.timezone.as_deref())?;
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();

    let local_next = match schedule.frequency {
        Frequency::Daily | Frequency::Custom => {
            let mut candidate = at(&tz, today, time)?;
            if candidate <= now {
                candidate = at(&tz, today + Duration::days(1), time)?;
            }
            candidate
        }
        Frequency::Weekly => {
            let target = schedule
                .day_of_week
                .ok_or_else(|| CoreError::Schedule("weekly rule requires day_of_week".into()))?;
            if target > 6 {
                return Err(CoreError::Schedule(format!(
                    "day_of_week out of range: {target}"
                )));
            }
            let current = today.weekday().num_days_from_sunday();
            let ahead = (target + 7 - current) % 7;
            let mut candidate = at(&tz, today + Duration::days(i64::from(ahead)), time)?;
            if candidate <= now {
                candidate = at(&tz, today + Duration::days(i64::from(ahead) + 7), time)?;
            }
            candidate
        }
        Frequency::Monthly => {
            let target = schedule
                .day_of_month
                .ok_or_else(|| CoreError::Schedule("monthly rule requires day_of_month".into()))?;
            if !(1..=31).contains(&target) {
                return Err(CoreError::Schedule(format!(
                    "day_of_month out of range: {target}"
                )));
            }
            let this_month = clamped_date(today.year(), today.month(), target)?;
            let mut candidate = at(&tz, this_month, time)?;
            if candidate <= now {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                candidate = at(&tz, clamped_date(year, month, target)?, time)?;
            }
            candidate
        }
    };

    Ok(local_next)
}

fn parse_time(raw: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| CoreError::Schedule(format!("invalid time (expected HH:MM): {raw}")))
}

fn parse_timezone(raw: Option<&str>) -> Result<Tz, CoreError> {
    match raw {
        None | Some("") => Ok(chrono_tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| CoreError::Schedule(format!("unknown timezone: {name}"))),
    }
}

/// Resolve a local wall-clock instant to UTC. DST gaps/folds pick the
/// earliest valid interpretation.
fn at(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, CoreError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CoreError::Schedule(format!("unrepresentable local time {date} {time}")))
}

/// `day` clamped to the last day of (year, month).
fn clamped_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, CoreError> {
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
        .ok_or_else(|| CoreError::Schedule(format!("invalid date {year}-{month:02}-{day:02}")))
}

fn last_day_of_month(year: i32, month: u32) -> Result<u32, CoreError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| CoreError::Schedule(format!("invalid month {year}-{month:02}")))?;
    Ok((first_of_next - Duration::days(1)).day())
}
