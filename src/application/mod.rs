pub mod approval;
pub mod bootstrap;
pub mod commands;
pub mod regeneration;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::infrastructure::error::CoreError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Converts a local wall-clock time to UTC, resolving fall-back ambiguity
/// toward the earlier instant and rejecting spring-forward gaps.
pub(crate) fn to_utc(local: chrono::NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, CoreError> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|resolved| resolved.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::Validation(format!("local time {local} does not exist in zone {zone}"))
        })
}

/// UTC bounds of the local calendar day containing `now`, plus the UTC
/// instant of the configured end-of-day cutoff on that day.
pub(crate) fn local_day_bounds(
    now: DateTime<Utc>,
    zone: Tz,
    day_end: NaiveTime,
) -> Result<DayBounds, CoreError> {
    let local_date = now.with_timezone(&zone).date_naive();
    let midnight = NaiveTime::from_hms_opt(0, 0, 0)
        .ok_or_else(|| CoreError::Validation("midnight is not constructible".to_string()))?;
    let day_start = to_utc(local_date.and_time(midnight), zone)?;
    let next_day_start = to_utc((local_date + Duration::days(1)).and_time(midnight), zone)?;
    let end_of_day = to_utc(local_date.and_time(day_end), zone)?;
    Ok(DayBounds {
        day_start,
        next_day_start,
        end_of_day,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DayBounds {
    pub day_start: DateTime<Utc>,
    pub next_day_start: DateTime<Utc>,
    pub end_of_day: DateTime<Utc>,
}
