use chrono::{Duration, NaiveDateTime, Timelike};

/// Snaps forward to the half-hour grid: minute-of-hour below 30 lands on
/// `:30` of the same hour, anything else on `:00` of the next hour.
/// Seconds and sub-seconds are zeroed.
pub fn round_to_half_hour(t: NaiveDateTime) -> NaiveDateTime {
    let hour_start = t
        .date()
        .and_hms_opt(t.hour(), 0, 0)
        .expect("hour taken from a valid datetime");
    if t.minute() < 30 {
        hour_start + Duration::minutes(30)
    } else {
        hour_start + Duration::hours(1)
    }
}

/// Snaps to the nearest multiple of 5 minutes, ties rounding up. Seconds
/// and sub-seconds are zeroed.
pub fn round_to_nearest_five(t: NaiveDateTime) -> NaiveDateTime {
    let hour_start = t
        .date()
        .and_hms_opt(t.hour(), 0, 0)
        .expect("hour taken from a valid datetime");
    let seconds_into_hour = i64::from(t.minute()) * 60 + i64::from(t.second());
    let snapped = (seconds_into_hour + 150) / 300 * 300;
    hour_start + Duration::seconds(snapped)
}
