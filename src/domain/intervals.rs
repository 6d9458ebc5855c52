use chrono::{DateTime, Duration, Utc};

/// A half-open busy or free range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Collapses overlapping or adjacent intervals into a minimal sorted cover.
/// Merging an already-merged list returns it unchanged.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }

    intervals.sort_unstable_by(|left, right| left.start.cmp(&right.start));
    let mut iter = intervals.into_iter();
    let mut merged = vec![iter.next().expect("intervals is non-empty")];
    for interval in iter {
        let last = merged
            .last_mut()
            .expect("merged always contains at least one interval");
        if interval.start <= last.end {
            if interval.end > last.end {
                last.end = interval.end;
            }
            continue;
        }
        merged.push(interval);
    }
    merged
}

/// Subtracts a merged busy cover from `[now, end_of_day]`.
///
/// `busy` must already be sorted and non-overlapping; intervals that begin
/// before `now` only advance the cursor.
pub fn free_intervals(
    now: DateTime<Utc>,
    end_of_day: DateTime<Utc>,
    busy: &[Interval],
) -> Vec<Interval> {
    if end_of_day <= now {
        return Vec::new();
    }

    let mut free = Vec::new();
    let mut last_end = now;
    for interval in busy {
        if interval.start > last_end {
            free.push(Interval::new(last_end, interval.start.min(end_of_day)));
        }
        if interval.end > last_end {
            last_end = interval.end;
        }
        if last_end >= end_of_day {
            return free;
        }
    }
    if end_of_day > last_end {
        free.push(Interval::new(last_end, end_of_day));
    }
    free
}

/// Shrinks every interval by `margin` on both ends and drops the ones that
/// collapse. Keeps generated blocks from touching an appointment boundary
/// exactly.
pub fn buffer_intervals(intervals: Vec<Interval>, margin: Duration) -> Vec<Interval> {
    intervals
        .into_iter()
        .filter_map(|interval| {
            let start = interval.start + margin;
            let end = interval.end - margin;
            (end > start).then_some(Interval::new(start, end))
        })
        .collect()
}
