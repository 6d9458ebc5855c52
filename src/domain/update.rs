use crate::domain::models::TimeBlock;
use crate::domain::rounding::round_to_nearest_five;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("invalid block times: {0}")]
    Validation(String),
    #[error("requested times overlap another block: {0}")]
    Conflict(String),
}

/// The fully resolved result of a manual edit. Persistence is the caller's
/// job: the excluded tail (when present) and the updated block are written
/// as two separate store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub updated: TimeBlock,
    pub excluded_tail: Option<TimeBlock>,
    pub snapped_start: DateTime<Utc>,
    pub snapped_end: DateTime<Utc>,
}

/// Validates and applies a manual edit to one block without touching any
/// store. Both requested timestamps snap to the 5-minute grid in the
/// configured zone; the edit is rejected when the snapped range is empty or
/// overlaps any other non-excluded block. Shortening the end leaves an
/// excluded tail over `[new_end, old_end)` so the abandoned span never
/// resurfaces as free time. The edited block always comes out `manual` and
/// unapproved.
pub fn resolve_update(
    block: &TimeBlock,
    requested_start: DateTime<Utc>,
    requested_end: DateTime<Utc>,
    neighbors: &[TimeBlock],
    zone: Tz,
    tail_id: String,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome, UpdateError> {
    let snapped_start = snap_to_grid(requested_start, zone)?;
    let snapped_end = snap_to_grid(requested_end, zone)?;

    if snapped_start >= snapped_end {
        return Err(UpdateError::Validation(
            "end_time must be after start_time after grid snapping".to_string(),
        ));
    }

    for neighbor in neighbors {
        if neighbor.id == block.id || neighbor.is_excluded() {
            continue;
        }
        if neighbor.overlaps(snapped_start, snapped_end) {
            return Err(UpdateError::Conflict(format!(
                "requested range overlaps block {}",
                neighbor.id
            )));
        }
    }

    let excluded_tail = (snapped_end < block.end_time)
        .then(|| TimeBlock::excluded_tail(tail_id, snapped_end, block.end_time, now));

    let mut updated = block.clone();
    updated.start_time = snapped_start;
    updated.end_time = snapped_end;
    updated.source_type = crate::domain::models::SourceType::Manual;
    updated.approved = false;
    updated.updated_at = now;

    Ok(UpdateOutcome {
        updated,
        excluded_tail,
        snapped_start,
        snapped_end,
    })
}

fn snap_to_grid(t: DateTime<Utc>, zone: Tz) -> Result<DateTime<Utc>, UpdateError> {
    let local = round_to_nearest_five(t.with_timezone(&zone).naive_local());
    zone.from_local_datetime(&local)
        .earliest()
        .map(|snapped| snapped.with_timezone(&Utc))
        .ok_or_else(|| {
            UpdateError::Validation(format!("snapped time {local} does not exist in zone {zone}"))
        })
}
