use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Provenance of a block. The classification is fixed by the constructor
/// that created the block and only ever changes along the transitions
/// `auto -> manual` (edit), `auto|manual -> approved` (bulk approve) and
/// `auto|manual|approved -> excluded` (delete or leftover carve-out).
/// `excluded` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Auto,
    Manual,
    Approved,
    Excluded,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Approved => "approved",
            Self::Excluded => "excluded",
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "approved" => Ok(Self::Approved),
            "excluded" => Ok(Self::Excluded),
            other => Err(format!("unsupported source type: {other}")),
        }
    }
}

/// The only persistent entity: one scheduled interval of protected time.
///
/// Timestamps are stored in UTC; all scheduling computation happens in the
/// single configured IANA zone. Excluded blocks are never shown to callers
/// and are never physically purged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub approved: bool,
    pub source_type: SourceType,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeBlock {
    /// A regenerable block produced by the orchestrator. Disposable until
    /// approved or edited.
    pub fn auto(
        id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_source(id, start_time, end_time, SourceType::Auto, now)
    }

    /// A user-created or user-edited block. Never silently regenerated away.
    pub fn manual(
        id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_source(id, start_time, end_time, SourceType::Manual, now)
    }

    /// The abandoned tail left behind when a block is shortened. Must never
    /// reappear as free time.
    pub fn excluded_tail(
        id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut block = Self::with_source(id, start_time, end_time, SourceType::Excluded, now);
        block.deleted_at = Some(now);
        block
    }

    fn with_source(
        id: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        source_type: SourceType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            start_time,
            end_time,
            approved: false,
            source_type,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("block.id must not be empty".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("block.end_time must be after block.start_time".to_string());
        }
        Ok(())
    }

    pub fn is_excluded(&self) -> bool {
        self.source_type == SourceType::Excluded
    }

    /// Half-open overlap test against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    /// Bulk-approve transition: `auto|manual -> approved`.
    pub fn approve(&mut self, now: DateTime<Utc>) {
        self.approved = true;
        self.source_type = SourceType::Approved;
        self.updated_at = now;
    }

    /// Soft delete by reclassification. Excluded blocks stay in the store
    /// but drop out of every caller-facing view and out of regeneration.
    pub fn exclude(&mut self, now: DateTime<Utc>) {
        self.source_type = SourceType::Excluded;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

/// A calendar appointment as surfaced by the today view. Read-only input;
/// the gateway owns its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub summary: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_auto() -> TimeBlock {
        TimeBlock::auto(
            "blk-1".to_string(),
            fixed_time("2026-02-16T16:00:00Z"),
            fixed_time("2026-02-16T16:50:00Z"),
            fixed_time("2026-02-16T15:00:00Z"),
        )
    }

    #[test]
    fn constructors_fix_classification() {
        let auto = sample_auto();
        assert_eq!(auto.source_type, SourceType::Auto);
        assert!(!auto.approved);
        assert!(auto.deleted_at.is_none());

        let manual = TimeBlock::manual(
            "blk-2".to_string(),
            auto.start_time,
            auto.end_time,
            auto.created_at,
        );
        assert_eq!(manual.source_type, SourceType::Manual);

        let tail = TimeBlock::excluded_tail(
            "blk-3".to_string(),
            auto.start_time,
            auto.end_time,
            auto.created_at,
        );
        assert_eq!(tail.source_type, SourceType::Excluded);
        assert_eq!(tail.deleted_at, Some(auto.created_at));
    }

    #[test]
    fn validate_rejects_reversed_range() {
        let mut block = sample_auto();
        block.end_time = block.start_time;
        assert!(block.validate().is_err());
    }

    #[test]
    fn overlap_is_half_open() {
        let block = sample_auto();
        assert!(block.overlaps(
            fixed_time("2026-02-16T16:30:00Z"),
            fixed_time("2026-02-16T17:00:00Z"),
        ));
        // Touching at the boundary is not an overlap.
        assert!(!block.overlaps(
            fixed_time("2026-02-16T16:50:00Z"),
            fixed_time("2026-02-16T17:00:00Z"),
        ));
        assert!(!block.overlaps(
            fixed_time("2026-02-16T15:00:00Z"),
            fixed_time("2026-02-16T16:00:00Z"),
        ));
    }

    #[test]
    fn approve_and_exclude_transitions() {
        let now = fixed_time("2026-02-16T17:00:00Z");
        let mut block = sample_auto();

        block.approve(now);
        assert!(block.approved);
        assert_eq!(block.source_type, SourceType::Approved);
        assert_eq!(block.updated_at, now);

        block.exclude(now);
        assert_eq!(block.source_type, SourceType::Excluded);
        assert_eq!(block.deleted_at, Some(now));
    }

    #[test]
    fn source_type_string_mapping_roundtrips() {
        for source in [
            SourceType::Auto,
            SourceType::Manual,
            SourceType::Approved,
            SourceType::Excluded,
        ] {
            assert_eq!(source.as_str().parse::<SourceType>(), Ok(source));
        }
        assert!("pending".parse::<SourceType>().is_err());
    }
}
