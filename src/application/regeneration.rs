use crate::application::{local_day_bounds, next_id, to_utc};
use crate::domain::intervals::{buffer_intervals, free_intervals, merge_intervals, Interval};
use crate::domain::models::TimeBlock;
use crate::domain::segmenter::segment_intervals;
use crate::infrastructure::block_store::BlockStore;
use crate::infrastructure::calendar_gateway::CalendarGateway;
use crate::infrastructure::config::SchedulerConfig;
use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RegenerationResult {
    pub deleted: usize,
    pub created: Vec<TimeBlock>,
}

/// Rebuilds today's auto blocks from scratch: existing auto blocks are
/// disposable and get replaced wholesale, while manual, approved and
/// excluded blocks are treated as busy time alongside calendar
/// appointments.
pub struct RegenerationService<G, S>
where
    G: CalendarGateway + ?Sized,
    S: BlockStore + ?Sized,
{
    gateway: Arc<G>,
    store: Arc<S>,
    config: SchedulerConfig,
    now_provider: NowProvider,
}

impl<G, S> RegenerationService<G, S>
where
    G: CalendarGateway + ?Sized,
    S: BlockStore + ?Sized,
{
    pub fn new(gateway: Arc<G>, store: Arc<S>, config: SchedulerConfig) -> Self {
        Self {
            gateway,
            store,
            config,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn regenerate_today(
        &self,
        calendar_ids: &[String],
    ) -> Result<RegenerationResult, CoreError> {
        let now = (self.now_provider)();
        let zone = self.config.timezone;
        let bounds = local_day_bounds(now, zone, self.config.day_end)?;

        if now >= bounds.end_of_day {
            info!("scheduling window already closed, nothing to regenerate");
            return Ok(RegenerationResult {
                deleted: 0,
                created: Vec::new(),
            });
        }

        let deleted = self
            .store
            .delete_auto_range(bounds.day_start, bounds.next_day_start)?;

        let mut busy = self
            .gateway
            .busy_intervals(calendar_ids, bounds.day_start, bounds.next_day_start)
            .await?;
        // Everything still stored for today is protected time, excluded
        // tombstones included.
        for block in self
            .store
            .list_range(bounds.day_start, bounds.next_day_start)?
        {
            busy.push(Interval::new(block.start_time, block.end_time));
        }

        let merged = merge_intervals(busy);
        let free = free_intervals(now, bounds.end_of_day, &merged);
        let buffered = buffer_intervals(
            free,
            Duration::minutes(self.config.safety_margin_minutes),
        );

        let local_free: Vec<_> = buffered
            .iter()
            .map(|interval| {
                (
                    interval.start.with_timezone(&zone).naive_local(),
                    interval.end.with_timezone(&zone).naive_local(),
                )
            })
            .collect();
        let segmented = segment_intervals(&local_free, self.config.segment_policy());

        let mut created = Vec::with_capacity(segmented.len());
        for segment in segmented {
            created.push(TimeBlock::auto(
                next_id("blk"),
                to_utc(segment.start, zone)?,
                to_utc(segment.end, zone)?,
                now,
            ));
        }
        self.store.save_many(&created)?;

        info!(deleted, created = created.len(), "regenerated today's blocks");
        Ok(RegenerationResult { deleted, created })
    }
}
