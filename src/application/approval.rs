use crate::application::local_day_bounds;
use crate::domain::models::TimeBlock;
use crate::infrastructure::alarm::{AlarmRequest, AlarmService};
use crate::infrastructure::block_store::BlockStore;
use crate::infrastructure::config::SchedulerConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::webhook::{BlockNotification, WebhookNotifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ApprovalResult {
    pub approved: Vec<TimeBlock>,
    pub side_effect_failures: usize,
}

/// Bulk-approves today's pending blocks in start order. Each approval is
/// persisted first, then announced to the webhook and the alarm device.
/// Side effects are best effort: a failed webhook or alarm is logged and
/// counted but never rolls back the approval. Consecutive approvals are
/// spaced out by a delay so downstream automations see one block at a
/// time.
pub struct ApprovalService<S, W, A>
where
    S: BlockStore + ?Sized,
    W: WebhookNotifier + ?Sized,
    A: AlarmService + ?Sized,
{
    store: Arc<S>,
    webhook: Arc<W>,
    alarm: Arc<A>,
    config: SchedulerConfig,
    delay: Duration,
    now_provider: NowProvider,
}

impl<S, W, A> ApprovalService<S, W, A>
where
    S: BlockStore + ?Sized,
    W: WebhookNotifier + ?Sized,
    A: AlarmService + ?Sized,
{
    pub fn new(store: Arc<S>, webhook: Arc<W>, alarm: Arc<A>, config: SchedulerConfig) -> Self {
        let delay = Duration::from_secs(config.approval_delay_seconds);
        Self {
            store,
            webhook,
            alarm,
            config,
            delay,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn approve_all_today(&self) -> Result<ApprovalResult, CoreError> {
        let now = (self.now_provider)();
        let bounds = local_day_bounds(now, self.config.timezone, self.config.day_end)?;

        let pending: Vec<TimeBlock> = self
            .store
            .list_range(bounds.day_start, bounds.next_day_start)?
            .into_iter()
            .filter(|block| !block.approved && !block.is_excluded())
            .collect();

        let mut approved = Vec::with_capacity(pending.len());
        let mut side_effect_failures = 0;
        let mut first = true;
        for mut block in pending {
            if !first {
                sleep(self.delay).await;
            }
            first = false;

            block.approve((self.now_provider)());
            self.store.save(&block)?;

            let notification = BlockNotification::from_block(&block, self.config.timezone);
            if let Err(error) = self.webhook.notify(&notification).await {
                warn!(block_id = %block.id, %error, "webhook notification failed");
                side_effect_failures += 1;
            }

            let request = AlarmRequest {
                block_id: block.id.clone(),
                start_time: block.start_time,
                end_time: block.end_time,
            };
            if let Err(error) = self.alarm.set_alarm(&request).await {
                warn!(block_id = %block.id, %error, "alarm scheduling failed");
                side_effect_failures += 1;
            }

            approved.push(block);
        }

        info!(
            approved = approved.len(),
            side_effect_failures, "bulk approval finished"
        );
        Ok(ApprovalResult {
            approved,
            side_effect_failures,
        })
    }
}
