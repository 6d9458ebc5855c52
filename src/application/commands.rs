use crate::application::approval::ApprovalService;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::regeneration::RegenerationService;
use crate::application::{local_day_bounds, next_id};
use crate::domain::models::{Appointment, SourceType, TimeBlock};
use crate::domain::update::resolve_update;
use crate::infrastructure::alarm::{AlarmRequest, AlarmService, HttpAlarmService};
use crate::infrastructure::block_store::{BlockStore, SqliteBlockStore};
use crate::infrastructure::calendar_gateway::{CalendarGateway, InMemoryCalendarGateway};
use crate::infrastructure::config::{
    load_scheduler_config, load_services_config, read_busy_calendar_ids, SchedulerConfig,
};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::webhook::{BlockNotification, HttpWebhookNotifier, WebhookNotifier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Shared state behind every command. Collaborators sit behind trait
/// objects so tests and future provider clients can swap them out without
/// touching the command layer.
pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    store: Arc<dyn BlockStore>,
    gateway: Arc<dyn CalendarGateway>,
    webhook: Arc<dyn WebhookNotifier>,
    alarm: Arc<dyn AlarmService>,
    scheduler_config: SchedulerConfig,
    busy_calendar_ids: Vec<String>,
    approval_delay: Duration,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, CoreError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let scheduler_config = load_scheduler_config(&bootstrap.config_dir)?;
        let services_config = load_services_config(&bootstrap.config_dir)?;
        let busy_calendar_ids = read_busy_calendar_ids(&bootstrap.config_dir)?;
        let approval_delay = Duration::from_secs(scheduler_config.approval_delay_seconds);

        Ok(Self {
            config_dir: bootstrap.config_dir,
            store: Arc::new(SqliteBlockStore::new(&bootstrap.database_path)),
            database_path: bootstrap.database_path,
            gateway: Arc::new(InMemoryCalendarGateway::default()),
            webhook: Arc::new(HttpWebhookNotifier::new(services_config.webhook_url)),
            alarm: Arc::new(HttpAlarmService::new(services_config.alarm_endpoints)),
            scheduler_config,
            busy_calendar_ids,
            approval_delay,
            now_provider: Arc::new(Utc::now),
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn CalendarGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_webhook(mut self, webhook: Arc<dyn WebhookNotifier>) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn with_alarm(mut self, alarm: Arc<dyn AlarmService>) -> Self {
        self.alarm = alarm;
        self
    }

    pub fn with_approval_delay(mut self, delay: Duration) -> Self {
        self.approval_delay = delay;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn find_block(&self, block_id: &str) -> Result<TimeBlock, CoreError> {
        self.store
            .find(block_id)?
            .ok_or_else(|| CoreError::NotFound(format!("block '{block_id}' does not exist")))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlockView {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub approved: bool,
    pub source_type: String,
}

impl BlockView {
    fn from_block(block: &TimeBlock) -> Self {
        Self {
            id: block.id.clone(),
            start_time: block.start_time.to_rfc3339(),
            end_time: block.end_time.to_rfc3339(),
            approved: block.approved,
            source_type: block.source_type.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppointmentView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub start_time: String,
    pub end_time: String,
}

impl AppointmentView {
    fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id.clone(),
            summary: appointment.summary.clone(),
            start_time: appointment.start_time.to_rfc3339(),
            end_time: appointment.end_time.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateBlocksResponse {
    pub deleted: usize,
    pub created: Vec<BlockView>,
    /// The calendar ids whose busy time the schedule was built around.
    pub verified: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayResponse {
    pub blocks: Vec<BlockView>,
    pub appointments: Vec<AppointmentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateBlockResponse {
    pub block: BlockView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_tail: Option<BlockView>,
    /// The grid-snapped times actually applied, so callers that requested
    /// unsnapped times can reconcile.
    pub snapped_start: String,
    pub snapped_end: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApproveAllResponse {
    pub message: String,
    pub approved: Vec<BlockView>,
    pub side_effect_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteBlockResponse {
    pub block_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetAlarmResponse {
    pub block_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyWebhookResponse {
    pub block_id: String,
    pub webhook_response: String,
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| CoreError::Validation(format!("invalid {field} '{raw}': {error}")))
}

/// Rebuilds today's auto blocks around appointments and protected blocks.
pub async fn generate_blocks_impl(state: &AppState) -> Result<GenerateBlocksResponse, CoreError> {
    let service = RegenerationService::new(
        Arc::clone(&state.gateway),
        Arc::clone(&state.store),
        state.scheduler_config.clone(),
    )
    .with_now_provider(Arc::clone(&state.now_provider));

    let result = service.regenerate_today(&state.busy_calendar_ids).await?;
    Ok(GenerateBlocksResponse {
        deleted: result.deleted,
        created: result.created.iter().map(BlockView::from_block).collect(),
        verified: state.busy_calendar_ids.clone(),
    })
}

/// Today's schedule as callers see it: non-excluded blocks plus the
/// appointments they were scheduled around. When the day has no live
/// blocks yet, or unapproved auto blocks have drifted into the past, the
/// view regenerates before answering.
pub async fn get_today_impl(state: &AppState) -> Result<TodayResponse, CoreError> {
    let now = state.now();
    let config = &state.scheduler_config;
    let bounds = local_day_bounds(now, config.timezone, config.day_end)?;

    let mut stored = state
        .store
        .list_range(bounds.day_start, bounds.next_day_start)?;
    let has_live = stored.iter().any(|block| !block.is_excluded());
    let has_stale = stored.iter().any(|block| {
        block.source_type == SourceType::Auto && !block.approved && block.start_time < now
    });
    if (!has_live || has_stale) && now < bounds.end_of_day {
        // Regeneration starts by dropping today's auto blocks, which covers
        // the stale ones.
        generate_blocks_impl(state).await?;
        stored = state
            .store
            .list_range(bounds.day_start, bounds.next_day_start)?;
    }

    let blocks = stored
        .iter()
        .filter(|block| !block.is_excluded())
        .map(BlockView::from_block)
        .collect();
    let appointments = state
        .gateway
        .appointments(&state.busy_calendar_ids, bounds.day_start, bounds.next_day_start)
        .await?
        .iter()
        .map(AppointmentView::from_appointment)
        .collect();

    Ok(TodayResponse {
        blocks,
        appointments,
    })
}

/// Applies a manual edit. Both timestamps are RFC3339; they snap to the
/// 5-minute grid before validation, and shortening the block leaves an
/// excluded tail over the abandoned span.
pub async fn update_block_impl(
    state: &AppState,
    block_id: &str,
    start_time: &str,
    end_time: &str,
) -> Result<UpdateBlockResponse, CoreError> {
    let requested_start = parse_timestamp(start_time, "start_time")?;
    let requested_end = parse_timestamp(end_time, "end_time")?;
    let now = state.now();
    let config = &state.scheduler_config;

    let block = state.find_block(block_id)?;
    // Conflicts are judged against the day the block lives on, not the
    // current day.
    let bounds = local_day_bounds(block.start_time, config.timezone, config.day_end)?;
    let neighbors = state
        .store
        .list_range(bounds.day_start, bounds.next_day_start)?;

    let outcome = resolve_update(
        &block,
        requested_start,
        requested_end,
        &neighbors,
        config.timezone,
        next_id("blk"),
        now,
    )?;

    if let Some(tail) = &outcome.excluded_tail {
        state.store.save(tail)?;
    }
    state.store.save(&outcome.updated)?;

    info!(block_id, "block updated");
    Ok(UpdateBlockResponse {
        block: BlockView::from_block(&outcome.updated),
        excluded_tail: outcome.excluded_tail.as_ref().map(BlockView::from_block),
        snapped_start: outcome.snapped_start.to_rfc3339(),
        snapped_end: outcome.snapped_end.to_rfc3339(),
    })
}

/// Approves every pending block for today, spaced out by the configured
/// delay, announcing each one to the webhook and the alarm device.
pub async fn approve_all_impl(state: &AppState) -> Result<ApproveAllResponse, CoreError> {
    let service = ApprovalService::new(
        Arc::clone(&state.store),
        Arc::clone(&state.webhook),
        Arc::clone(&state.alarm),
        state.scheduler_config.clone(),
    )
    .with_delay(state.approval_delay)
    .with_now_provider(Arc::clone(&state.now_provider));

    let result = service.approve_all_today().await?;
    Ok(ApproveAllResponse {
        message: format!("Approved {} blocks", result.approved.len()),
        approved: result.approved.iter().map(BlockView::from_block).collect(),
        side_effect_failures: result.side_effect_failures,
    })
}

/// Soft delete: the block flips to `excluded` and drops out of the today
/// view, but its span stays blocked for regeneration.
pub async fn delete_block_impl(
    state: &AppState,
    block_id: &str,
) -> Result<DeleteBlockResponse, CoreError> {
    let mut block = state.find_block(block_id)?;
    if !block.is_excluded() {
        block.exclude(state.now());
        state.store.save(&block)?;
    }
    info!(block_id, "block excluded");
    Ok(DeleteBlockResponse {
        block_id: block_id.to_string(),
        message: format!("Block {block_id} deleted"),
    })
}

pub async fn set_alarm_impl(state: &AppState, block_id: &str) -> Result<SetAlarmResponse, CoreError> {
    let block = state.find_block(block_id)?;
    let request = AlarmRequest {
        block_id: block.id.clone(),
        start_time: block.start_time,
        end_time: block.end_time,
    };
    state.alarm.set_alarm(&request).await?;
    info!(block_id, "alarm scheduled");
    Ok(SetAlarmResponse {
        block_id: block_id.to_string(),
        message: format!("Alarm scheduled for block {block_id}"),
    })
}

pub async fn notify_webhook_impl(
    state: &AppState,
    block_id: &str,
) -> Result<NotifyWebhookResponse, CoreError> {
    let block = state.find_block(block_id)?;
    let notification = BlockNotification::from_block(&block, state.scheduler_config.timezone);
    let webhook_response = state.webhook.notify(&notification).await?;
    info!(block_id, "webhook notified");
    Ok(NotifyWebhookResponse {
        block_id: block_id.to_string(),
        webhook_response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;

    struct TempWorkspace {
        root: PathBuf,
    }

    impl TempWorkspace {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "focusblock-commands-{tag}-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ));
            fs::create_dir_all(&root).expect("create temp workspace");
            Self { root }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[derive(Default)]
    struct RecordingWebhook {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebhookNotifier for RecordingWebhook {
        async fn notify(&self, notification: &BlockNotification) -> Result<String, CoreError> {
            self.calls
                .lock()
                .expect("webhook lock")
                .push(notification.block_id.clone());
            Ok("registered".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingAlarm {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlarmService for RecordingAlarm {
        async fn set_alarm(&self, request: &AlarmRequest) -> Result<(), CoreError> {
            self.calls
                .lock()
                .expect("alarm lock")
                .push(request.block_id.clone());
            Ok(())
        }
    }

    fn denver(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    struct Harness {
        _workspace: TempWorkspace,
        state: AppState,
        webhook: Arc<RecordingWebhook>,
        alarm: Arc<RecordingAlarm>,
    }

    // The seeded defaults put the schedule in America/Denver with a 17:00
    // cutoff; the fixed clock below reads 09:05 local.
    fn harness(tag: &str, appointments: Vec<Appointment>) -> Harness {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let workspace = TempWorkspace::new(tag);
        let webhook = Arc::new(RecordingWebhook::default());
        let alarm = Arc::new(RecordingAlarm::default());
        let state = AppState::new(workspace.root.clone())
            .expect("bootstrap app state")
            .with_gateway(Arc::new(InMemoryCalendarGateway::with_appointments(
                appointments,
            )))
            .with_webhook(Arc::clone(&webhook) as Arc<dyn WebhookNotifier>)
            .with_alarm(Arc::clone(&alarm) as Arc<dyn AlarmService>)
            .with_approval_delay(Duration::ZERO)
            .with_now_provider(Arc::new(|| denver("2026-02-16T09:05:00-07:00")));
        Harness {
            _workspace: workspace,
            state,
            webhook,
            alarm,
        }
    }

    fn standup() -> Appointment {
        Appointment {
            id: "apt-standup".to_string(),
            summary: Some("standup".to_string()),
            start_time: denver("2026-02-16T11:00:00-07:00"),
            end_time: denver("2026-02-16T12:00:00-07:00"),
        }
    }

    #[tokio::test]
    async fn generate_then_today_shows_blocks_and_appointments() {
        let harness = harness("generate", vec![standup()]);

        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        assert_eq!(generated.created.len(), 7);
        assert_eq!(generated.verified, vec!["primary".to_string()]);
        assert!(generated
            .created
            .iter()
            .all(|block| block.source_type == "auto" && !block.approved));

        let today = get_today_impl(&harness.state).await.expect("today view");
        assert_eq!(today.blocks.len(), 7);
        assert_eq!(today.appointments.len(), 1);
        assert_eq!(today.appointments[0].id, "apt-standup");
    }

    #[tokio::test]
    async fn empty_day_regenerates_on_first_today_fetch() {
        let harness = harness("implicit-regen", Vec::new());

        let today = get_today_impl(&harness.state).await.expect("today view");
        assert!(!today.blocks.is_empty());
        assert!(today.blocks.iter().all(|block| block.source_type == "auto"));
    }

    #[tokio::test]
    async fn unsnapped_update_reports_the_applied_times() {
        let harness = harness("snapping", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        let target = &generated.created[0];

        let updated = update_block_impl(
            &harness.state,
            &target.id,
            &denver("2026-02-16T09:31:40-07:00").to_rfc3339(),
            &denver("2026-02-16T09:52:10-07:00").to_rfc3339(),
        )
        .await
        .expect("update block");

        assert_eq!(
            updated.snapped_start,
            denver("2026-02-16T09:30:00-07:00").to_rfc3339()
        );
        assert_eq!(
            updated.snapped_end,
            denver("2026-02-16T09:50:00-07:00").to_rfc3339()
        );
        assert_eq!(updated.block.start_time, updated.snapped_start);
        assert_eq!(updated.block.end_time, updated.snapped_end);
    }

    #[tokio::test]
    async fn regeneration_is_stable_across_repeated_calls() {
        let harness = harness("stable", vec![standup()]);

        let first = generate_blocks_impl(&harness.state).await.expect("generate");
        let second = generate_blocks_impl(&harness.state).await.expect("regenerate");

        assert_eq!(second.deleted, first.created.len());
        let times = |blocks: &[BlockView]| {
            blocks
                .iter()
                .map(|block| (block.start_time.clone(), block.end_time.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(times(&second.created), times(&first.created));
    }

    #[tokio::test]
    async fn shortening_a_block_leaves_a_hidden_excluded_tail() {
        let harness = harness("shorten", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        let target = &generated.created[0];
        // First block runs 09:30-09:55 local.
        assert_eq!(target.start_time, denver("2026-02-16T09:30:00-07:00").to_rfc3339());

        let updated = update_block_impl(
            &harness.state,
            &target.id,
            &target.start_time,
            &denver("2026-02-16T09:45:00-07:00").to_rfc3339(),
        )
        .await
        .expect("update block");

        assert_eq!(updated.block.source_type, "manual");
        assert!(!updated.block.approved);
        let tail = updated.excluded_tail.expect("tail exists");
        assert_eq!(tail.source_type, "excluded");
        assert_eq!(tail.start_time, denver("2026-02-16T09:45:00-07:00").to_rfc3339());
        assert_eq!(tail.end_time, target.end_time);

        // The tail never shows up in the today view.
        let today = get_today_impl(&harness.state).await.expect("today view");
        assert!(today.blocks.iter().all(|block| block.id != tail.id));

        // And regeneration refuses to schedule into the abandoned span.
        let regenerated = generate_blocks_impl(&harness.state).await.expect("regenerate");
        for block in &regenerated.created {
            assert!(
                block.end_time <= denver("2026-02-16T09:40:00-07:00").to_rfc3339()
                    || block.start_time >= denver("2026-02-16T10:00:00-07:00").to_rfc3339()
            );
        }
    }

    #[tokio::test]
    async fn update_rejects_conflicts_and_bad_input() {
        let harness = harness("update-errors", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        let first = &generated.created[0];
        let second = &generated.created[1];

        // Stretch the first block over the second.
        let result = update_block_impl(
            &harness.state,
            &first.id,
            &first.start_time,
            &second.end_time,
        )
        .await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        let result =
            update_block_impl(&harness.state, "blk-missing", &first.start_time, &first.end_time)
                .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));

        let result =
            update_block_impl(&harness.state, &first.id, "not-a-timestamp", &first.end_time).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn approve_all_persists_and_fires_side_effects() {
        let harness = harness("approve", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");

        let approved = approve_all_impl(&harness.state).await.expect("approve all");
        assert_eq!(approved.approved.len(), generated.created.len());
        assert_eq!(approved.side_effect_failures, 0);

        let today = get_today_impl(&harness.state).await.expect("today view");
        assert!(today
            .blocks
            .iter()
            .all(|block| block.approved && block.source_type == "approved"));
        assert_eq!(
            harness.webhook.calls.lock().expect("webhook lock").len(),
            generated.created.len()
        );
        assert_eq!(
            harness.alarm.calls.lock().expect("alarm lock").len(),
            generated.created.len()
        );
    }

    #[tokio::test]
    async fn deleted_blocks_disappear_but_stay_blocked() {
        let harness = harness("delete", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        let target = generated.created[0].clone();

        delete_block_impl(&harness.state, &target.id).await.expect("delete block");
        // Deleting twice is fine.
        delete_block_impl(&harness.state, &target.id).await.expect("repeat delete");

        let today = get_today_impl(&harness.state).await.expect("today view");
        assert!(today.blocks.iter().all(|block| block.id != target.id));

        let regenerated = generate_blocks_impl(&harness.state).await.expect("regenerate");
        for block in &regenerated.created {
            assert!(
                block.end_time <= target.start_time || block.start_time >= target.end_time,
                "regenerated block {} overlaps the excluded span",
                block.id
            );
        }
    }

    #[tokio::test]
    async fn manual_side_effect_commands_resolve_blocks_by_id() {
        let harness = harness("side-effects", Vec::new());
        let generated = generate_blocks_impl(&harness.state).await.expect("generate");
        let target = &generated.created[0];

        set_alarm_impl(&harness.state, &target.id).await.expect("set alarm");
        notify_webhook_impl(&harness.state, &target.id)
            .await
            .expect("notify webhook");
        assert_eq!(
            *harness.alarm.calls.lock().expect("alarm lock"),
            vec![target.id.clone()]
        );
        assert_eq!(
            *harness.webhook.calls.lock().expect("webhook lock"),
            vec![target.id.clone()]
        );

        assert!(matches!(
            set_alarm_impl(&harness.state, "blk-missing").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            notify_webhook_impl(&harness.state, "blk-missing").await,
            Err(CoreError::NotFound(_))
        ));
    }
}
