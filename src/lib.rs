pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    approve_all_impl, delete_block_impl, generate_blocks_impl, get_today_impl,
    notify_webhook_impl, set_alarm_impl, update_block_impl, AppState, ApproveAllResponse,
    AppointmentView, BlockView, DeleteBlockResponse, GenerateBlocksResponse,
    NotifyWebhookResponse, SetAlarmResponse, TodayResponse, UpdateBlockResponse,
};
pub use domain::models::{Appointment, SourceType, TimeBlock};
pub use infrastructure::error::CoreError;
