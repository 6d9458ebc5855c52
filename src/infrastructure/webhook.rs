use crate::domain::models::TimeBlock;
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono_tz::Tz;
use chrono::Timelike;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall-clock payload delivered to the automation webhook when a block is
/// approved. Receivers key automations off local hours and minutes, so the
/// payload carries those instead of timestamps.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockNotification {
    pub block_id: String,
    pub start_hour: u32,
    pub start_min: u32,
    pub end_hour: u32,
    pub end_min: u32,
}

impl BlockNotification {
    pub fn from_block(block: &TimeBlock, zone: Tz) -> Self {
        let start = block.start_time.with_timezone(&zone);
        let end = block.end_time.with_timezone(&zone);
        Self {
            block_id: block.id.clone(),
            start_hour: start.hour(),
            start_min: start.minute(),
            end_hour: end.hour(),
            end_min: end.minute(),
        }
    }
}

#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    /// Delivers the notification and returns the receiver's response body.
    async fn notify(&self, notification: &BlockNotification) -> Result<String, CoreError>;
}

#[derive(Debug, Clone)]
pub struct HttpWebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl HttpWebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url,
        }
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, notification: &BlockNotification) -> Result<String, CoreError> {
        let Some(raw_url) = self.url.as_deref() else {
            return Err(CoreError::Upstream("no webhook url configured".to_string()));
        };
        let url = Url::parse(raw_url)
            .map_err(|error| CoreError::InvalidConfig(format!("invalid webhook url '{raw_url}': {error}")))?;
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("webhook request failed: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Upstream(format!("webhook response unreadable: {error}")))?;
        if !status.is_success() {
            return Err(CoreError::Upstream(format!(
                "webhook returned http {}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}
