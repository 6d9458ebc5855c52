use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRequest {
    pub block_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[async_trait]
pub trait AlarmService: Send + Sync {
    async fn set_alarm(&self, request: &AlarmRequest) -> Result<(), CoreError>;
}

/// Posts the alarm to each configured endpoint in order and stops at the
/// first success. Endpoints are typically a primary device plus fallbacks
/// on the same LAN, so per-endpoint failures are expected and only the
/// all-failed case surfaces as an error.
#[derive(Debug, Clone)]
pub struct HttpAlarmService {
    client: Client,
    endpoints: Vec<String>,
}

impl HttpAlarmService {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            endpoints,
        }
    }

    async fn try_endpoint(&self, endpoint: &str, request: &AlarmRequest) -> Result<(), CoreError> {
        let url = Url::parse(endpoint)
            .map_err(|error| CoreError::InvalidConfig(format!("invalid alarm endpoint '{endpoint}': {error}")))?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("alarm request failed: {error}")))?;
        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "alarm endpoint returned http {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AlarmService for HttpAlarmService {
    async fn set_alarm(&self, request: &AlarmRequest) -> Result<(), CoreError> {
        if self.endpoints.is_empty() {
            return Err(CoreError::Upstream(
                "no alarm endpoints configured".to_string(),
            ));
        }
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self.try_endpoint(endpoint, request).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(endpoint = %endpoint, %error, "alarm endpoint failed, trying next");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CoreError::Upstream("all alarm endpoints failed".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> AlarmRequest {
        AlarmRequest {
            block_id: "blk-1".to_string(),
            start_time: DateTime::parse_from_rfc3339("2026-02-16T16:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
            end_time: DateTime::parse_from_rfc3339("2026-02-16T16:50:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_endpoint_on_failure() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/alarm-down")
            .with_status(503)
            .create_async()
            .await;
        let working = server
            .mock("POST", "/alarm-up")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let service = HttpAlarmService::new(vec![
            format!("{}/alarm-down", server.url()),
            format!("{}/alarm-up", server.url()),
        ]);
        service
            .set_alarm(&sample_request())
            .await
            .expect("fallback endpoint succeeds");

        failing.assert_async().await;
        working.assert_async().await;
    }

    #[tokio::test]
    async fn all_endpoints_failing_surfaces_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/alarm")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let service = HttpAlarmService::new(vec![
            format!("{}/alarm", server.url()),
            format!("{}/alarm", server.url()),
        ]);
        let result = service.set_alarm(&sample_request()).await;
        assert!(matches!(result, Err(CoreError::Upstream(_))));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_service_is_an_upstream_error() {
        let service = HttpAlarmService::new(Vec::new());
        let result = service.set_alarm(&sample_request()).await;
        assert!(matches!(result, Err(CoreError::Upstream(_))));
    }
}
