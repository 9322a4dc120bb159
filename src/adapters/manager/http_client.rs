//! reqwest client for the manager service.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::errors::ManagerApiError;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AccountLicense, AlertData, ManagerConfig, VerificationKind};
use crate::domain::ports::{VerificationManager, WorkflowNotification};

/// Envelope the manager wraps every response in.
#[derive(Debug, Deserialize)]
struct RestResponse<T> {
    resource: T,
}

/// Manager client with connection pooling, a shared rate limiter and
/// exponential backoff on transient failures.
pub struct HttpVerificationManager {
    http_client: ReqwestClient,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl HttpVerificationManager {
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
        let burst = NonZeroU32::new(config.burst_size).context("burst_size must be positive")?;
        let quota = Quota::with_period(period)
            .context("requests_per_second too high for a rate limit period")?
            .allow_burst(burst);

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        })
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, ManagerApiError> {
        let mut request = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(ManagerApiError::from_status(status, body));
        }

        let envelope: RestResponse<T> = response.json().await?;
        Ok(envelope.resource)
    }

    /// Rate limited call, retried with exponential backoff while the error is transient.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, ManagerApiError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build();
        let attempts = AtomicU32::new(0);

        backoff::future::retry(policy, || async {
            self.rate_limiter.until_ready().await;
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            match self.send_once(method.clone(), path, query, body.as_ref()).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(path, attempt, error = %e, "transient manager error, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

#[async_trait]
impl VerificationManager for HttpVerificationManager {
    #[instrument(skip(self), err)]
    async fn trigger_data_collection(
        &self,
        config_id: &str,
        kind: VerificationKind,
        state_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let body = json!({
            "cvConfigId": config_id,
            "verificationKind": kind.as_str(),
            "stateType": state_type,
            "startTime": start.timestamp_millis(),
            "endTime": end.timestamp_millis(),
        });
        Ok(self.call(Method::POST, "/cv/data-collection/trigger", &[], Some(body)).await?)
    }

    #[instrument(skip(self), err)]
    async fn trigger_workflow_data_collection(&self, context_id: &str, start_minute: i64) -> DomainResult<bool> {
        let path = format!("/cv/workflow/{context_id}/data-collection");
        Ok(self
            .call(Method::POST, &path, &[("startDataCollectionMinute", start_minute.to_string())], None)
            .await?)
    }

    #[instrument(skip(self, payload), err)]
    async fn collect_cv_data(&self, collection_task_id: Uuid, payload: &serde_json::Value) -> DomainResult<bool> {
        let path = format!("/cv/collection-tasks/{collection_task_id}/collect");
        Ok(self.call(Method::POST, &path, &[], Some(payload.clone())).await?)
    }

    #[instrument(skip(self, alert), err)]
    async fn open_alert(&self, config_id: &str, alert: &AlertData) -> DomainResult<()> {
        let body = serde_json::to_value(alert)?;
        let opened: bool = self
            .call(Method::POST, "/cv/alerts/open", &[("cvConfigId", config_id.to_string())], Some(body))
            .await?;
        debug!(config_id, opened, "alert open sent");
        Ok(())
    }

    #[instrument(skip(self, alert), err)]
    async fn close_alert(&self, config_id: &str, alert: &AlertData) -> DomainResult<()> {
        let body = serde_json::to_value(alert)?;
        let closed: bool = self
            .call(Method::POST, "/cv/alerts/close", &[("cvConfigId", config_id.to_string())], Some(body))
            .await?;
        debug!(config_id, closed, "alert close sent");
        Ok(())
    }

    #[instrument(skip(self), fields(state_execution_id = %notification.state_execution_id), err)]
    async fn notify_workflow(&self, notification: &WorkflowNotification) -> DomainResult<()> {
        let body = serde_json::to_value(notification)?;
        let _: bool = self.call(Method::POST, "/cv/workflow/notify", &[], Some(body)).await?;
        Ok(())
    }

    async fn is_state_valid(&self, app_id: &str, state_execution_id: &str) -> DomainResult<bool> {
        let query = [("appId", app_id.to_string()), ("stateExecutionId", state_execution_id.to_string())];
        Ok(self.call(Method::GET, "/cv/state-valid", &query, None).await?)
    }

    async fn is_feature_enabled(&self, feature: &str, account_id: &str) -> DomainResult<bool> {
        let query = [("featureName", feature.to_string()), ("accountId", account_id.to_string())];
        Ok(self.call(Method::GET, "/cv/feature-enabled", &query, None).await?)
    }

    async fn account_license(&self, account_id: &str) -> DomainResult<Option<AccountLicense>> {
        let query = [("accountId", account_id.to_string())];
        Ok(self.call(Method::GET, "/cv/account-license", &query, None).await?)
    }

    async fn has_user_feedback(&self, config_id: &str) -> DomainResult<bool> {
        let query = [("cvConfigId", config_id.to_string())];
        let feedback: Vec<serde_json::Value> = self.call(Method::GET, "/cv/feedback", &query, None).await?;
        Ok(!feedback.is_empty())
    }
}
