pub mod error;
pub mod time_bucket;
pub mod types;

pub use error::{FlowcoreError, Result};
pub use time_bucket::{TimeBucket, TimeBucketError};
pub use types::{EventPage, RawEvent};

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::OnceCell;

pub const DEFAULT_BASE_URL: &str = "https://event-source.api.flowcore.io";

/// Name of the production data core. Refused when running in dev mode.
pub const PRODUCTION_DATA_CORE: &str = "calendrun";

/// Per-attempt timeout plus fixed-delay retry for network failures
/// (timeouts included) and 5xx answers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            delay: Duration::from_millis(250),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowcoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub tenant: String,
    pub data_core: String,
    pub dev_mode: bool,
}

pub struct FlowcoreClient {
    client: reqwest::Client,
    config: FlowcoreConfig,
    retry: RetryPolicy,
    data_core_id: OnceCell<String>,
}

impl FlowcoreClient {
    pub fn new(config: FlowcoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            retry: RetryPolicy::default(),
            data_core_id: OnceCell::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tenant(&self) -> &str {
        &self.config.tenant
    }

    pub fn data_core_name(&self) -> &str {
        &self.config.data_core
    }

    /// Resolve the configured data-core name to its opaque id.
    ///
    /// Resolved once per client; later calls return the cached id. In dev
    /// mode the production data core is refused before any request is made.
    pub async fn data_core_id(&self) -> Result<String> {
        let id = self
            .data_core_id
            .get_or_try_init(|| self.resolve_data_core())
            .await?;
        Ok(id.clone())
    }

    async fn resolve_data_core(&self) -> Result<String> {
        let name = self.config.data_core.clone();
        let mode = if self.config.dev_mode { "DEV" } else { "PRODUCTION" };

        if self.config.dev_mode && name == PRODUCTION_DATA_CORE {
            return Err(FlowcoreError::SafetyCheck(format!(
                "DEV_MODE is enabled but FLOWCORE_DATA_CORE is the production data core \"{PRODUCTION_DATA_CORE}\""
            )));
        }

        let url = format!(
            "{}/api/v1/tenants/{}/data-cores/{}",
            self.config.base_url, self.config.tenant, name
        );

        let body = self.get_json(&url, &[]).await.map_err(|e| {
            tracing::error!(mode, data_core = %name, error = %e, "Failed to resolve data core");
            FlowcoreError::DataCoreResolution {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        let id = types::normalize_data_core_id(&body).ok_or_else(|| {
            FlowcoreError::DataCoreResolution {
                name: name.clone(),
                reason: "response carried no id".to_string(),
            }
        })?;

        tracing::info!(mode, data_core = %name, data_core_id = %id, "Resolved data core");
        Ok(id)
    }

    /// Fetch one page of events of a single type from one time bucket.
    pub async fn fetch_events(
        &self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<EventPage> {
        let data_core_id = self.data_core_id().await?;

        let mut query = vec![
            ("tenant", self.config.tenant.clone()),
            ("dataCoreId", data_core_id),
            ("flowType", flow_type.to_string()),
            ("eventTypes", event_type.to_string()),
            ("timeBucket", bucket.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let url = format!("{}/api/v1/events", self.config.base_url);
        let body = self.get_json(&url, &query).await?;

        let page = types::normalize_event_page(&body, flow_type, event_type, bucket, Utc::now());
        tracing::debug!(
            flow_type,
            event_type,
            bucket = %bucket,
            count = page.events.len(),
            has_more = page.next_cursor.is_some(),
            "Fetched event page"
        );
        Ok(page)
    }

    /// List buckets holding at least one event of the given type, ascending.
    pub async fn list_time_buckets(
        &self,
        flow_type: &str,
        event_type: &str,
        from: Option<&TimeBucket>,
        to: Option<&TimeBucket>,
        page_size: u32,
    ) -> Result<Vec<TimeBucket>> {
        let data_core_id = self.data_core_id().await?;

        let mut query = vec![
            ("tenant", self.config.tenant.clone()),
            ("dataCoreId", data_core_id),
            ("flowType", flow_type.to_string()),
            ("eventTypes", event_type.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(from) = from {
            query.push(("fromTimeBucket", from.to_string()));
        }
        if let Some(to) = to {
            query.push(("toTimeBucket", to.to_string()));
        }

        let url = format!("{}/api/v1/time-buckets", self.config.base_url);
        let body = self.get_json(&url, &query).await.inspect_err(|e| {
            tracing::error!(flow_type, event_type, error = %e, "Failed to list time buckets");
        })?;

        Ok(types::normalize_time_buckets(&body))
    }

    /// GET with the client's retry policy applied to retryable failures.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.get_json_once(url, query).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(url, attempt, error = %e, "Retrying event-source request");
                    tokio::time::sleep(self.retry.delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_json_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .query(query)
            .timeout(self.retry.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FlowcoreError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
