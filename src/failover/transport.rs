use crate::config::FailoverConfig;
use crate::protocol::{ENDPOINT_INTENT, StandardResult, WorkerIntent};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// One request/reply exchange with one Storage Engine instance.
#[async_trait]
pub trait IntentTransport: Send + Sync {
    async fn send(&self, target: &str, intent: &WorkerIntent) -> Result<StandardResult>;
}

/// Delivers intents as `POST /internal/intent` requests.
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FailoverConfig) -> Result<Self> {
        // The reply wait is bounded per attempt by `Failover`.
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.send_timeout)
            .build()
            .context("building storage HTTP client")?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl IntentTransport for HttpTransport {
    async fn send(&self, target: &str, intent: &WorkerIntent) -> Result<StandardResult> {
        let url = format!("http://{}{}", target, ENDPOINT_INTENT);
        let response = self.http_client.post(&url).json(intent).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("{} answered {}", target, status);
        }

        // Storage replies carry a StandardResult even on 500.
        response
            .json::<StandardResult>()
            .await
            .with_context(|| format!("decoding reply from {}", target))
    }
}
