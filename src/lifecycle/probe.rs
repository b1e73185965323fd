use std::time::Duration;

use async_trait::async_trait;

use crate::config::http_endpoint;

/// Timeout for one liveness check.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers "is a model server reachable right now?".
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

/// `GET /api/tags` against the local endpoint. Any 2xx is healthy.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_timeout(host, port, HEALTH_PROBE_TIMEOUT)
    }

    pub fn with_timeout(host: &str, port: u16, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: format!("{}/api/tags", http_endpoint(host, port)),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::trace!(error = %e, "Health probe failed");
                false
            }
        }
    }
}
