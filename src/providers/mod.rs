//! Interchangeable extraction backends behind one async contract.

pub mod cloud;
pub mod deterministic;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::lifecycle::LifecycleManager;
use crate::models::{
    CloudVendor, ExtractionInput, ExtractionResult, ModelInfo, ProviderConfig, ProviderStatus,
    ProviderType,
};
use crate::pipeline::deterministic::EngineConfig;

pub use cloud::CloudModelProvider;
pub use deterministic::DeterministicProvider;
pub use local::LocalModelProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no entities extracted")]
    EmptyResult,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl ProviderError {
    /// Whether the orchestrator may fall back to the next provider.
    /// Cancellation ends the whole request.
    pub fn is_soft(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Classify a transport failure from `reqwest`.
    pub(crate) fn from_http(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else if e.is_connect() {
            Self::Unavailable(format!("connection refused ({e})"))
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Cap on error bodies kept from a backend response.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Fail on non-2xx responses, keeping a bounded slice of the body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

/// One extraction backend. Implementations are stateless between calls
/// apart from connection pools.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    fn id(&self) -> &str;

    fn supports_summary(&self) -> bool;

    /// Cheap reachability check with no side effects beyond the probe
    /// itself (and, for a managed local server, starting it).
    async fn check_availability(&self) -> ProviderStatus;

    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResult, ProviderError>;

    async fn model_info(&self) -> ModelInfo;
}

/// Shared collaborators handed to every provider built from config.
#[derive(Clone, Default)]
pub struct ProviderDeps {
    pub engine: EngineConfig,
    pub lifecycle: Option<Arc<LifecycleManager>>,
}

/// Construct the backend described by `config`.
pub fn build_provider(
    config: &ProviderConfig,
    deps: &ProviderDeps,
) -> Result<Arc<dyn ExtractionProvider>, ProviderError> {
    let provider: Arc<dyn ExtractionProvider> = match config.provider_type {
        ProviderType::Deterministic => Arc::new(DeterministicProvider::new(&config.id, deps.engine)),
        ProviderType::LocalModel => Arc::new(LocalModelProvider::new(config, deps.lifecycle.clone())?),
        ProviderType::CloudModel => {
            let vendor: CloudVendor = config.settings.vendor.ok_or_else(|| {
                ProviderError::InvalidConfig(format!("provider '{}' has no cloud vendor", config.id))
            })?;
            Arc::new(CloudModelProvider::new(config, vendor)?)
        }
    };
    Ok(provider)
}
