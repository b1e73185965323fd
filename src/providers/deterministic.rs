use std::time::Instant;

use async_trait::async_trait;

use super::{ExtractionProvider, ProviderError};
use crate::models::{ExtractionInput, ExtractionResult, ModelInfo, ProviderStatus};
use crate::pipeline::deterministic::{self, EngineConfig};

const MODEL_NAME: &str = "rules-v1";

/// The rule-based engine. Always available, never summarises.
pub struct DeterministicProvider {
    id: String,
    engine: EngineConfig,
}

impl DeterministicProvider {
    pub fn new(id: &str, engine: EngineConfig) -> Self {
        Self {
            id: id.to_string(),
            engine,
        }
    }
}

#[async_trait]
impl ExtractionProvider for DeterministicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_summary(&self) -> bool {
        false
    }

    async fn check_availability(&self) -> ProviderStatus {
        ProviderStatus::available(&self.id, Some(self.model_info().await))
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResult, ProviderError> {
        let started = Instant::now();
        let mut result = deterministic::extract(input, &self.engine);
        result.provider = self.id.clone();
        result.model = MODEL_NAME.to_string();
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: MODEL_NAME.to_string(),
            size: None,
            description: Some("Pattern and keyword based extraction".to_string()),
        }
    }
}
