use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{check_status, ExtractionProvider, ProviderError};
use crate::models::{
    CloudVendor, ExtractionInput, ExtractionResult, ModelInfo, ProviderConfig, ProviderStatus,
};
use crate::pipeline::structuring::{interpret_response, prepare_prompt, PreparedPrompt};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

impl CloudVendor {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-flash",
        }
    }
}

/// Pull the generated text out of a vendor response envelope.
fn response_text(vendor: CloudVendor, body: &Value) -> Option<&str> {
    match vendor {
        CloudVendor::Anthropic => body["content"]
            .as_array()?
            .iter()
            .find(|block| block["type"] == "text")?["text"]
            .as_str(),
        CloudVendor::OpenAi => body["choices"][0]["message"]["content"].as_str(),
        CloudVendor::Gemini => body["candidates"][0]["content"]["parts"][0]["text"].as_str(),
    }
}

/// A hosted model API. Vendors differ only in URL, auth header, request
/// envelope and where the text sits in the reply.
pub struct CloudModelProvider {
    id: String,
    vendor: CloudVendor,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl CloudModelProvider {
    pub fn new(config: &ProviderConfig, vendor: CloudVendor) -> Result<Self, ProviderError> {
        let settings = &config.settings;
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidConfig(format!("provider '{}' has no API key", config.id))
            })?;
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            id: config.id.clone(),
            vendor,
            api_key: api_key.to_string(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| vendor.default_model().to_string()),
            base_url: settings
                .base_url
                .as_deref()
                .unwrap_or(vendor.default_base_url())
                .trim_end_matches('/')
                .to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
            client,
        })
    }

    pub fn vendor(&self) -> CloudVendor {
        self.vendor
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.vendor {
            CloudVendor::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            CloudVendor::OpenAi => request.bearer_auth(&self.api_key),
            CloudVendor::Gemini => request.header("x-goog-api-key", &self.api_key),
        }
    }

    fn generate_request(&self, prompt: &PreparedPrompt) -> reqwest::RequestBuilder {
        let (url, body) = match self.vendor {
            CloudVendor::Anthropic => (
                format!("{}/v1/messages", self.base_url),
                json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "system": prompt.system,
                    "messages": [{"role": "user", "content": prompt.user}],
                }),
            ),
            CloudVendor::OpenAi => (
                format!("{}/v1/chat/completions", self.base_url),
                json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "response_format": {"type": "json_object"},
                    "messages": [
                        {"role": "system", "content": prompt.system},
                        {"role": "user", "content": prompt.user},
                    ],
                }),
            ),
            CloudVendor::Gemini => (
                format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model),
                json!({
                    "systemInstruction": {"parts": [{"text": prompt.system}]},
                    "contents": [{"role": "user", "parts": [{"text": prompt.user}]}],
                    "generationConfig": {
                        "temperature": self.temperature,
                        "maxOutputTokens": self.max_tokens,
                        "responseMimeType": "application/json",
                    },
                }),
            ),
        };
        self.authorize(self.client.post(url)).json(&body)
    }

    fn models_url(&self) -> String {
        match self.vendor {
            CloudVendor::Anthropic | CloudVendor::OpenAi => format!("{}/v1/models", self.base_url),
            CloudVendor::Gemini => format!("{}/v1beta/models", self.base_url),
        }
    }

    async fn generate(&self, prompt: &PreparedPrompt) -> Result<String, ProviderError> {
        let resp = self
            .generate_request(prompt)
            .send()
            .await
            .map_err(|e| ProviderError::from_http(e, self.timeout))?;
        let body: Value = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        response_text(self.vendor, &body)
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::MalformedResponse(format!(
                    "{} response has no generated text",
                    self.vendor
                ))
            })
    }
}

#[async_trait]
impl ExtractionProvider for CloudModelProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_summary(&self) -> bool {
        true
    }

    async fn check_availability(&self) -> ProviderStatus {
        let sent = self
            .authorize(self.client.get(self.models_url()))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match sent {
            Ok(resp) if resp.status().is_success() => {
                ProviderStatus::available(&self.id, Some(self.model_info().await))
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let reason = match status {
                    401 | 403 => "invalid API key".to_string(),
                    _ => format!("model listing returned HTTP {status}"),
                };
                ProviderStatus::unavailable(&self.id, reason)
            }
            Err(e) => ProviderStatus::unavailable(
                &self.id,
                ProviderError::from_http(e, PROBE_TIMEOUT).to_string(),
            ),
        }
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResult, ProviderError> {
        let prompt = prepare_prompt(input, self.supports_summary());
        let started = Instant::now();
        let raw = self.generate(&prompt).await?;

        let mut result = interpret_response(&raw, input, &prompt);
        result.provider = self.id.clone();
        result.model = self.model.clone();
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            provider = %self.id,
            vendor = %self.vendor,
            response_len = raw.len(),
            entities = result.entity_count(),
            elapsed_ms = result.processing_time_ms,
            "Cloud model extraction complete"
        );
        Ok(result)
    }

    async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            size: None,
            description: Some(format!("{} API", self.vendor)),
        }
    }
}
