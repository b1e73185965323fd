use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{CloudVendor, ProviderType};
use super::extraction::ModelInfo;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

fn default_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_enabled() -> bool {
    true
}

/// Backend-specific settings. Local providers use host/port/model,
/// cloud providers use vendor/api_key/model. Every provider has a timeout.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<CloudVendor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the vendor's public endpoint (proxies, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            model: None,
            vendor: None,
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// API keys never reach logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("model", &self.model)
            .field("vendor", &self.vendor)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Registry entry for one extraction backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower is tried first.
    pub priority: i32,
    #[serde(default)]
    pub settings: ProviderSettings,
}

impl ProviderConfig {
    pub fn new(id: &str, name: &str, provider_type: ProviderType, priority: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider_type,
            enabled: true,
            priority,
            settings: ProviderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs.max(1))
    }
}

/// Partial update applied by `Orchestrator::update_provider_config`.
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfigPatch {
    /// Apply onto `config`. Returns true when a setting that affects the
    /// backend connection changed, so callers know to rebuild the provider.
    pub fn apply(&self, config: &mut ProviderConfig) -> bool {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }

        let before = config.settings.clone();
        let s = &mut config.settings;
        if let Some(host) = &self.host {
            s.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            s.port = Some(port);
        }
        if let Some(model) = &self.model {
            s.model = Some(model.clone());
        }
        if let Some(key) = &self.api_key {
            s.api_key = Some(key.clone());
        }
        if let Some(url) = &self.base_url {
            s.base_url = Some(url.clone());
        }
        if let Some(timeout) = self.timeout_secs {
            s.timeout_secs = timeout;
        }
        before != config.settings
    }
}

/// Cached availability snapshot for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub id: String,
    pub available: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

impl ProviderStatus {
    pub fn available(id: &str, model_info: Option<ModelInfo>) -> Self {
        Self {
            id: id.to_string(),
            available: true,
            last_checked: Utc::now(),
            error: None,
            model_info,
        }
    }

    pub fn unavailable(id: &str, error: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            available: false,
            last_checked: Utc::now(),
            error: Some(error.into()),
            model_info: None,
        }
    }

    /// Older than `ttl` relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.last_checked >= ttl,
            Err(_) => false,
        }
    }
}
