use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{CloudVendor, ProviderConfig, ProviderSettings, ProviderType};

/// Application-level constants
pub const APP_NAME: &str = "archivist";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_OLLAMA_HOST: &str = "127.0.0.1";
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:7b";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STATUS_TTL_SECS: u64 = 60;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;

pub const DETERMINISTIC_PROVIDER_ID: &str = "deterministic";
pub const LOCAL_PROVIDER_ID: &str = "local-ollama";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Provider file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "archivist=debug"
    } else {
        "archivist=info"
    }
}

/// Per-user application data directory, e.g. `~/.local/share/archivist`.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// PID of the last local model server we spawned.
pub fn pid_file_path() -> PathBuf {
    app_data_dir().join("local-model.pid")
}

pub fn providers_file_path() -> PathBuf {
    app_data_dir().join("providers.json")
}

/// `http://host:port`, bracketing IPv6 literals.
pub fn http_endpoint(host: &str, port: u16) -> String {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.contains(':') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// Whether `host` names this machine's loopback interface. Only loopback
/// endpoints are eligible for an automatically started model server.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub ollama_host: String,
    pub ollama_port: u16,
    pub ollama_model: String,
    /// Explicit server binary; skips discovery when set.
    pub ollama_binary: Option<PathBuf>,
    pub idle_timeout: Duration,
    pub status_ttl: Duration,
    pub min_confidence: f32,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_port: DEFAULT_OLLAMA_PORT,
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_binary: None,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            status_ttl: Duration::from_secs(DEFAULT_STATUS_TTL_SECS),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            anthropic_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve settings through an arbitrary lookup, so tests never touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(host) = get("ARCHIVIST_OLLAMA_HOST") {
            settings.ollama_host = host.trim().to_string();
        }
        if let Some(port) = get("ARCHIVIST_OLLAMA_PORT") {
            settings.ollama_port = parse_env("ARCHIVIST_OLLAMA_PORT", &port)?;
        }
        if let Some(model) = get("ARCHIVIST_OLLAMA_MODEL") {
            settings.ollama_model = model.trim().to_string();
        }
        settings.ollama_binary = get("ARCHIVIST_OLLAMA_BINARY").map(PathBuf::from);
        if let Some(secs) = get("ARCHIVIST_IDLE_TIMEOUT_SECS") {
            settings.idle_timeout =
                Duration::from_secs(parse_env("ARCHIVIST_IDLE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = get("ARCHIVIST_STATUS_TTL_SECS") {
            settings.status_ttl =
                Duration::from_secs(parse_env("ARCHIVIST_STATUS_TTL_SECS", &secs)?);
        }
        if let Some(raw) = get("ARCHIVIST_MIN_CONFIDENCE") {
            let value: f32 = parse_env("ARCHIVIST_MIN_CONFIDENCE", &raw)?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidEnv {
                    var: "ARCHIVIST_MIN_CONFIDENCE",
                    value: raw,
                });
            }
            settings.min_confidence = value;
        }
        settings.anthropic_api_key = get("ANTHROPIC_API_KEY");
        settings.openai_api_key = get("OPENAI_API_KEY");
        settings.gemini_api_key = get("GEMINI_API_KEY");

        Ok(settings)
    }

    /// Default registry: local model first, then any cloud vendor with a key,
    /// then the deterministic engine as the last resort.
    pub fn default_providers(&self) -> Vec<ProviderConfig> {
        let mut providers = vec![ProviderConfig::new(
            LOCAL_PROVIDER_ID,
            "Local model (Ollama)",
            ProviderType::LocalModel,
            10,
        )
        .with_settings(ProviderSettings {
            host: Some(self.ollama_host.clone()),
            port: Some(self.ollama_port),
            model: Some(self.ollama_model.clone()),
            ..Default::default()
        })];

        let cloud = [
            (CloudVendor::Anthropic, &self.anthropic_api_key, "Anthropic"),
            (CloudVendor::OpenAi, &self.openai_api_key, "OpenAI"),
            (CloudVendor::Gemini, &self.gemini_api_key, "Gemini"),
        ];
        let mut priority = 50;
        for (vendor, key, label) in cloud {
            let Some(key) = key else { continue };
            providers.push(
                ProviderConfig::new(
                    &format!("cloud-{}", vendor.as_str()),
                    label,
                    ProviderType::CloudModel,
                    priority,
                )
                .with_settings(ProviderSettings {
                    vendor: Some(vendor),
                    api_key: Some(key.clone()),
                    timeout_secs: 60,
                    ..Default::default()
                }),
            );
            priority += 10;
        }

        let mut deterministic = ProviderConfig::new(
            DETERMINISTIC_PROVIDER_ID,
            "Rule-based extraction",
            ProviderType::Deterministic,
            100,
        );
        deterministic.settings.timeout_secs = 10;
        providers.push(deterministic);
        providers
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}

pub fn load_provider_configs(path: &Path) -> Result<Vec<ProviderConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_provider_configs(path: &Path, configs: &[ProviderConfig]) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(configs)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn pid_file_under_app_data() {
        let pid = pid_file_path();
        assert!(pid.starts_with(app_data_dir()));
        assert!(pid.ends_with("local-model.pid"));
    }

    #[test]
    fn endpoints_bracket_ipv6() {
        assert_eq!(http_endpoint("127.0.0.1", 11434), "http://127.0.0.1:11434");
        assert_eq!(http_endpoint("::1", 11434), "http://[::1]:11434");
        assert_eq!(http_endpoint("[::1]", 80), "http://[::1]:80");
    }

    #[test]
    fn loopback_detection() {
        for host in ["localhost", "LOCALHOST", "127.0.0.1", "127.0.0.2", "::1", "[::1]"] {
            assert!(is_loopback_host(host), "{host}");
        }
        for host in ["192.168.1.40", "ollama.lan", "0.0.0.0", ""] {
            assert!(!is_loopback_host(host), "{host}");
        }
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let settings = EngineSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn env_overrides_are_applied() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("ARCHIVIST_OLLAMA_HOST", "192.168.1.40"),
            ("ARCHIVIST_OLLAMA_PORT", "8080"),
            ("ARCHIVIST_IDLE_TIMEOUT_SECS", "30"),
            ("ARCHIVIST_MIN_CONFIDENCE", "0.5"),
        ]))
        .unwrap();
        assert_eq!(settings.ollama_host, "192.168.1.40");
        assert_eq!(settings.ollama_port, 8080);
        assert_eq!(settings.idle_timeout, Duration::from_secs(30));
        assert!((settings.min_confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = EngineSettings::from_lookup(lookup(&[("ARCHIVIST_OLLAMA_PORT", "abc")]))
            .unwrap_err();
        assert!(err.to_string().contains("ARCHIVIST_OLLAMA_PORT"));
    }

    #[test]
    fn out_of_range_confidence_is_an_error() {
        assert!(
            EngineSettings::from_lookup(lookup(&[("ARCHIVIST_MIN_CONFIDENCE", "1.5")])).is_err()
        );
    }

    #[test]
    fn default_providers_order_and_cloud_keys() {
        let settings =
            EngineSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        let providers = settings.default_providers();
        let ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![LOCAL_PROVIDER_ID, "cloud-openai", DETERMINISTIC_PROVIDER_ID]);
        assert!(providers.windows(2).all(|w| w[0].priority < w[1].priority));
    }

    #[test]
    fn provider_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("providers.json");
        let configs = EngineSettings::default().default_providers();
        save_provider_configs(&path, &configs).unwrap();
        let loaded = load_provider_configs(&path).unwrap();
        assert_eq!(loaded, configs);
    }

    #[test]
    fn missing_provider_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_provider_configs(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
