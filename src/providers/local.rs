use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{check_status, ExtractionProvider, ProviderError};
use crate::config::{http_endpoint, is_loopback_host, DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_PORT};
use crate::lifecycle::LifecycleManager;
use crate::models::{ExtractionInput, ExtractionResult, ModelInfo, ProviderConfig, ProviderStatus};
use crate::pipeline::structuring::{interpret_response, prepare_prompt, PreparedPrompt};

/// Timeout for model listing, independent of the generation timeout.
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("Invalid model name regex")
});

/// Reject model names outside `[namespace/]model[:tag]` before any request.
pub fn validate_model_name(name: &str) -> Result<(), ProviderError> {
    if MODEL_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ProviderError::InvalidConfig(format!("invalid model name '{name}'")))
    }
}

/// `llama3` matches an installed `llama3:latest`; a tagged name must match exactly.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || (!wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    format: &'static str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

/// One entry of `/api/tags`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// An Ollama server addressed by host and port, on this machine or
/// elsewhere on the network. Loopback servers can be started on demand
/// through the lifecycle manager.
pub struct LocalModelProvider {
    id: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
    lifecycle: Option<Arc<LifecycleManager>>,
}

impl LocalModelProvider {
    pub fn new(
        config: &ProviderConfig,
        lifecycle: Option<Arc<LifecycleManager>>,
    ) -> Result<Self, ProviderError> {
        let settings = &config.settings;
        let host = settings.host.as_deref().unwrap_or(DEFAULT_OLLAMA_HOST);
        let port = settings.port.unwrap_or(DEFAULT_OLLAMA_PORT);
        let model = settings.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
        validate_model_name(model)?;

        let base_url = match &settings.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => http_endpoint(host, port),
        };
        // Only a loopback server on the managed port is ours to start.
        let lifecycle = lifecycle.filter(|lm| {
            settings.base_url.is_none() && is_loopback_host(host) && lm.port() == port
        });

        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            id: config.id.clone(),
            base_url,
            model: model.to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
            client,
            lifecycle,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_managed(&self) -> bool {
        self.lifecycle.is_some()
    }

    /// Models installed on the server (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<InstalledModel>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::from_http(e, TAGS_TIMEOUT))?;
        let tags: TagsResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(tags.models)
    }

    fn status_from_models(&self, models: &[InstalledModel]) -> ProviderStatus {
        match models.iter().find(|m| model_matches(&m.name, &self.model)) {
            Some(m) => ProviderStatus::available(&self.id, Some(self.info_for(Some(m)))),
            None => ProviderStatus::unavailable(
                &self.id,
                format!("model '{}' is not installed", self.model),
            ),
        }
    }

    fn info_for(&self, installed: Option<&InstalledModel>) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            size: installed.and_then(|m| m.size),
            description: Some(format!("Ollama at {}", self.base_url)),
        }
    }

    async fn generate(&self, prompt: &PreparedPrompt) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            model: &self.model,
            system: prompt.system,
            prompt: &prompt.user,
            format: "json",
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http(e, self.timeout))?;
        let parsed: GenerateResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl ExtractionProvider for LocalModelProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_summary(&self) -> bool {
        true
    }

    async fn check_availability(&self) -> ProviderStatus {
        let first = self.list_models().await;
        let models = match (first, &self.lifecycle) {
            (Ok(models), _) => models,
            (Err(e), None) => return ProviderStatus::unavailable(&self.id, e.to_string()),
            (Err(_), Some(lifecycle)) => {
                if !lifecycle.ensure_running().await {
                    return ProviderStatus::unavailable(
                        &self.id,
                        "local model server is not running and could not be started",
                    );
                }
                // Start the idle countdown even if no extraction follows.
                lifecycle.reset_idle_timer();
                match self.list_models().await {
                    Ok(models) => models,
                    Err(e) => return ProviderStatus::unavailable(&self.id, e.to_string()),
                }
            }
        };
        self.status_from_models(&models)
    }

    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResult, ProviderError> {
        let prompt = prepare_prompt(input, self.supports_summary());
        let started = Instant::now();
        // The guard pauses the idle countdown and restarts it on drop,
        // whether generation succeeds or not.
        let _active = match &self.lifecycle {
            Some(lifecycle) => {
                let active = lifecycle.begin_request();
                if !lifecycle.ensure_running().await {
                    return Err(ProviderError::Unavailable(
                        "local model server is not running and could not be started".to_string(),
                    ));
                }
                Some(active)
            }
            None => None,
        };
        let raw = self.generate(&prompt).await?;

        let mut result = interpret_response(&raw, input, &prompt);
        result.provider = self.id.clone();
        result.model = self.model.clone();
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            provider = %self.id,
            response_len = raw.len(),
            entities = result.entity_count(),
            elapsed_ms = result.processing_time_ms,
            "Local model extraction complete"
        );
        Ok(result)
    }

    async fn model_info(&self) -> ModelInfo {
        let installed = self.list_models().await.ok().and_then(|models| {
            models
                .into_iter()
                .find(|m| model_matches(&m.name, &self.model))
        });
        self.info_for(installed.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateCategory, ProviderSettings, ProviderType};
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn serve(app: Router) -> (u16, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, handle)
    }

    fn tags_route() -> Router {
        Router::new().route(
            "/api/tags",
            get(|| async {
                Json(json!({"models": [
                    {"name": "qwen2.5:7b", "size": 4683087332u64},
                    {"name": "llama3:latest", "size": 4661224676u64}
                ]}))
            }),
        )
    }

    fn provider(port: u16, model: &str) -> LocalModelProvider {
        let config = ProviderConfig::new("local", "Local", ProviderType::LocalModel, 10).with_settings(
            ProviderSettings {
                host: Some("127.0.0.1".into()),
                port: Some(port),
                model: Some(model.into()),
                timeout_secs: 5,
                ..Default::default()
            },
        );
        LocalModelProvider::new(&config, None).unwrap()
    }

    #[test]
    fn model_name_validation() {
        assert!(validate_model_name("qwen2.5:7b").is_ok());
        assert!(validate_model_name("library/llama3:8b-instruct").is_ok());
        assert!(validate_model_name("../etc/passwd").is_err());
        assert!(validate_model_name("a; rm -rf /").is_err());
        assert!(validate_model_name("").is_err());
    }

    #[test]
    fn untagged_model_matches_latest() {
        assert!(model_matches("llama3:latest", "llama3"));
        assert!(model_matches("qwen2.5:7b", "qwen2.5:7b"));
        assert!(!model_matches("qwen2.5:14b", "qwen2.5:7b"));
        assert!(!model_matches("qwen2.5:7b", "qwen2.5"));
    }

    #[test]
    fn remote_host_is_never_managed() {
        let config = ProviderConfig::new("lan", "LAN", ProviderType::LocalModel, 10).with_settings(
            ProviderSettings {
                host: Some("192.168.1.40".into()),
                ..Default::default()
            },
        );
        let lifecycle = crate::lifecycle::LifecycleManager::new(crate::lifecycle::LifecycleConfig {
            port: DEFAULT_OLLAMA_PORT,
            binary: None,
            pid_file: std::env::temp_dir().join("archivist-test-unused.pid"),
            idle_timeout: Duration::from_secs(300),
            startup_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        });
        let provider = LocalModelProvider::new(&config, Some(lifecycle)).unwrap();
        assert!(!provider.is_managed());
        assert_eq!(provider.base_url(), "http://192.168.1.40:11434");
    }

    #[tokio::test]
    async fn availability_reports_installed_model() {
        let (port, server) = serve(tags_route()).await;
        let status = provider(port, "qwen2.5:7b").check_availability().await;
        assert!(status.available, "{:?}", status.error);
        assert_eq!(status.model_info.unwrap().size, Some(4683087332));

        let missing = provider(port, "mistral").check_availability().await;
        assert!(!missing.available);
        assert!(missing.error.unwrap().contains("not installed"));
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let status = provider(port, "qwen2.5:7b").check_availability().await;
        assert!(!status.available);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn extract_sends_json_request_and_parses_reply() {
        let app = tags_route().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["format"], "json");
                assert_eq!(body["stream"], false);
                assert_eq!(body["model"], "qwen2.5:7b");
                assert!(body["prompt"].as_str().unwrap().contains("<document>"));
                let reply = json!({
                    "dates": [{"rawText": "1923", "parsedDate": "1923", "precision": "year",
                               "category": "build_date", "confidence": 92,
                               "context": "The factory was built in 1923."}],
                    "summary": "A factory built in 1923."
                });
                Json(json!({"response": format!("```json\n{reply}\n```"), "done": true}))
            }),
        );
        let (port, server) = serve(app).await;
        let input = ExtractionInput::new("The factory was built in 1923.");
        let result = provider(port, "qwen2.5:7b").extract(&input).await.unwrap();
        assert_eq!(result.provider, "local");
        assert_eq!(result.model, "qwen2.5:7b");
        assert_eq!(result.dates[0].category, DateCategory::BuildDate);
        assert!((result.dates[0].confidence - 0.92).abs() < 1e-6);
        assert_eq!(result.summary.as_deref(), Some("A factory built in 1923."));
        server.abort();
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model failed to load") }),
        );
        let (port, server) = serve(app).await;
        let err = provider(port, "qwen2.5:7b")
            .extract(&ExtractionInput::new("text"))
            .await
            .unwrap_err();
        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("failed to load"));
            }
            other => panic!("unexpected {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn prose_reply_is_an_empty_result_with_warning() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({"response": "I could not find anything."})) }),
        );
        let (port, server) = serve(app).await;
        let result = provider(port, "qwen2.5:7b")
            .extract(&ExtractionInput::new("text"))
            .await
            .unwrap();
        assert!(!result.is_usable());
        assert_eq!(result.warnings.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn managed_extract_uses_a_server_already_running() {
        let reply = json!({"people": [{"name": "Ada Byron", "confidence": 0.8}]});
        let app = tags_route().route(
            "/api/generate",
            post(move || {
                let reply = reply.clone();
                async move { Json(json!({"response": reply.to_string()})) }
            }),
        );
        let (port, server) = serve(app).await;
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = crate::lifecycle::LifecycleManager::new(crate::lifecycle::LifecycleConfig {
            port,
            binary: None,
            pid_file: dir.path().join("server.pid"),
            idle_timeout: Duration::from_secs(300),
            startup_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        });
        let config = ProviderConfig::new("local", "Local", ProviderType::LocalModel, 10).with_settings(
            ProviderSettings {
                port: Some(port),
                model: Some("qwen2.5:7b".into()),
                timeout_secs: 5,
                ..Default::default()
            },
        );
        let provider = LocalModelProvider::new(&config, Some(Arc::clone(&lifecycle))).unwrap();
        assert!(provider.is_managed());

        let input = ExtractionInput::new("Letter from Ada Byron, 1843.");
        let result = provider.extract(&input).await.unwrap();
        assert_eq!(result.people[0].name, "Ada Byron");
        // Found running, so nothing was spawned and nothing is owned.
        assert!(!lifecycle.owns_server());
        assert!(!dir.path().join("server.pid").exists());
        server.abort();
    }
}
