//! Picks a provider for each request and falls back down the priority
//! list until one produces a usable result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineSettings;
use crate::lifecycle::{LifecycleConfig, LifecycleManager};
use crate::models::{ExtractionInput, ExtractionResult, ProviderConfig, ProviderConfigPatch, ProviderStatus};
use crate::pipeline::deterministic::EngineConfig;
use crate::providers::{build_provider, ExtractionProvider, ProviderDeps, ProviderError};

/// Upper bound on one availability check. A managed local server may
/// need to start inside it.
const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("No extraction providers are configured or enabled")]
    NoProviders,

    #[error("All providers failed: {}", .reasons.join("; "))]
    AllProvidersFailed { reasons: Vec<String> },

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Provider '{0}' already exists")]
    DuplicateProvider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider '{id}' failed: {source}")]
    Provider {
        id: String,
        #[source]
        source: ProviderError,
    },
}

impl OrchestratorError {
    fn provider(id: &str, source: ProviderError) -> Self {
        Self::Provider {
            id: id.to_string(),
            source,
        }
    }
}

/// Per-request routing options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Tried first when enabled; the rest keep their priority order.
    pub preferred_provider: Option<String>,
    /// Skip providers that cannot summarise.
    pub require_summary: bool,
    /// Abandons the request, including any in-flight provider call.
    pub cancel: Option<CancellationToken>,
}

struct Entry {
    config: ProviderConfig,
    provider: Arc<dyn ExtractionProvider>,
    // Registered by the caller rather than built from config; never rebuilt.
    custom: bool,
}

type Candidate = (ProviderConfig, Arc<dyn ExtractionProvider>);

pub struct Orchestrator {
    entries: RwLock<Vec<Entry>>,
    statuses: Mutex<HashMap<String, ProviderStatus>>,
    status_ttl: Duration,
    deps: ProviderDeps,
}

impl Orchestrator {
    /// Build every provider in `configs`. Fails on the first invalid one.
    pub fn new(
        configs: Vec<ProviderConfig>,
        deps: ProviderDeps,
        status_ttl: Duration,
    ) -> Result<Self, OrchestratorError> {
        let orchestrator = Self {
            entries: RwLock::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            status_ttl,
            deps,
        };
        for config in configs {
            orchestrator.add_provider(config)?;
        }
        Ok(orchestrator)
    }

    /// Production wiring: a lifecycle manager for the local server (after
    /// orphan cleanup) and the given provider registry.
    pub fn from_settings(
        settings: &EngineSettings,
        configs: Vec<ProviderConfig>,
    ) -> Result<Self, OrchestratorError> {
        let lifecycle = LifecycleManager::new(LifecycleConfig::from_settings(settings));
        lifecycle.init();
        let deps = ProviderDeps {
            engine: EngineConfig {
                min_confidence: settings.min_confidence,
            },
            lifecycle: Some(lifecycle),
        };
        Self::new(configs, deps, settings.status_ttl)
    }

    pub fn lifecycle(&self) -> Option<&Arc<LifecycleManager>> {
        self.deps.lifecycle.as_ref()
    }

    fn entries(&self) -> std::sync::RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn entries_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn statuses(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderStatus>> {
        self.statuses.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current registry, sorted by priority.
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        let mut configs: Vec<ProviderConfig> = self.entries().iter().map(|e| e.config.clone()).collect();
        configs.sort_by_key(|c| c.priority);
        configs
    }

    /// Enabled providers in the order they will be tried.
    fn candidates(&self, options: &ExtractOptions) -> Result<Vec<Candidate>, OrchestratorError> {
        let mut candidates: Vec<Candidate> = self
            .entries()
            .iter()
            .filter(|e| e.config.enabled)
            .map(|e| (e.config.clone(), e.provider.clone()))
            .collect();
        if candidates.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }
        candidates.sort_by_key(|(config, _)| config.priority);

        if let Some(preferred) = &options.preferred_provider {
            match candidates.iter().position(|(c, _)| &c.id == preferred) {
                Some(pos) => {
                    let chosen = candidates.remove(pos);
                    candidates.insert(0, chosen);
                }
                None => tracing::warn!(provider = %preferred, "Preferred provider is unknown or disabled"),
            }
        }

        if options.require_summary {
            let (capable, incapable): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .partition(|(_, provider)| provider.supports_summary());
            if capable.is_empty() {
                return Err(OrchestratorError::AllProvidersFailed {
                    reasons: incapable
                        .iter()
                        .map(|(c, _)| format!("{}: does not support summaries", c.id))
                        .collect(),
                });
            }
            candidates = capable;
        }
        Ok(candidates)
    }

    /// Cached status, refreshed once older than the TTL.
    async fn status(
        &self,
        provider: &Arc<dyn ExtractionProvider>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ProviderStatus, ProviderError> {
        let id = provider.id();
        if let Some(cached) = self.statuses().get(id) {
            if !cached.is_stale(Utc::now(), self.status_ttl) {
                return Ok(cached.clone());
            }
        }
        let status = match guarded(provider.check_availability(), STATUS_CHECK_TIMEOUT, cancel).await {
            Ok(status) => status,
            Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
            Err(e) => ProviderStatus::unavailable(id, e.to_string()),
        };
        self.statuses().insert(id.to_string(), status.clone());
        Ok(status)
    }

    fn mark_unavailable(&self, id: &str, reason: &ProviderError) {
        self.statuses()
            .insert(id.to_string(), ProviderStatus::unavailable(id, reason.to_string()));
    }

    /// Try providers in order until one returns a usable result. Fails
    /// with every provider's reason when none does.
    pub async fn extract(
        &self,
        input: &ExtractionInput,
        options: ExtractOptions,
    ) -> Result<ExtractionResult, OrchestratorError> {
        if input.text.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput("document text is empty".into()));
        }
        let cancel = options.cancel.as_ref();
        let candidates = self.candidates(&options)?;
        let mut reasons = Vec::new();

        for (config, provider) in candidates {
            let id = config.id.as_str();
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(OrchestratorError::provider(id, ProviderError::Cancelled));
            }

            let status = self
                .status(&provider, cancel)
                .await
                .map_err(|e| OrchestratorError::provider(id, e))?;
            if !status.available {
                let reason = status.error.unwrap_or_else(|| "unavailable".into());
                tracing::warn!(provider = %id, reason = %reason, "Skipping unavailable provider");
                reasons.push(format!("{id}: {reason}"));
                continue;
            }

            match guarded(provider.extract(input), config.timeout(), cancel).await {
                Ok(Ok(mut result)) if result.is_usable() => {
                    result.provider = id.to_string();
                    tracing::info!(
                        provider = %id,
                        entities = result.entity_count(),
                        elapsed_ms = result.processing_time_ms,
                        "Extraction succeeded"
                    );
                    return Ok(result);
                }
                Ok(Ok(_)) => {
                    tracing::warn!(provider = %id, "Provider returned no entities");
                    reasons.push(format!("{id}: {}", ProviderError::EmptyResult));
                }
                Ok(Err(e)) | Err(e) => {
                    if !e.is_soft() {
                        return Err(OrchestratorError::provider(id, e));
                    }
                    if matches!(e, ProviderError::Unavailable(_) | ProviderError::Timeout(_)) {
                        self.mark_unavailable(id, &e);
                    }
                    tracing::warn!(provider = %id, error = %e, "Provider failed");
                    reasons.push(format!("{id}: {e}"));
                }
            }
        }

        Err(OrchestratorError::AllProvidersFailed { reasons })
    }

    /// Run one named provider with no fallback. Disabled providers may
    /// still be called explicitly.
    pub async fn extract_with(
        &self,
        id: &str,
        input: &ExtractionInput,
    ) -> Result<ExtractionResult, OrchestratorError> {
        if input.text.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput("document text is empty".into()));
        }
        let (config, provider) = self
            .entries()
            .iter()
            .find(|e| e.config.id == id)
            .map(|e| (e.config.clone(), e.provider.clone()))
            .ok_or_else(|| OrchestratorError::UnknownProvider(id.to_string()))?;

        let status = self
            .status(&provider, None)
            .await
            .map_err(|e| OrchestratorError::provider(id, e))?;
        if !status.available {
            let reason = status.error.unwrap_or_else(|| "unavailable".into());
            return Err(OrchestratorError::provider(id, ProviderError::Unavailable(reason)));
        }

        let mut result = guarded(provider.extract(input), config.timeout(), None)
            .await
            .and_then(|r| r)
            .map_err(|e| OrchestratorError::provider(id, e))?;
        result.provider = id.to_string();
        Ok(result)
    }

    /// Status of every registered provider, in priority order. Uses the
    /// cache where fresh.
    pub async fn provider_statuses(&self) -> Vec<ProviderStatus> {
        let mut providers: Vec<(i32, Arc<dyn ExtractionProvider>)> = self
            .entries()
            .iter()
            .map(|e| (e.config.priority, e.provider.clone()))
            .collect();
        providers.sort_by_key(|(priority, _)| *priority);

        let mut statuses = Vec::with_capacity(providers.len());
        for (_, provider) in providers {
            match self.status(&provider, None).await {
                Ok(status) => statuses.push(status),
                Err(e) => statuses.push(ProviderStatus::unavailable(provider.id(), e.to_string())),
            }
        }
        statuses
    }

    /// Patch a provider's config, rebuilding it when connection settings
    /// changed. Returns the updated config.
    pub fn update_provider_config(
        &self,
        id: &str,
        patch: ProviderConfigPatch,
    ) -> Result<ProviderConfig, OrchestratorError> {
        let mut entries = self.entries_mut();
        let entry = entries
            .iter_mut()
            .find(|e| e.config.id == id)
            .ok_or_else(|| OrchestratorError::UnknownProvider(id.to_string()))?;

        let mut updated = entry.config.clone();
        let settings_changed = patch.apply(&mut updated);
        if settings_changed && !entry.custom {
            entry.provider = build_provider(&updated, &self.deps)
                .map_err(|e| OrchestratorError::provider(id, e))?;
        }
        entry.config = updated.clone();
        drop(entries);

        if settings_changed {
            self.statuses().remove(id);
        }
        tracing::info!(provider = %id, settings_changed, "Provider config updated");
        Ok(updated)
    }

    /// Build and register a provider from config.
    pub fn add_provider(&self, config: ProviderConfig) -> Result<(), OrchestratorError> {
        self.ensure_unique(&config.id)?;
        let provider =
            build_provider(&config, &self.deps).map_err(|e| OrchestratorError::provider(&config.id, e))?;
        self.insert(config, provider, false)
    }

    /// Register a caller-supplied backend under `config`.
    pub fn register_provider(
        &self,
        config: ProviderConfig,
        provider: Arc<dyn ExtractionProvider>,
    ) -> Result<(), OrchestratorError> {
        self.insert(config, provider, true)
    }

    fn ensure_unique(&self, id: &str) -> Result<(), OrchestratorError> {
        if self.entries().iter().any(|e| e.config.id == id) {
            return Err(OrchestratorError::DuplicateProvider(id.to_string()));
        }
        Ok(())
    }

    fn insert(
        &self,
        config: ProviderConfig,
        provider: Arc<dyn ExtractionProvider>,
        custom: bool,
    ) -> Result<(), OrchestratorError> {
        let mut entries = self.entries_mut();
        if entries.iter().any(|e| e.config.id == config.id) {
            return Err(OrchestratorError::DuplicateProvider(config.id));
        }
        tracing::debug!(provider = %config.id, kind = %config.provider_type, priority = config.priority, "Provider registered");
        entries.push(Entry {
            config,
            provider,
            custom,
        });
        Ok(())
    }

    /// Stop a local server this process started. Call before exit.
    pub fn shutdown(&self) {
        if let Some(lifecycle) = &self.deps.lifecycle {
            lifecycle.shutdown();
        }
    }
}

/// Run `work` under `timeout`, abandoning it early if `cancel` fires.
async fn guarded<T>(
    work: impl Future<Output = T>,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<T, ProviderError> {
    let timed = tokio::time::timeout(timeout, work);
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            outcome = timed => outcome.map_err(|_| ProviderError::Timeout(timeout)),
        },
        None => timed.await.map_err(|_| ProviderError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DateCategory, DatePrecision, ExtractedDate, ModelInfo, ProviderType,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Found,
        Empty,
        Fail,
        Hang,
    }

    struct FakeProvider {
        id: String,
        available: bool,
        summary: bool,
        behavior: Behavior,
        checks: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(id: &str, available: bool, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                available,
                summary: true,
                behavior,
                checks: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }

        fn without_summary(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                available: true,
                summary: false,
                behavior: Behavior::Found,
                checks: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn checks(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    fn found_result() -> ExtractionResult {
        ExtractionResult {
            dates: vec![ExtractedDate {
                raw_text: "1923".into(),
                parsed_date: "1923".into(),
                parsed_date_end: None,
                precision: DatePrecision::Year,
                category: DateCategory::BuildDate,
                confidence: 0.8,
                context: "Built in 1923.".into(),
                is_approximate: false,
            }],
            ..Default::default()
        }
    }

    #[async_trait]
    impl ExtractionProvider for FakeProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn supports_summary(&self) -> bool {
            self.summary
        }

        async fn check_availability(&self) -> ProviderStatus {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self.available {
                ProviderStatus::available(&self.id, None)
            } else {
                ProviderStatus::unavailable(&self.id, format!("{} is down", self.id))
            }
        }

        async fn extract(&self, _input: &ExtractionInput) -> Result<ExtractionResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Found => Ok(found_result()),
                Behavior::Empty => Ok(ExtractionResult::default()),
                Behavior::Fail => Err(ProviderError::Api {
                    status: 500,
                    body: "boom".into(),
                }),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "fake".into(),
                size: None,
                description: None,
            }
        }
    }

    fn config(id: &str, priority: i32) -> ProviderConfig {
        let mut config = ProviderConfig::new(id, id, ProviderType::CloudModel, priority);
        config.settings.timeout_secs = 5;
        config
    }

    fn orchestrator(providers: Vec<(ProviderConfig, Arc<FakeProvider>)>) -> Orchestrator {
        let orchestrator =
            Orchestrator::new(Vec::new(), ProviderDeps::default(), Duration::from_secs(60)).unwrap();
        for (config, provider) in providers {
            orchestrator.register_provider(config, provider).unwrap();
        }
        orchestrator
    }

    fn input() -> ExtractionInput {
        ExtractionInput::new("The factory was built in 1923.")
    }

    #[tokio::test]
    async fn falls_back_past_disabled_and_stops_at_first_success() {
        let a = FakeProvider::new("a", true, Behavior::Found);
        let b = FakeProvider::new("b", true, Behavior::Found);
        let c = FakeProvider::new("c", false, Behavior::Found);
        let mut a_config = config("a", 1);
        a_config.enabled = false;
        let orch = orchestrator(vec![
            (config("c", 20), c.clone()),
            (a_config, a.clone()),
            (config("b", 10), b.clone()),
        ]);

        let result = orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        assert_eq!(result.provider, "b");
        assert_eq!((a.calls(), a.checks()), (0, 0));
        assert_eq!(b.calls(), 1);
        assert_eq!((c.calls(), c.checks()), (0, 0));
    }

    #[tokio::test]
    async fn exhaustion_lists_every_reason() {
        let orch = orchestrator(vec![
            (config("local", 10), FakeProvider::new("local", false, Behavior::Found)),
            (config("cloud", 20), FakeProvider::new("cloud", true, Behavior::Fail)),
            (config("rules", 30), FakeProvider::new("rules", true, Behavior::Empty)),
        ]);
        let err = orch.extract(&input(), ExtractOptions::default()).await.unwrap_err();
        match &err {
            OrchestratorError::AllProvidersFailed { reasons } => {
                assert_eq!(reasons.len(), 3);
                assert_eq!(reasons[0], "local: local is down");
                assert!(reasons[1].starts_with("cloud: API error (HTTP 500)"));
                assert_eq!(reasons[2], "rules: no entities extracted");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("local: local is down; cloud:"));
    }

    #[tokio::test]
    async fn nothing_enabled_is_fatal() {
        let orch = orchestrator(Vec::new());
        assert!(matches!(
            orch.extract(&input(), ExtractOptions::default()).await,
            Err(OrchestratorError::NoProviders)
        ));

        let mut off = config("a", 1);
        off.enabled = false;
        let orch = orchestrator(vec![(off, FakeProvider::new("a", true, Behavior::Found))]);
        assert!(matches!(
            orch.extract(&input(), ExtractOptions::default()).await,
            Err(OrchestratorError::NoProviders)
        ));
    }

    #[tokio::test]
    async fn preferred_provider_goes_first() {
        let first = FakeProvider::new("first", true, Behavior::Found);
        let second = FakeProvider::new("second", true, Behavior::Found);
        let orch = orchestrator(vec![(config("first", 1), first.clone()), (config("second", 2), second.clone())]);
        let options = ExtractOptions {
            preferred_provider: Some("second".into()),
            ..Default::default()
        };
        let result = orch.extract(&input(), options).await.unwrap();
        assert_eq!(result.provider, "second");
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test]
    async fn summary_requirement_filters_providers() {
        let rules = FakeProvider::without_summary("rules");
        let model = FakeProvider::new("model", true, Behavior::Found);
        let orch = orchestrator(vec![(config("rules", 1), rules.clone()), (config("model", 2), model.clone())]);
        let options = ExtractOptions {
            require_summary: true,
            ..Default::default()
        };
        let result = orch.extract(&input(), options).await.unwrap();
        assert_eq!(result.provider, "model");
        assert_eq!(rules.calls(), 0);

        let only_rules = orchestrator(vec![(config("rules", 1), FakeProvider::without_summary("rules"))]);
        let err = only_rules
            .extract(
                &input(),
                ExtractOptions {
                    require_summary: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rules: does not support summaries"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out_and_falls_back() {
        let slow = FakeProvider::new("slow", true, Behavior::Hang);
        let fast = FakeProvider::new("fast", true, Behavior::Found);
        let orch = orchestrator(vec![(config("slow", 1), slow), (config("fast", 2), fast)]);
        let result = orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        assert_eq!(result.provider, "fast");

        let statuses = orch.provider_statuses().await;
        assert!(!statuses[0].available);
        assert!(statuses[0].error.as_deref().unwrap().contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_chain() {
        let slow = FakeProvider::new("slow", true, Behavior::Hang);
        let next = FakeProvider::new("next", true, Behavior::Found);
        let orch = orchestrator(vec![(config("slow", 1), slow.clone()), (config("next", 2), next.clone())]);
        let token = CancellationToken::new();
        let options = ExtractOptions {
            cancel: Some(token.clone()),
            ..Default::default()
        };

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = orch.extract(&input(), options).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(
            err,
            OrchestratorError::Provider {
                source: ProviderError::Cancelled,
                ..
            }
        ));
        assert_eq!(slow.calls(), 1);
        assert_eq!(next.calls(), 0);
    }

    #[tokio::test]
    async fn status_checks_are_cached() {
        let a = FakeProvider::new("a", true, Behavior::Found);
        let orch = orchestrator(vec![(config("a", 1), a.clone())]);
        orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        orch.provider_statuses().await;
        assert_eq!(a.checks(), 1);

        let uncached =
            Orchestrator::new(Vec::new(), ProviderDeps::default(), Duration::ZERO).unwrap();
        let b = FakeProvider::new("b", true, Behavior::Found);
        uncached.register_provider(config("b", 1), b.clone()).unwrap();
        uncached.extract(&input(), ExtractOptions::default()).await.unwrap();
        uncached.extract(&input(), ExtractOptions::default()).await.unwrap();
        assert_eq!(b.checks(), 2);
    }

    #[tokio::test]
    async fn update_config_changes_routing() {
        let a = FakeProvider::new("a", true, Behavior::Found);
        let b = FakeProvider::new("b", true, Behavior::Found);
        let orch = orchestrator(vec![(config("a", 1), a.clone()), (config("b", 2), b.clone())]);

        let updated = orch
            .update_provider_config(
                "a",
                ProviderConfigPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.enabled);
        let result = orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        assert_eq!(result.provider, "b");

        assert!(matches!(
            orch.update_provider_config("zzz", ProviderConfigPatch::default()),
            Err(OrchestratorError::UnknownProvider(_))
        ));
    }

    #[test]
    fn settings_patch_rebuilds_built_providers() {
        let orch = Orchestrator::new(
            vec![ProviderConfig::new("local", "Local", ProviderType::LocalModel, 10)],
            ProviderDeps::default(),
            Duration::from_secs(60),
        )
        .unwrap();
        let updated = orch
            .update_provider_config(
                "local",
                ProviderConfigPatch {
                    host: Some("192.168.1.40".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.settings.host.as_deref(), Some("192.168.1.40"));

        let rejected = orch.update_provider_config(
            "local",
            ProviderConfigPatch {
                model: Some("../../etc".into()),
                ..Default::default()
            },
        );
        assert!(matches!(rejected, Err(OrchestratorError::Provider { .. })));
        let current = &orch.provider_configs()[0];
        assert_eq!(current.settings.model, None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let orch = orchestrator(vec![(config("a", 1), FakeProvider::new("a", true, Behavior::Found))]);
        assert!(matches!(
            orch.add_provider(ProviderConfig::new("a", "again", ProviderType::Deterministic, 5)),
            Err(OrchestratorError::DuplicateProvider(_))
        ));
        assert!(orch
            .add_provider(ProviderConfig::new("rules", "Rules", ProviderType::Deterministic, 5))
            .is_ok());
        let ids: Vec<String> = orch.provider_configs().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "rules"]);
    }

    #[tokio::test]
    async fn extract_with_has_no_fallback() {
        let failing = FakeProvider::new("failing", true, Behavior::Fail);
        let down = FakeProvider::new("down", false, Behavior::Found);
        let ok = FakeProvider::new("ok", true, Behavior::Found);
        let orch = orchestrator(vec![
            (config("failing", 1), failing),
            (config("down", 2), down),
            (config("ok", 3), ok.clone()),
        ]);

        assert!(matches!(
            orch.extract_with("failing", &input()).await,
            Err(OrchestratorError::Provider { .. })
        ));
        assert!(matches!(
            orch.extract_with("down", &input()).await,
            Err(OrchestratorError::Provider {
                source: ProviderError::Unavailable(_),
                ..
            })
        ));
        assert!(matches!(
            orch.extract_with("missing", &input()).await,
            Err(OrchestratorError::UnknownProvider(_))
        ));
        assert_eq!(orch.extract_with("ok", &input()).await.unwrap().provider, "ok");
        assert_eq!(ok.calls(), 1);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let orch = orchestrator(vec![(config("a", 1), FakeProvider::new("a", true, Behavior::Found))]);
        assert!(matches!(
            orch.extract(&ExtractionInput::new("   "), ExtractOptions::default()).await,
            Err(OrchestratorError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn deterministic_backend_end_to_end() {
        let orch = Orchestrator::new(
            EngineSettings::default()
                .default_providers()
                .into_iter()
                .filter(|c| c.provider_type == ProviderType::Deterministic)
                .collect(),
            ProviderDeps::default(),
            Duration::from_secs(60),
        )
        .unwrap();
        let result = orch.extract(&input(), ExtractOptions::default()).await.unwrap();
        assert_eq!(result.provider, crate::config::DETERMINISTIC_PROVIDER_ID);
        assert_eq!(result.dates[0].category, DateCategory::BuildDate);
    }
}
