//! # Provider Registry Module
//!
//! Owns provider adapters for the lifetime of the process: tracks each as a
//! [`ProviderRecord`], builds the model→provider index from
//! [`Provider::model_catalog`], and runs the periodic health-probe loop that
//! keeps `health_status` fresh for the router and the gateway orchestrator.
//!
//! Unlike [`crate::client::Gateway`], which owns adapters directly for
//! request dispatch, the registry is the read side: "which providers do we
//! have, which models can they serve, and are they currently healthy."

use crate::models::ModelDescriptor;
use crate::providers::{Provider, ProviderMetrics};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Health status of a registered provider.
///
/// Distinct from [`crate::providers::HealthStatus`] (the result of a single
/// health check call) and [`crate::routing::HealthStatus`] (the router's
/// lightweight view, which has no terminal state): this one tracks
/// `Destroyed`, entered once and never left, for a provider that has been
/// unregistered but whose record a caller may still be holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
    Destroyed,
}

impl From<HealthStatus> for crate::routing::HealthStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => crate::routing::HealthStatus::Healthy,
            HealthStatus::Degraded => crate::routing::HealthStatus::Degraded,
            HealthStatus::Unhealthy | HealthStatus::Destroyed => {
                crate::routing::HealthStatus::Unhealthy
            }
            HealthStatus::Unknown => crate::routing::HealthStatus::Unknown,
        }
    }
}

impl From<crate::providers::HealthStatus> for HealthStatus {
    fn from(status: crate::providers::HealthStatus) -> Self {
        match status {
            crate::providers::HealthStatus::Healthy => HealthStatus::Healthy,
            crate::providers::HealthStatus::Degraded => HealthStatus::Degraded,
            crate::providers::HealthStatus::Unhealthy => HealthStatus::Unhealthy,
            crate::providers::HealthStatus::Unknown => HealthStatus::Unknown,
        }
    }
}

/// A provider's registration record. Cheap to clone: the adapter is held
/// behind an `Arc`.
#[derive(Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub adapter: Arc<dyn Provider>,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
    pub health_status: HealthStatus,
    /// Running request counters for this provider, updated by the
    /// orchestrator after every attempt via
    /// [`ProviderRegistry::record_attempt`].
    pub metrics: ProviderMetrics,
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("name", &self.name)
            .field("registered_at", &self.registered_at)
            .field("last_health_check", &self.last_health_check)
            .field("health_status", &self.health_status)
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interval between health-probe sweeps. The first sweep runs immediately
    /// on the first `register()` rather than waiting a full interval.
    pub health_check_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Result of [`ProviderRegistry::initialize_all`]: a best-effort batch run
/// where individual failures don't fail the whole call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InitializeSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<(String, String)>,
}

type HealthCallback = Arc<dyn Fn(String, HealthStatus) + Send + Sync>;

/// Central directory of provider adapters and the models they serve.
///
/// All operations take `&self`; interior state uses `DashMap`/`RwLock` so the
/// registry can be shared behind a single `Arc` across the gateway.
pub struct ProviderRegistry {
    records: Arc<DashMap<String, ProviderRecord>>,
    models: Arc<DashMap<String, ModelDescriptor>>,
    config: RegistryConfig,
    callback: Arc<RwLock<Option<HealthCallback>>>,
    probe_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ProviderRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            models: Arc::new(DashMap::new()),
            config,
            callback: Arc::new(RwLock::new(None)),
            probe_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Register `adapter` under `name`, replacing any existing registration.
    /// Rejects an empty name. Starts the health-probe loop on first
    /// registration.
    pub async fn register(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn Provider>,
    ) -> Result<(), crate::error::ClientError> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::error::ClientError::Configuration {
                message: "provider name must not be empty".to_string(),
            });
        }

        if self.records.contains_key(&name) {
            tracing::warn!(provider = %name, "replacing existing provider registration");
        }

        for descriptor in adapter.model_catalog() {
            self.models.insert(descriptor.id.clone(), descriptor);
        }

        self.records.insert(
            name.clone(),
            ProviderRecord {
                name: name.clone(),
                adapter,
                registered_at: chrono::Utc::now(),
                last_health_check: None,
                health_status: HealthStatus::Unknown,
                metrics: ProviderMetrics::default(),
            },
        );

        self.ensure_probe_loop_running().await;
        Ok(())
    }

    /// Best-effort unregister: the adapter has no explicit teardown hook in
    /// the current [`Provider`] contract, so this simply drops the record
    /// (and the `Arc<dyn Provider>` along with it) after marking it
    /// destroyed. Stops the probe loop once the registry is empty.
    pub async fn unregister(&self, name: &str) {
        if let Some((_, mut record)) = self.records.remove(name) {
            record.health_status = HealthStatus::Destroyed;
            self.notify(name.to_string(), HealthStatus::Destroyed).await;
        }
        self.models.retain(|_, descriptor| descriptor.provider != name);

        if self.records.is_empty() {
            if let Some(handle) = self.probe_handle.write().await.take() {
                handle.abort();
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ProviderRecord> {
        self.records.get(name).map(|r| r.clone())
    }

    pub fn get_all(&self) -> Vec<ProviderRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    pub fn list(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Union of models across providers whose health isn't `unhealthy` or
    /// `destroyed`.
    pub fn get_available_models(&self) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .filter(|entry| {
                self.records
                    .get(&entry.provider)
                    .map(|r| !matches!(r.health_status, HealthStatus::Unhealthy | HealthStatus::Destroyed))
                    .unwrap_or(false)
            })
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn get_model_info(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.models.get(model_id).map(|d| d.clone())
    }

    /// Resolve the adapter that serves `model_id`, or `None` if unknown or
    /// its provider was since unregistered.
    pub fn get_provider_for_model(&self, model_id: &str) -> Option<Arc<dyn Provider>> {
        let descriptor = self.models.get(model_id)?;
        self.records.get(&descriptor.provider).map(|r| r.adapter.clone())
    }

    /// Record the outcome of one request attempt against `name`'s metrics.
    /// Called by the orchestrator after every provider invocation,
    /// success or failure. A no-op if the provider was since unregistered.
    pub fn record_attempt(&self, name: &str, success: bool, latency_ms: u64) {
        if let Some(mut record) = self.records.get_mut(name) {
            record.metrics.record(success, latency_ms);
        }
    }

    /// Current metrics snapshot for `name`, or `None` if unregistered.
    pub fn get_metrics(&self, name: &str) -> Option<ProviderMetrics> {
        self.records.get(name).map(|r| r.metrics.clone())
    }

    /// Register a callback invoked on every health-status transition, as
    /// `(provider_name, new_status)`. Replaces any previously set callback.
    pub async fn set_health_status_callback(
        &self,
        callback: impl Fn(String, HealthStatus) + Send + Sync + 'static,
    ) {
        *self.callback.write().await = Some(Arc::new(callback));
    }

    /// Probe every registered adapter once, concurrently, tolerating
    /// individual failures.
    pub async fn initialize_all(&self) -> InitializeSummary {
        let records = self.get_all();
        let total = records.len();

        let results = futures::future::join_all(records.into_iter().map(|record| async move {
            let outcome = record.adapter.health_check().await;
            (record.name, outcome)
        }))
        .await;

        let mut successful = 0;
        let mut errors = Vec::new();

        for (name, outcome) in results {
            match outcome {
                Ok(health) => {
                    successful += 1;
                    self.update_health(&name, health.status.into()).await;
                }
                Err(err) => {
                    errors.push((name.clone(), err.to_string()));
                    self.update_health(&name, HealthStatus::Unhealthy).await;
                }
            }
        }

        InitializeSummary {
            total,
            successful,
            failed: errors.len(),
            errors,
        }
    }

    /// Stop the probe loop and drop every adapter.
    pub async fn destroy(&self) {
        if let Some(handle) = self.probe_handle.write().await.take() {
            handle.abort();
        }
        for name in self.list() {
            self.unregister(&name).await;
        }
    }

    async fn ensure_probe_loop_running(&self) {
        let mut handle_guard = self.probe_handle.write().await;
        if handle_guard.is_some() {
            return;
        }

        let records = self.records.clone();
        let callback = self.callback.clone();
        let interval = self.config.health_check_interval;

        let spawned = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot: Vec<ProviderRecord> =
                    records.iter().map(|r| r.clone()).collect();

                for record in snapshot {
                    let outcome = record.adapter.health_check().await;
                    let new_status = match outcome {
                        Ok(health) => HealthStatus::from(health.status),
                        Err(err) => {
                            tracing::warn!(provider = %record.name, error = %err, "health probe failed");
                            HealthStatus::Unhealthy
                        }
                    };

                    let previous = records.get(&record.name).map(|r| r.health_status);
                    if let Some(mut entry) = records.get_mut(&record.name) {
                        entry.last_health_check = Some(chrono::Utc::now());
                        entry.health_status = new_status;
                    }

                    if previous == Some(HealthStatus::Unhealthy) && new_status == HealthStatus::Healthy {
                        tracing::info!(provider = %record.name, "provider recovered");
                    }

                    if previous != Some(new_status) {
                        if let Some(cb) = callback.read().await.as_ref() {
                            cb(record.name.clone(), new_status);
                        }
                    }
                }
            }
        });

        *handle_guard = Some(spawned);
    }

    async fn update_health(&self, name: &str, status: HealthStatus) {
        let previous = self.records.get(name).map(|r| r.health_status);
        if let Some(mut record) = self.records.get_mut(name) {
            record.last_health_check = Some(chrono::Utc::now());
            record.health_status = status;
        }
        if previous != Some(status) {
            self.notify(name.to_string(), status).await;
        }
    }

    async fn notify(&self, name: String, status: HealthStatus) {
        if let Some(cb) = self.callback.read().await.as_ref() {
            cb(name, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::{ChatRequest, ChatResponse};
    use crate::providers::{ProviderHealth, StreamResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait::async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn supports_streaming(&self) -> bool {
            false
        }
        fn supports_function_calling(&self) -> bool {
            false
        }
        fn supported_models(&self) -> Vec<String> {
            vec![format!("{}-model", self.name)]
        }
        async fn chat_completion(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            unimplemented!()
        }
        async fn stream_chat_completion(&self, _request: ChatRequest) -> Result<StreamResult, ProviderError> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
            Ok(ProviderHealth {
                status: if self.healthy {
                    crate::providers::HealthStatus::Healthy
                } else {
                    crate::providers::HealthStatus::Unhealthy
                },
                latency_ms: Some(1),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn register_builds_model_index() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry
            .register("openai", Arc::new(StubProvider { name: "openai", healthy: true }))
            .await
            .unwrap();

        assert!(registry.is_registered("openai"));
        assert!(registry.get_model_info("openai-model").is_some());
        assert!(registry.get_provider_for_model("openai-model").is_some());
    }

    #[tokio::test]
    async fn rejects_empty_name() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let result = registry
            .register("", Arc::new(StubProvider { name: "x", healthy: true }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unregister_marks_destroyed_and_clears_models() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry
            .register("openai", Arc::new(StubProvider { name: "openai", healthy: true }))
            .await
            .unwrap();
        registry.unregister("openai").await;

        assert!(!registry.is_registered("openai"));
        assert!(registry.get_model_info("openai-model").is_none());
    }

    #[tokio::test]
    async fn initialize_all_tolerates_individual_failures() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry
            .register("good", Arc::new(StubProvider { name: "good", healthy: true }))
            .await
            .unwrap();
        registry
            .register("bad", Arc::new(StubProvider { name: "bad", healthy: false }))
            .await
            .unwrap();

        let summary = registry.initialize_all().await;
        assert_eq!(summary.total, 2);
        // both calls succeed at the transport level; "bad" just reports unhealthy.
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn health_status_callback_fires_on_transition() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let transitions = Arc::new(AtomicUsize::new(0));
        let counter = transitions.clone();
        registry
            .set_health_status_callback(move |_name, _status| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        registry
            .register("openai", Arc::new(StubProvider { name: "openai", healthy: true }))
            .await
            .unwrap();
        registry.update_health("openai", HealthStatus::Healthy).await;
        registry.update_health("openai", HealthStatus::Degraded).await;

        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_available_models_excludes_unhealthy_providers() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry
            .register("good", Arc::new(StubProvider { name: "good", healthy: true }))
            .await
            .unwrap();
        registry
            .register("bad", Arc::new(StubProvider { name: "bad", healthy: false }))
            .await
            .unwrap();

        registry.update_health("good", HealthStatus::Healthy).await;
        registry.update_health("bad", HealthStatus::Unhealthy).await;

        let available = registry.get_available_models();
        let ids: Vec<&str> = available.iter().map(|d| d.id.as_str()).collect();
        assert!(ids.contains(&"good-model"));
        assert!(!ids.contains(&"bad-model"));
    }

    #[tokio::test]
    async fn record_attempt_updates_metrics() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry
            .register("openai", Arc::new(StubProvider { name: "openai", healthy: true }))
            .await
            .unwrap();

        registry.record_attempt("openai", true, 100);
        registry.record_attempt("openai", false, 200);

        let metrics = registry.get_metrics("openai").unwrap();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
        assert!(registry.get_metrics("unknown").is_none());
    }
}
