//! # Gateway orchestrator (C5)
//!
//! [`Gateway`] is the single entrypoint callers use for every request kind
//! (chat, streaming chat, embeddings, audio transcription/translation,
//! speech synthesis). It owns the three subsystems that make a routing
//! decision safe: the [`ProviderRegistry`] (C2, "who's registered and
//! healthy"), one [`CircuitBreaker`] per provider (C3, "is this provider
//! admitting requests right now"), and the [`Router`] (C4, "which eligible
//! provider wins"). Request flow:
//!
//! 1. Reject if not initialized.
//! 2. Resolve `model` to a provider via the registry; unknown model is a
//!    hard [`ClientError::ModelNotFound`].
//! 3. Build the eligibility list: registered providers serving this model,
//!    filtered to those whose breaker currently admits requests, preferring
//!    (but not requiring) providers with spare concurrency.
//! 4. Delegate selection among the eligible set to the router.
//! 5. Invoke the adapter under the breaker with up to `max_retries`
//!    attempts and exponential backoff, stopping immediately on a
//!    non-retryable [`ErrorKind`].
//! 6. On final failure, try exactly one alternate provider if the model has
//!    one (today every model has exactly one provider, so this branch is
//!    specified but inert — see DESIGN.md).
//! 7. Propagate the final error with its taxonomy intact.
//!
//! ```rust,ignore
//! use gateway_core::client::Gateway;
//! use gateway_core::providers::ProviderConfig;
//!
//! # async fn run() -> Result<(), gateway_core::error::ClientError> {
//! let gateway = Gateway::builder()
//!     .with_provider("openai", ProviderConfig::new("openai", "sk-..."))
//!     .build()
//!     .await?;
//! gateway.initialize().await;
//! # Ok(())
//! # }
//! ```

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics};
use crate::error::{ClientError, ErrorKind, ProviderError};
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    SpeechRequest, SpeechResponse, StreamChunk,
};
use crate::providers::{self, Provider, ProviderConfig};
use crate::registry::{InitializeSummary, ProviderRecord, ProviderRegistry, RegistryConfig};
use crate::routing::{EligibleProvider, ProviderCost, Router, RoutingContext, RoutingStrategy};
use dashmap::DashMap;
use futures::Stream;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};

/// A pinned stream of chat chunks with orchestrator-level errors, returned
/// by [`Gateway::stream_chat_completion`].
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ClientError>> + Send>>;

/// Tuning knobs for the orchestrator, independent of any one provider:
/// retry budget, backoff bounds, admission queue depth, per-provider
/// concurrency cap, and the breaker config applied uniformly to every
/// provider's breaker.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum attempts against the primary provider before falling back
    /// (default 3).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (default 1 s).
    pub base_delay: Duration,
    /// Backoff ceiling (default 10 s).
    pub max_delay: Duration,
    /// Depth of the bounded admission queue; requests beyond this are
    /// rejected with [`ClientError::AdmissionQueueFull`] (default 10000).
    pub max_queue_size: usize,
    /// Concurrent in-flight requests allowed per provider (default 100).
    pub max_concurrent_per_provider: usize,
    /// Applied to every provider's [`CircuitBreaker`].
    pub circuit_breaker: CircuitBreakerConfig,
    /// Strategy the [`Router`] uses to pick among eligible providers.
    pub routing_strategy: RoutingStrategy,
    /// Passed through to the [`ProviderRegistry`].
    pub registry: RegistryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_queue_size: 10_000,
            max_concurrent_per_provider: 100,
            circuit_breaker: CircuitBreakerConfig::default(),
            routing_strategy: RoutingStrategy::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Decrements the admission queue depth counter when a request's slot is
/// released, whether it completed or was dropped early.
struct AdmissionPermit {
    depth: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The gateway orchestrator (C5). Cheap to clone: every field is an `Arc`
/// or atomic, so callers typically hold one `Gateway` behind an `Arc` and
/// share it across request handlers.
pub struct Gateway {
    registry: Arc<ProviderRegistry>,
    router: Arc<Router>,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    concurrency: Arc<DashMap<String, Arc<Semaphore>>>,
    queue_depth: Arc<AtomicUsize>,
    config: GatewayConfig,
    initialized: Arc<AtomicBool>,
    last_used_provider: Arc<RwLock<Option<String>>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Step 1 of every request: probe all registered providers once and
    /// mark the gateway ready to serve. Safe to call more than once.
    pub async fn initialize(&self) -> InitializeSummary {
        let summary = self.registry.initialize_all().await;
        self.initialized.store(true, Ordering::SeqCst);
        summary
    }

    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ClientError> {
        let model = request.model.clone();
        self.dispatch(&model, move |adapter| {
            let request = request.clone();
            async move { adapter.chat_completion(request).await }
        })
        .await
    }

    /// Streaming invocations bypass the retry/fallback loop: once headers
    /// are flowing there is no well-defined "retry". The orchestrator
    /// still does admission, breaker, and routing, then hands the
    /// adapter's stream straight through with its error type translated
    /// into [`ClientError`].
    pub async fn stream_chat_completion(&self, request: ChatRequest) -> Result<ChatStream, ClientError> {
        let model = request.model.clone();
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ClientError::Configuration {
                message: "gateway not initialized".to_string(),
            });
        }
        if self.registry.get_model_info(&model).is_none() {
            return Err(ClientError::ModelNotFound { model });
        }

        let records = self.provider_records_for_model(&model);
        let eligible = self.build_eligibility(&model, &records).await;
        let context = RoutingContext {
            model: Some(model.clone()),
            ..Default::default()
        };
        let selection = self
            .router
            .select_provider(&eligible, &context)
            .ok_or_else(|| ClientError::CircuitOpen { provider: model.clone() })?;
        let record = records
            .iter()
            .find(|r| r.name == selection.provider_id)
            .cloned()
            .ok_or_else(|| ClientError::ModelNotFound { model: model.clone() })?;

        let _permit = self.admit().await?;
        let breaker = self.breaker_for(&record.name);
        if !breaker.can_execute().await {
            return Err(ClientError::CircuitOpen { provider: record.name });
        }

        *self.last_used_provider.write().await = Some(record.name.clone());
        let inner = record.adapter.stream_chat_completion(request).await?;
        Ok(Box::pin(futures::StreamExt::map(inner, |item| {
            item.map_err(ClientError::Provider)
        })))
    }

    pub async fn embedding(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ClientError> {
        let model = request.model.clone();
        self.dispatch(&model, move |adapter| {
            let request = request.clone();
            async move { adapter.embedding(request).await }
        })
        .await
    }

    pub async fn audio_transcription(&self, request: AudioRequest) -> Result<AudioResponse, ClientError> {
        let model = request.model.clone();
        self.dispatch(&model, move |adapter| {
            let request = request.clone();
            async move { adapter.audio_transcription(request).await }
        })
        .await
    }

    pub async fn audio_translation(&self, request: AudioRequest) -> Result<AudioResponse, ClientError> {
        let model = request.model.clone();
        self.dispatch(&model, move |adapter| {
            let request = request.clone();
            async move { adapter.audio_translation(request).await }
        })
        .await
    }

    pub async fn text_to_speech(&self, request: SpeechRequest) -> Result<SpeechResponse, ClientError> {
        let model = request.model.clone();
        self.dispatch(&model, move |adapter| {
            let request = request.clone();
            async move { adapter.text_to_speech(request).await }
        })
        .await
    }

    pub async fn get_last_used_provider(&self) -> Option<String> {
        self.last_used_provider.read().await.clone()
    }

    pub async fn get_circuit_breaker_metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        let mut out = HashMap::new();
        for entry in self.breakers.iter() {
            out.insert(entry.key().clone(), entry.value().get_metrics().await);
        }
        out
    }

    /// Health as last observed by the registry's probe loop, keyed by
    /// provider name (`true` = not unhealthy/destroyed).
    pub async fn get_provider_health_status(&self) -> HashMap<String, bool> {
        self.registry
            .get_all()
            .into_iter()
            .map(|record| {
                let healthy = !matches!(
                    record.health_status,
                    crate::registry::HealthStatus::Unhealthy | crate::registry::HealthStatus::Destroyed
                );
                (record.name, healthy)
            })
            .collect()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The shared request-dispatch path for non-streaming operations:
    /// reject if not initialized, resolve the model to a provider, build
    /// the eligibility list, admit, route, and invoke with retry/fallback.
    /// `operation` is applied to whichever adapter the router selects; it
    /// is evaluated once per attempt, so it must be cheap to call
    /// repeatedly (request payloads are cloned per call).
    async fn dispatch<T, F, Fut>(&self, model: &str, operation: F) -> Result<T, ClientError>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ClientError::Configuration {
                message: "gateway not initialized".to_string(),
            });
        }
        if self.registry.get_model_info(model).is_none() {
            return Err(ClientError::ModelNotFound {
                model: model.to_string(),
            });
        }

        let records = self.provider_records_for_model(model);
        let eligible = self.build_eligibility(model, &records).await;
        if eligible.is_empty() {
            return Err(ClientError::CircuitOpen {
                provider: model.to_string(),
            });
        }

        let _permit = self.admit().await?;

        let context = RoutingContext {
            model: Some(model.to_string()),
            ..Default::default()
        };
        let selection = self
            .router
            .select_provider(&eligible, &context)
            .ok_or_else(|| ClientError::Routing {
                message: format!("no provider selected for model {model}"),
            })?;
        let primary = records
            .iter()
            .find(|r| r.name == selection.provider_id)
            .cloned()
            .ok_or_else(|| ClientError::ModelNotFound {
                model: model.to_string(),
            })?;

        match self.invoke_with_retry(&primary, &operation).await {
            Ok(value) => Ok(value),
            Err(primary_err) => {
                // Attempt exactly one fallback provider for this model, if
                // one is registered. Inactive today — every model
                // currently has exactly one provider — but kept live so a
                // second adapter for the same model "just works".
                match records.iter().find(|r| r.name != primary.name) {
                    Some(fallback) => {
                        tracing::warn!(
                            primary = %primary.name,
                            fallback = %fallback.name,
                            model,
                            "primary provider exhausted, attempting fallback"
                        );
                        match self.invoke_once(fallback, &operation).await {
                            Ok(value) => Ok(value),
                            Err(_fallback_err) => Err(primary_err),
                        }
                    }
                    None => Err(primary_err),
                }
            }
        }
    }

    /// All registered providers whose `supported_models()` names `model`.
    /// Today this is at most one (a model is served by exactly one
    /// provider), but the orchestrator doesn't assume that — it's ready
    /// for the multi-provider case the fallback step anticipates.
    fn provider_records_for_model(&self, model: &str) -> Vec<ProviderRecord> {
        self.registry
            .get_all()
            .into_iter()
            .filter(|record| record.adapter.supported_models().iter().any(|m| m == model))
            .collect()
    }

    /// Step 3: filter to providers whose breaker currently admits
    /// requests, then prefer ones with spare concurrency — but fall back
    /// to the full breaker-admissible set if every one of them is at cap,
    /// since the request still queues on that provider's semaphore rather
    /// than being rejected outright.
    async fn build_eligibility(&self, model: &str, records: &[ProviderRecord]) -> Vec<EligibleProvider> {
        let mut admissible = Vec::with_capacity(records.len());
        let mut with_capacity = Vec::with_capacity(records.len());

        for record in records {
            let breaker = self.breaker_for(&record.name);
            if !breaker.can_execute().await {
                continue;
            }

            let mut eligible =
                EligibleProvider::new(record.name.clone()).with_health(record.health_status.into());
            if let Some(cost) = record.adapter.get_cost_info(model) {
                eligible = eligible.with_cost(ProviderCost {
                    input_cost_per_1k: cost.input_cost_per_1k,
                    output_cost_per_1k: cost.output_cost_per_1k,
                });
            }

            let semaphore = self.semaphore_for(&record.name);
            if semaphore.available_permits() > 0 {
                with_capacity.push(eligible.clone());
            }
            admissible.push(eligible);
        }

        if with_capacity.is_empty() {
            admissible
        } else {
            with_capacity
        }
    }

    /// Step 5: invoke `operation` against `record`'s adapter under its
    /// breaker, retrying up to `max_retries` times with exponential
    /// backoff on retryable errors only.
    async fn invoke_with_retry<T, F, Fut>(&self, record: &ProviderRecord, operation: &F) -> Result<T, ClientError>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let breaker = self.breaker_for(&record.name);
        let semaphore = self.semaphore_for(&record.name);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let _slot = semaphore.clone().acquire_owned().await.map_err(|_| ClientError::Internal {
                message: "provider concurrency semaphore closed".to_string(),
            })?;

            let adapter = record.adapter.clone();
            let start = Instant::now();
            let outcome = breaker
                .call_classified(|| operation(adapter), ProviderError::is_retryable)
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;
            drop(_slot);

            match outcome {
                Ok(value) => {
                    self.on_attempt(&record.name, true, latency_ms).await;
                    return Ok(value);
                }
                Err(CircuitBreakerError::Open) => {
                    self.on_attempt(&record.name, false, latency_ms).await;
                    return Err(ClientError::CircuitOpen {
                        provider: record.name.clone(),
                    });
                }
                Err(CircuitBreakerError::Timeout) => {
                    self.on_attempt(&record.name, false, latency_ms).await;
                    if attempt >= self.config.max_retries {
                        return Err(ClientError::Timeout);
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
                Err(CircuitBreakerError::Inner(provider_err)) => {
                    self.on_attempt(&record.name, false, latency_ms).await;
                    if !provider_err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(ClientError::Provider(provider_err));
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
    }

    /// A single, non-retried attempt — used for the step-6 fallback call.
    async fn invoke_once<T, F, Fut>(&self, record: &ProviderRecord, operation: &F) -> Result<T, ClientError>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let breaker = self.breaker_for(&record.name);
        let semaphore = self.semaphore_for(&record.name);
        let _slot = semaphore.clone().acquire_owned().await.map_err(|_| ClientError::Internal {
            message: "provider concurrency semaphore closed".to_string(),
        })?;

        let adapter = record.adapter.clone();
        let start = Instant::now();
        let outcome = breaker
            .call_classified(|| operation(adapter), ProviderError::is_retryable)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;
        drop(_slot);

        match outcome {
            Ok(value) => {
                self.on_attempt(&record.name, true, latency_ms).await;
                Ok(value)
            }
            Err(CircuitBreakerError::Open) => {
                self.on_attempt(&record.name, false, latency_ms).await;
                Err(ClientError::CircuitOpen {
                    provider: record.name.clone(),
                })
            }
            Err(CircuitBreakerError::Timeout) => {
                self.on_attempt(&record.name, false, latency_ms).await;
                Err(ClientError::Timeout)
            }
            Err(CircuitBreakerError::Inner(provider_err)) => {
                self.on_attempt(&record.name, false, latency_ms).await;
                Err(ClientError::Provider(provider_err))
            }
        }
    }

    async fn on_attempt(&self, provider: &str, success: bool, latency_ms: u64) {
        self.registry.record_attempt(provider, success, latency_ms);
        self.router.update_stats(provider, success, latency_ms);
        if success {
            *self.last_used_provider.write().await = Some(provider.to_string());
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let scaled = self.config.base_delay.saturating_mul(1u32 << (attempt.saturating_sub(1)));
        scaled.min(self.config.max_delay)
    }

    /// Bounded admission queue (default depth 10000). Returns a permit
    /// whose drop releases the slot; callers hold it for the lifetime of
    /// the request.
    async fn admit(&self) -> Result<AdmissionPermit, ClientError> {
        let depth = self.queue_depth.fetch_add(1, Ordering::SeqCst);
        if depth >= self.config.max_queue_size {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::AdmissionQueueFull);
        }
        Ok(AdmissionPermit {
            depth: self.queue_depth.clone(),
        })
    }

    fn breaker_for(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name.to_string(), self.config.circuit_breaker.clone())))
            .clone()
    }

    fn semaphore_for(&self, name: &str) -> Arc<Semaphore> {
        self.concurrency
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrent_per_provider)))
            .clone()
    }
}

/// Builds a [`Gateway`]: register provider adapters, tune retry/breaker/
/// routing behavior, then `build()`.
pub struct GatewayBuilder {
    provider_configs: Vec<(String, ProviderConfig)>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            provider_configs: Vec::new(),
            config: GatewayConfig::default(),
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>, config: ProviderConfig) -> Self {
        self.provider_configs.push((name.into(), config));
        self
    }

    pub fn with_openai(self, api_key: impl Into<String>) -> Self {
        self.with_provider("openai", ProviderConfig::new("openai", api_key))
    }

    pub fn with_gemini(self, api_key: impl Into<String>) -> Self {
        self.with_provider("gemini", ProviderConfig::new("gemini", api_key))
    }

    pub fn with_routing_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.config.routing_strategy = strategy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.config.max_queue_size = max_queue_size;
        self
    }

    pub fn with_max_concurrent_per_provider(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent_per_provider = max_concurrent;
        self
    }

    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    /// Construct every configured provider adapter, register it, and
    /// return the assembled [`Gateway`]. Does not probe health — call
    /// [`Gateway::initialize`] afterward.
    pub async fn build(self) -> Result<Gateway, ClientError> {
        let registry = Arc::new(ProviderRegistry::new(self.config.registry.clone()));
        let router = Arc::new(Router::new(self.config.routing_strategy));

        for (name, provider_config) in self.provider_configs {
            let adapter = providers::create_provider(provider_config)?;
            registry.register(name, adapter).await?;
        }

        Ok(Gateway {
            registry,
            router,
            breakers: Arc::new(DashMap::new()),
            concurrency: Arc::new(DashMap::new()),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            config: self.config,
            initialized: Arc::new(AtomicBool::new(false)),
            last_used_provider: Arc::new(RwLock::new(None)),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::providers::{HealthStatus, ProviderHealth, StreamResult};
    use std::sync::atomic::AtomicU32;

    struct FlakyProvider {
        name: &'static str,
        model: &'static str,
        failures_then_success: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
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
            vec![self.model.to_string()]
        }
        async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let remaining = self.failures_then_success.fetch_sub(1, Ordering::SeqCst);
            if remaining > 0 {
                return Err(ProviderError::ServiceUnavailable);
            }
            Ok(ChatResponse {
                id: "resp-1".to_string(),
                object: "chat.completion".to_string(),
                created: 0,
                model: request.model,
                choices: vec![],
                usage: None,
                system_fingerprint: None,
            })
        }
        async fn stream_chat_completion(&self, _request: ChatRequest) -> Result<StreamResult, ProviderError> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
            Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(1),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: Default::default(),
            })
        }
    }

    struct AlwaysFailProvider {
        name: &'static str,
        model: &'static str,
    }

    #[async_trait::async_trait]
    impl Provider for AlwaysFailProvider {
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
            vec![self.model.to_string()]
        }
        async fn chat_completion(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::AuthenticationFailed {
                reason: "bad key".to_string(),
            })
        }
        async fn stream_chat_completion(&self, _request: ChatRequest) -> Result<StreamResult, ProviderError> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
            Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(1),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: Default::default(),
            })
        }
    }

    fn chat_request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        }
    }

    async fn gateway_with(adapter: Arc<dyn Provider>, name: &str) -> Gateway {
        let registry = Arc::new(ProviderRegistry::new(RegistryConfig::default()));
        registry.register(name, adapter).await.unwrap();
        Gateway {
            registry,
            router: Arc::new(Router::new(RoutingStrategy::default())),
            breakers: Arc::new(DashMap::new()),
            concurrency: Arc::new(DashMap::new()),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            config: GatewayConfig {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..GatewayConfig::default()
            },
            initialized: Arc::new(AtomicBool::new(true)),
            last_used_provider: Arc::new(RwLock::new(None)),
        }
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_dispatch() {
        let gateway = gateway_with(
            Arc::new(FlakyProvider { name: "p", model: "known", failures_then_success: AtomicU32::new(0) }),
            "p",
        )
        .await;
        let err = gateway.chat_completion(chat_request("unknown")).await.unwrap_err();
        assert!(matches!(err, ClientError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let gateway = gateway_with(
            Arc::new(FlakyProvider {
                name: "p",
                model: "m",
                failures_then_success: AtomicU32::new(2),
            }),
            "p",
        )
        .await;
        let response = gateway.chat_completion(chat_request("m")).await.unwrap();
        assert_eq!(response.model, "m");
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_one_attempt() {
        let gateway = gateway_with(Arc::new(AlwaysFailProvider { name: "p", model: "m" }), "p").await;
        let err = gateway.chat_completion(chat_request("m")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(gateway.breaker_for("p").get_metrics().await.failure_count, 0);
    }

    #[tokio::test]
    async fn admission_queue_rejects_once_full() {
        let gateway = gateway_with(
            Arc::new(FlakyProvider { name: "p", model: "m", failures_then_success: AtomicU32::new(0) }),
            "p",
        )
        .await;
        gateway.queue_depth.store(gateway.config.max_queue_size, Ordering::SeqCst);
        let err = gateway.chat_completion(chat_request("m")).await.unwrap_err();
        assert!(matches!(err, ClientError::AdmissionQueueFull));
    }

    #[tokio::test]
    async fn not_initialized_rejects_immediately() {
        let mut gateway = gateway_with(
            Arc::new(FlakyProvider { name: "p", model: "m", failures_then_success: AtomicU32::new(0) }),
            "p",
        )
        .await;
        gateway.initialized = Arc::new(AtomicBool::new(false));
        let err = gateway.chat_completion(chat_request("m")).await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration { .. }));
    }
}
