//! # Provider adapter contract (C1)
//!
//! Every upstream LLM provider is fronted by an implementation of
//! [`Provider`]: a uniform surface for chat, streaming chat, embeddings,
//! audio transcription/translation, speech synthesis, health checks, the
//! model catalog, cost lookups, and metrics. The gateway never branches on
//! provider identity outside this trait — [`crate::registry::ProviderRegistry`]
//! holds adapters as `Arc<dyn Provider>` and [`crate::client::Gateway`]
//! dispatches through it exclusively.
//!
//! Two adapters ship today: [`openai`] (the OpenAI-compatible chat/embedding/
//! audio API, which also happens to be the gateway's own external wire
//! shape) and [`gemini`] (Google's Gemini-compatible REST API). Both
//! validate their request before making a network call and either return a
//! fully-populated response or a [`ProviderError`] — never a partial
//! success.
//!
//! ## Adding a provider
//!
//! ```rust
//! use gateway_core::providers::{Provider, ProviderConfig, ProviderHealth, HealthStatus, StreamResult};
//! use gateway_core::models::{ChatRequest, ChatResponse};
//! use gateway_core::error::ProviderError;
//! use async_trait::async_trait;
//!
//! struct MyProvider { config: ProviderConfig }
//!
//! #[async_trait]
//! impl Provider for MyProvider {
//!     fn name(&self) -> &str { "my-provider" }
//!     fn supports_streaming(&self) -> bool { true }
//!     fn supports_function_calling(&self) -> bool { false }
//!     fn supported_models(&self) -> Vec<String> { vec!["my-model".to_string()] }
//!
//!     async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
//!         todo!("call the upstream API")
//!     }
//!     async fn stream_chat_completion(&self, request: ChatRequest) -> Result<StreamResult, ProviderError> {
//!         todo!("call the upstream API")
//!     }
//!     async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
//!         Ok(ProviderHealth {
//!             status: HealthStatus::Healthy,
//!             latency_ms: Some(10),
//!             error_rate: 0.0,
//!             last_check: chrono::Utc::now(),
//!             details: Default::default(),
//!         })
//!     }
//! }
//! ```

use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ModelCost, SpeechRequest, SpeechResponse, StreamChunk,
};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

pub mod gemini;
pub mod gemini_realtime;
pub mod openai;
pub mod openai_realtime;

#[allow(unused_imports)]
use crate::common::duration_serde;

/// A pinned, boxed stream of streaming chat chunks or mid-stream errors.
pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Uniform operations a provider adapter exposes.
///
/// Implementations validate the request (model present, messages present for
/// chat, file present for transcription, voice valid for TTS, ...) before any
/// network call, and never return a partially-populated success value:
/// either a complete normalized response comes back, or a [`ProviderError`]
/// from the taxonomy in [`crate::error`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier for this provider (matches the registry key).
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool;

    fn supports_function_calling(&self) -> bool;

    /// Model identifiers this provider can serve. Prefer [`Provider::model_catalog`]
    /// where capability/cost detail is needed; this stays for quick membership checks.
    fn supported_models(&self) -> Vec<String>;

    /// Validate configuration and run one health probe. Idempotent: safe to
    /// call more than once. The default constructs nothing further — HTTP
    /// adapters do their config validation in `new()` — but it still probes
    /// once so `ProviderRegistry::initialize_all` has a real answer.
    async fn initialize(&self) -> Result<(), ProviderError> {
        self.health_check().await.map(|_| ())
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError>;

    /// Default implementation returns a configuration error; providers that
    /// support embeddings override this.
    async fn embedding(
        &self,
        _request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "embeddings not supported by this provider".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "audio transcription not supported by this provider".to_string(),
        })
    }

    /// Translate (rather than transcribe in-language) spoken audio into
    /// English text. Default delegates to the same error as
    /// `audio_transcription`; providers whose upstream exposes a distinct
    /// translate endpoint override this.
    async fn audio_translation(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "audio translation not supported by this provider".to_string(),
        })
    }

    async fn text_to_speech(&self, _request: SpeechRequest) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::Configuration {
            message: "text-to-speech not supported by this provider".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError>;

    /// Describe the models this provider offers, for the registry's
    /// model→provider index and cost-aware routing.
    ///
    /// Default builds a bare descriptor (no cost, no capability tags) from
    /// `supported_models()` for providers that don't override this.
    fn model_catalog(&self) -> Vec<crate::models::ModelDescriptor> {
        self.supported_models()
            .into_iter()
            .map(|id| crate::models::ModelDescriptor::new(id, self.name()))
            .collect()
    }

    /// Cost for one model, or `None` if unknown. Default looks it up in
    /// `model_catalog()`.
    fn get_cost_info(&self, model_id: &str) -> Option<ModelCost> {
        self.model_catalog()
            .into_iter()
            .find(|d| d.id == model_id)
            .and_then(|d| d.cost)
    }

    /// Release sockets and stop background work. HTTP-only adapters (no
    /// persistent connection) have nothing to release; the default is a
    /// no-op.
    async fn destroy(&self) {}
}

/// Configuration for a provider instance: credentials, endpoint, timeouts,
/// retry policy, and per-provider extras (model mapping, custom headers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(with = "crate::common::duration_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "crate::common::duration_serde")]
    pub retry_delay: Duration,
    pub model_mapping: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            model_mapping: HashMap::new(),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model_mapping(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.model_mapping.insert(from.into(), to.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Result of a single `Provider::health_check()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub error_rate: f64,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub details: HashMap<String, String>,
}

/// Health as reported by a single probe. Distinct from
/// [`crate::registry::HealthStatus`] (the registry's longer-lived view,
/// which adds a terminal `Destroyed` state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Sliding-window performance counters for one provider: request counts
/// plus an exponentially-smoothed average latency. Owned by the
/// registry's [`crate::registry::ProviderRecord`] and updated by the
/// orchestrator after every attempt.
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Exponentially-smoothed average latency in milliseconds.
    pub average_latency_ms: f64,
    pub last_request: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_latency_ms: 0.0,
            last_request: None,
        }
    }
}

impl ProviderMetrics {
    /// EMA smoothing factor for `average_latency_ms`.
    const LATENCY_ALPHA: f64 = 0.1;

    pub fn record(&mut self, success: bool, latency_ms: u64) {
        self.total_requests += 1;
        self.last_request = Some(chrono::Utc::now());
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.average_latency_ms = Self::LATENCY_ALPHA * latency_ms as f64
            + (1.0 - Self::LATENCY_ALPHA) * self.average_latency_ms;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }
}

/// Construct a provider instance from configuration by name. Only `openai`
/// and `gemini` are wired today; the registry and orchestrator are
/// otherwise agnostic to provider count.
pub fn create_provider(config: ProviderConfig) -> Result<std::sync::Arc<dyn Provider>, ProviderError> {
    match config.name.as_str() {
        "openai" => Ok(std::sync::Arc::new(openai::OpenAIProvider::new(config)?)),
        "gemini" => Ok(std::sync::Arc::new(gemini::GeminiProvider::new(config)?)),
        _ => Err(ProviderError::ProviderNotSupported {
            provider: config.name,
        }),
    }
}
