//! # HTTP/WebSocket server
//!
//! Assembles a [`gateway_core::Gateway`] from [`Config`], wraps it in
//! [`AppState`], and wires the route table plus middleware stack
//! (CORS → auth → rate limit → logging → metrics → timeout). The realtime
//! transcription WebSocket and its deprecated predecessor are registered
//! here alongside the ordinary `/v1/*` JSON endpoints.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{auth_middleware, cors_middleware, logging_middleware, metrics_middleware, rate_limit_middleware, RateLimiter};
use axum::{
    routing::{get, post},
    Router,
};
use gateway_core::Gateway;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

/// Shared application state handed to every handler and middleware layer.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Builds the [`Gateway`] from `config.providers`, initializes it (one
/// health probe round), assembles the route table, and layers the
/// middleware stack.
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    let mut builder = Gateway::builder()
        .with_routing_strategy(config.routing.strategy)
        .with_circuit_breaker_config(config.circuit_breaker.clone());

    for (name, provider_config) in &config.providers {
        if provider_config.enabled {
            builder = builder.with_provider(name.clone(), provider_config.clone());
        }
    }

    let gateway = builder.build().await?;
    let summary = gateway.initialize().await;
    if summary.successful == 0 && summary.total > 0 {
        tracing::warn!(total = summary.total, "no configured provider passed its initial health check");
    }

    crate::metrics::initialize_metrics(crate::metrics::MetricsConfig {
        enabled: config.metrics.enabled,
        ..Default::default()
    })
    .await;

    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS is enabled with wildcard origins; configure explicit allowed_origins for production");
    }

    let rate_limiter = Arc::new(RateLimiter::new(
        std::time::Duration::from_millis(config.rate_limit.window_ms),
        config.rate_limit.max_requests,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        gateway: Arc::new(gateway),
        rate_limiter,
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/audio/transcriptions", post(handlers::audio_transcriptions))
        .route("/v1/audio/translations", post(handlers::audio_translations))
        .route("/v1/audio/speech", post(handlers::text_to_speech))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/capability/{cap}", get(handlers::list_models_by_capability))
        .route("/v1/models/{id}", get(handlers::get_model))
        .route("/v1/realtime/transcription", get(handlers::realtime_transcription))
        .route("/v1/realtime/transcribe", get(handlers::realtime_transcribe_deprecated))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::health_ready))
        .route("/health/live", get(handlers::health_live))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/health/metrics", get(handlers::health_metrics))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/admin/providers", get(handlers::list_providers))
        .route("/admin/circuit-breakers", get(handlers::get_circuit_breaker_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(cors_middleware(&state.config.server.cors))
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), logging_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), metrics_middleware))
                .layer(TimeoutLayer::new(state.config.server.timeout)),
        )
        .with_state(state);

    Ok(app)
}
