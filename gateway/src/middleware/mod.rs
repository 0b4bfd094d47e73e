//! # HTTP Middleware
//!
//! The request/response middleware stack: CORS, request logging, metrics
//! recording, the global sliding-window rate limiter, and the single
//! opt-in auth header check. Applied in `server::create_server` in the
//! order CORS → auth → rate limit → logging → metrics → timeout.

use crate::config::CorsConfig;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::{self, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};

/// Request/response logging with latency and request-id correlation.
pub async fn logging_middleware(State(_state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .extensions()
        .get::<crate::request_context::RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = latency.as_millis(),
        "request processed"
    );

    response
}

/// Records per-request metrics for everything except dashboarding
/// endpoints (`/health`, `/metrics`, `/ws/*`), which would otherwise
/// dominate the sample with their own polling traffic.
pub async fn metrics_middleware(State(_state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let response = next.run(req).await;
    let latency = start.elapsed();
    let status = response.status();

    let should_record = !uri.path().starts_with("/metrics")
        && !uri.path().starts_with("/health")
        && !uri.path().starts_with("/ws/");

    if should_record {
        let metrics =
            crate::metrics::RequestMetricsBuilder::new(method.to_string(), uri.path().to_string(), status.as_u16(), latency)
                .build();
        crate::metrics::record_request(metrics).await;
    }

    response
}

/// Global sliding-window rate limiter (`RATE_LIMIT_WINDOW_MS`,
/// `RATE_LIMIT_MAX_REQUESTS`), shared across every client rather than
/// keyed per API key.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Records one request attempt and reports whether it fits under the
    /// window's budget. Prunes expired timestamps first so the window
    /// slides rather than resetting in fixed buckets.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().unwrap();
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() as u32 >= self.max_requests {
            return false;
        }
        timestamps.push_back(now);
        true
    }
}

pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    if !state.rate_limiter.try_acquire() {
        let retry_after_secs = state.config.rate_limit.window_ms.div_ceil(1000);
        let body = Json(json!({
            "error": {
                "name": "RATE_LIMIT_EXCEEDED",
                "message": "rate limit exceeded",
                "code": "RATE_LIMIT_EXCEEDED",
                "statusCode": 429,
                "details": null,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        if let Ok(value) = http::HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert("Retry-After", value);
        }
        return response;
    }

    next.run(req).await
}

/// A single opt-in header gates `/v1/*`. CORS preflight is always let
/// through; every other route (`/health`, `/metrics`, websockets) is
/// intentionally left ungated.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    if !req.uri().path().starts_with("/v1/") {
        return next.run(req).await;
    }

    let key = crate::auth::extract_api_key(req.headers(), &state.config.auth);
    if !crate::auth::is_authorized(key.as_deref(), &state.config.auth) {
        return crate::gateway_error::GatewayError::Auth {
            message: "missing or invalid API key".to_string(),
        }
        .into_response();
    }

    let request_context = crate::request_context::RequestContext::with_auth(None, key);
    req.extensions_mut().insert(request_context);

    next.run(req).await
}

pub fn cors_middleware(cors_config: &CorsConfig) -> CorsLayer {
    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(origin) = origin.parse::<http::header::HeaderValue>() {
                cors = cors.allow_origin(origin);
            }
        }
    }

    cors.allow_methods(Any).allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_admits_up_to_the_configured_max() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn rate_limiter_admits_again_once_the_window_elapses() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire());
    }
}
