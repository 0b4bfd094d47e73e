//! Gateway configuration.
//!
//! A [`Config`] is loaded from an optional TOML file and then layered with
//! environment variable overrides: server binding, the provider map,
//! routing strategy, auth, global rate limiting, CORS, and realtime
//! session defaults. [`Config::validate`] runs once before the server is
//! built so a misconfigured deployment fails fast instead of at the first
//! request.

use gateway_core::circuit_breaker::CircuitBreakerConfig;
use gateway_core::providers::ProviderConfig;
use gateway_core::routing::RoutingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Provider configs keyed by name (`"openai"`, `"gemini"`).
    pub providers: HashMap<String, ProviderConfig>,
    pub routing: RoutingConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "gateway_core::common::duration_serde")]
    pub timeout: Duration,
    pub max_body_size: usize,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategy,
    #[serde(with = "gateway_core::common::duration_serde")]
    pub health_check_interval: Duration,
}

/// A single opt-in header gates `/v1/*`. No JWT, no sessions, no per-key
/// rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Header name client keys are read from, in addition to the always-
    /// accepted `Authorization: Bearer ...` and `X-API-Key` forms.
    pub header_name: String,
    pub api_keys: Vec<String>,
}

/// Global sliding-window rate limiting (`RATE_LIMIT_WINDOW_MS`,
/// `RATE_LIMIT_MAX_REQUESTS`). Not per API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Realtime session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub idle_timeout_secs: u64,
    pub max_chunk_bytes: usize,
    pub send_queue_capacity: usize,
    pub keep_alive_interval_secs: u64,
    pub openai_ws_url: String,
    pub gemini_ws_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Config {
    /// Loads the TOML file at `path` if it exists, otherwise starts from
    /// [`Config::default`], then applies environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(_) => Config::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(port_str) = env::var("GATEWAY_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid GATEWAY_PORT: {}", port_str))?;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            if !api_key.is_empty() {
                self.providers
                    .entry("openai".to_string())
                    .or_insert_with(|| ProviderConfig::new("openai", ""))
                    .api_key = api_key;
            }
        }
        if let Ok(api_key) = env::var("GEMINI_API_KEY") {
            if !api_key.is_empty() {
                self.providers
                    .entry("gemini".to_string())
                    .or_insert_with(|| ProviderConfig::new("gemini", ""))
                    .api_key = api_key;
            }
        }

        if let Ok(header) = env::var("API_KEY_HEADER") {
            if !header.is_empty() {
                self.auth.header_name = header;
            }
        }
        if let Ok(require_auth) = env::var("REQUIRE_AUTH_HEADER") {
            self.auth.enabled = parse_bool(&require_auth);
        }

        if let Ok(window_ms) = env::var("RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = window_ms
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid RATE_LIMIT_WINDOW_MS: {}", window_ms))?;
        }
        if let Ok(max_requests) = env::var("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = max_requests
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid RATE_LIMIT_MAX_REQUESTS: {}", max_requests))?;
        }

        if let Ok(cors_enabled) = env::var("CORS_ENABLED") {
            self.server.cors.enabled = parse_bool(&cors_enabled);
        }
        if let Ok(origins) = env::var("CORS_ORIGINS") {
            self.server.cors.allowed_origins =
                origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(url) = env::var("OPENAI_REALTIME_WS_URL") {
            if !url.is_empty() {
                self.realtime.openai_ws_url = url;
            }
        }
        if let Ok(url) = env::var("GEMINI_LIVE_WS_URL") {
            if !url.is_empty() {
                self.realtime.gemini_ws_url = url;
            }
        }

        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Checks: at least one provider configured, provider API keys present
    /// when enabled, port in range, realtime queue/timeout values positive.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port must be between 1 and 65535"));
        }

        let enabled_providers: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, provider)| provider.enabled)
            .collect();
        if enabled_providers.is_empty() {
            return Err(anyhow::anyhow!("at least one provider must be configured and enabled"));
        }
        for (name, provider) in &enabled_providers {
            if provider.api_key.is_empty() {
                return Err(anyhow::anyhow!("provider {} is enabled but has no API key", name));
            }
        }

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            return Err(anyhow::anyhow!(
                "REQUIRE_AUTH_HEADER is set but no gateway API keys are configured"
            ));
        }

        if self.rate_limit.window_ms == 0 {
            return Err(anyhow::anyhow!("rate_limit.window_ms must be positive"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(anyhow::anyhow!("rate_limit.max_requests must be positive"));
        }

        if self.realtime.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("realtime.idle_timeout_secs must be positive"));
        }
        if self.realtime.max_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("realtime.max_chunk_bytes must be positive"));
        }
        if self.realtime.send_queue_capacity == 0 {
            return Err(anyhow::anyhow!("realtime.send_queue_capacity must be positive"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                timeout: Duration::from_secs(30),
                max_body_size: 25 * 1024 * 1024,
                cors: CorsConfig {
                    enabled: true,
                    allowed_origins: vec!["*".to_string()],
                },
            },
            providers: HashMap::new(),
            routing: RoutingConfig {
                strategy: RoutingStrategy::CostOptimized,
                health_check_interval: Duration::from_secs(30),
            },
            auth: AuthConfig {
                enabled: false,
                header_name: "Authorization".to_string(),
                api_keys: vec![],
            },
            rate_limit: RateLimitConfig {
                window_ms: 60_000,
                max_requests: 120,
            },
            circuit_breaker: CircuitBreakerConfig::default(),
            realtime: RealtimeConfig {
                idle_timeout_secs: 60,
                max_chunk_bytes: gateway_core::audio::DEFAULT_MAX_CHUNK_BYTES,
                send_queue_capacity: 1000,
                keep_alive_interval_secs: 15,
                openai_ws_url: "wss://api.openai.com/v1/realtime".to_string(),
                gemini_ws_url: "wss://generativelanguage.googleapis.com/ws".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            metrics: MetricsConfig { enabled: true },
        }
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    gateway_core::common::duration_serde::parse_duration_string(s).map_err(|e| anyhow::anyhow!(e))
}
