//! # gateway-server
//!
//! The HTTP/WebSocket binary shell around [`gateway_core`]: config loading,
//! auth, CORS, logging, metrics, and the route handlers that translate
//! `/v1/*` JSON/SSE/WebSocket traffic into [`gateway_core::Gateway`] calls.
//!
//! None of this module's internals are part of the core's contract — only
//! the external HTTP/WS surface described in the project's API reference
//! is. The core (provider registry, circuit breaker, router, realtime
//! session multiplexer) lives entirely in `gateway_core`; this crate is
//! glue.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use gateway_server::{create_server, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("gateway.toml")?;
//!     let app = create_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod gateway_error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod request_context;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use gateway_core::providers::ProviderConfig;

    fn config_with_openai() -> Config {
        let mut config = Config::default();
        config.providers.insert("openai".to_string(), ProviderConfig::new("openai", "test-key"));
        config
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn models_endpoint_lists_registered_providers() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/v1/models").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert!(body["data"].is_array());
    }

    #[tokio::test]
    async fn deprecated_realtime_path_returns_410() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/v1/realtime/transcribe").await;
        assert_eq!(response.status_code(), StatusCode::GONE);
    }

    #[test]
    fn config_validation_rejects_zero_port() {
        let mut config = config_with_openai();
        assert!(config.validate().is_ok());
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_parsing_accepts_unit_suffixes() {
        use std::time::Duration;
        assert_eq!(crate::config::parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(crate::config::parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(crate::config::parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(crate::config::parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert!(crate::config::parse_duration("abc").is_err());
    }

    #[test]
    fn environment_overrides_apply_on_top_of_defaults() {
        let mut config = Config::default();
        std::env::set_var("GATEWAY_PORT", "8080");
        std::env::set_var("GATEWAY_LOG_LEVEL", "debug");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "debug");
        std::env::remove_var("GATEWAY_PORT");
        std::env::remove_var("GATEWAY_LOG_LEVEL");
    }
}
