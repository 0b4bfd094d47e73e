//! # gateway-core
//!
//! The orchestration library behind the gateway binary: provider adapters
//! (C1), the provider registry (C2), per-provider circuit breakers (C3),
//! request routing (C4), the [`client::Gateway`] orchestrator that ties
//! them together (C5), and the realtime audio transcription subsystem
//! (C6-C8).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use gateway_core::{Gateway, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::builder()
//!         .with_openai("your-openai-key")
//!         .with_gemini("your-gemini-key")
//!         .build()
//!         .await?;
//!     gateway.initialize().await;
//!
//!     let request = ChatRequest {
//!         model: "gpt-4".to_string(),
//!         messages: vec![Message::user("Hello, world!")],
//!         temperature: Some(0.7),
//!         max_tokens: Some(100),
//!         ..Default::default()
//!     };
//!
//!     let response = gateway.chat_completion(request).await?;
//!     println!("{}", response.choices[0].message.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! Every non-streaming call goes through [`client::Gateway::dispatch`]:
//! resolve the model to its provider(s), filter to providers whose circuit
//! breaker currently admits requests, let the [`routing::Router`] pick one,
//! invoke it with retry/backoff under the breaker, and attempt exactly one
//! fallback provider if the primary's retry budget is exhausted. Errors
//! classify into a fixed [`error::ErrorKind`] taxonomy so callers never
//! branch on raw HTTP status or provider identity.
//!
//! ## Providers
//!
//! Two adapters ship today: [`providers::openai`] (OpenAI's chat/embedding/
//! audio API) and [`providers::gemini`] (Google's Gemini REST API). Adding
//! one means implementing [`providers::Provider`] and wiring it into
//! [`providers::create_provider`].

pub mod audio;
pub mod circuit_breaker;
pub mod client;
pub mod common;
pub mod error;
pub mod models;
pub mod providers;
pub mod realtime;
pub mod registry;
pub mod routing;
pub mod vad;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, CircuitState,
};
pub use client::{Gateway, GatewayBuilder, GatewayConfig};
pub use error::{ClientError, ErrorKind, ProviderError};
pub use models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, Choice, EmbeddingRequest,
    EmbeddingResponse, Message, ModelDescriptor, Role, SpeechRequest, SpeechResponse, Usage,
};
pub use providers::{create_provider, Provider, ProviderConfig, ProviderMetrics};
pub use realtime::{
    AnyRealtimeAdapter, ClientEvent, RealtimeError, RealtimeProviderKind, RealtimeSession,
    RealtimeSessionConfig, SessionState,
};
pub use registry::{ProviderRecord, ProviderRegistry, RegistryConfig};
pub use routing::{EligibleProvider, ProviderSelection, RoutingContext, RoutingStrategy};

/// Convenience alias for SDK operations that can fail with [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn message_constructors_set_expected_role() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
    }

    #[test]
    fn chat_request_default_is_empty() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn provider_config_new_sets_defaults() {
        let config = ProviderConfig::new("test-provider", "test-key");
        assert_eq!(config.name, "test-provider");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.timeout.as_secs(), 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.enabled);
    }

    #[test]
    fn routing_strategy_defaults_to_cost_optimized() {
        assert_eq!(RoutingStrategy::default(), RoutingStrategy::CostOptimized);
    }
}
