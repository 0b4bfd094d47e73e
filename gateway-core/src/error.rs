//! Error taxonomy for the gateway SDK: a closed set of *kinds*, not
//! source classes. [`ProviderError`] is what an adapter returns from a
//! single upstream call; [`ClientError`] is what the orchestrator returns
//! once retry/failover/admission have all had their say. Both classify
//! into [`ErrorKind`] so callers branch on taxonomy, never on raw HTTP
//! status or provider identity.
//!
//! ```rust
//! use gateway_core::error::{ClientError, ProviderError};
//!
//! let provider_error = ProviderError::RateLimit;
//! let client_error: ClientError = provider_error.into();
//! assert_eq!(client_error.kind(), gateway_core::error::ErrorKind::RateLimit);
//! ```

use thiserror::Error;

/// The error taxonomy: a *kind*, not a source class. The orchestrator
/// and the HTTP layer branch on this, never on raw status codes or
/// provider identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, missing required field, invalid role/voice/audio
    /// chunk. 400, never retried.
    Validation,
    /// 401/403, never retried.
    Authentication,
    /// Unknown or unsupported model/capability pair. 404.
    ModelNotFound,
    /// 429, optional `Retry-After`. Never retried within the same call.
    RateLimit,
    /// Upstream 5xx, connection reset, timeout. Retried with exponential
    /// backoff; failover attempted once the retry budget is exhausted.
    ProviderTransient,
    /// Authentication failures at upstream, quota exhaustion. Not retried.
    ProviderFatal,
    /// Circuit open or admission queue full. 503.
    CircuitOpen,
    /// Anything unclassifiable. 500, logged with its source chain.
    Internal,
}

impl ErrorKind {
    /// Whether the orchestrator's retry loop should keep trying the same
    /// provider on this kind of failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ProviderTransient)
    }
}

/// High-level client operation errors.
///
/// This enum represents errors that can occur during client operations,
/// including provider errors, network issues, configuration problems,
/// and system-level failures.
///
/// # Examples
///
/// ```rust,ignore
/// use gateway_core::ClientError;
///
/// // Handle specific error types
/// match client.chat_completion(request).await {
///     Ok(response) => println!("Success"),
///     Err(ClientError::Provider(provider_error)) => {
///         println!("Provider error: {}", provider_error);
///     }
///     Err(ClientError::Timeout) => {
///         println!("Request timed out");
///     }
///     Err(e) => println!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum ClientError {
    /// Wrapped provider-specific errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// HTTP client and network communication errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization and deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid or missing configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Provider routing and selection errors
    #[error("Routing error: {message}")]
    Routing { message: String },

    /// Cache operation failures
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Request timeout errors
    #[error("Timeout error")]
    Timeout,

    /// Rate limit exceeded errors
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Authentication and authorization failures
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid or malformed request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Network connectivity and communication errors
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Requested model has no provider registered for it.
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    /// Every eligible provider's circuit breaker is open for this request.
    #[error("Circuit open for provider: {provider}")]
    CircuitOpen { provider: String },

    /// The bounded admission queue is full; the request was rejected
    /// before an attempt was made.
    #[error("Admission queue full")]
    AdmissionQueueFull,

    /// Unclassifiable failure; logged with its source chain.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Classify into the taxonomy, delegating to the wrapped
    /// [`ProviderError`] where one exists.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Provider(e) => e.kind(),
            ClientError::Configuration { .. } | ClientError::Routing { .. } | ClientError::Cache { .. } => {
                ErrorKind::Internal
            }
            ClientError::Timeout => ErrorKind::ProviderTransient,
            ClientError::RateLimit => ErrorKind::RateLimit,
            ClientError::Authentication { .. } => ErrorKind::Authentication,
            ClientError::InvalidRequest { .. } => ErrorKind::Validation,
            ClientError::NetworkError { .. } => ErrorKind::ProviderTransient,
            ClientError::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            ClientError::CircuitOpen { .. } | ClientError::AdmissionQueueFull => ErrorKind::CircuitOpen,
            ClientError::Internal { .. } | ClientError::Serialization { .. } | ClientError::Http(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Provider-specific API and communication errors.
///
/// This enum represents errors that can occur during interactions with
/// individual AI providers, including API errors, authentication failures,
/// rate limiting, and service unavailability.
///
/// # Examples
///
/// ```rust,ignore
/// use gateway_core::ProviderError;
///
/// // Handle provider-specific errors
/// match provider.chat_completion(request).await {
///     Ok(response) => println!("Success"),
///     Err(ProviderError::InvalidApiKey) => {
///         println!("Invalid API key");
///     }
///     Err(ProviderError::RateLimit) => {
///         println!("Rate limit exceeded");
///     }
///     Err(ProviderError::ServiceUnavailable) => {
///         println!("Service unavailable");
///     }
///     Err(e) => println!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP client and network communication errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API-specific errors with status code and message
    #[error("API error: {code} - {message}")]
    Api { code: u16, message: String },

    /// Invalid or missing API key errors
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Requested model not found or unsupported
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    /// Rate limit exceeded for this provider
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider quota exceeded
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// Provider service temporarily unavailable
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Request timeout errors
    #[error("Timeout")]
    Timeout,

    /// JSON serialization and deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or malformed response format
    #[error("Invalid response format")]
    InvalidResponse,

    /// Invalid or missing provider configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unsupported provider type
    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },

    /// Unsupported feature for this provider
    #[error("Feature not supported: {feature}")]
    FeatureNotSupported { feature: String },

    /// Authentication and authorization failures
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Request validation failures
    #[error("Request validation failed: {field} - {message}")]
    ValidationError { field: String, message: String },

    /// Network connectivity and communication errors
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Retryable errors that can be attempted again
    #[error("Retryable error: {message}")]
    RetryableError { message: String },
}

impl ProviderError {
    /// Classify into the taxonomy. Adapters build these variants from
    /// upstream HTTP status in `handle_error_response`; this is where that
    /// classification becomes load-bearing for the orchestrator's
    /// retry/failover decision.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::ValidationError { .. } => ErrorKind::Validation,
            ProviderError::InvalidApiKey | ProviderError::AuthenticationFailed { .. } => {
                ErrorKind::Authentication
            }
            ProviderError::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            ProviderError::RateLimit => ErrorKind::RateLimit,
            ProviderError::QuotaExceeded => ErrorKind::ProviderFatal,
            ProviderError::ServiceUnavailable
            | ProviderError::Timeout
            | ProviderError::NetworkError { .. }
            | ProviderError::RetryableError { .. } => ErrorKind::ProviderTransient,
            ProviderError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorKind::ProviderTransient
                } else if let Some(status) = e.status() {
                    Self::kind_from_status(status.as_u16())
                } else {
                    ErrorKind::ProviderTransient
                }
            }
            ProviderError::Api { code, .. } => Self::kind_from_status(*code),
            ProviderError::Configuration { .. }
            | ProviderError::ProviderNotSupported { .. }
            | ProviderError::FeatureNotSupported { .. } => ErrorKind::Internal,
            ProviderError::Serialization(_) | ProviderError::InvalidResponse => ErrorKind::Internal,
        }
    }

    fn kind_from_status(code: u16) -> ErrorKind {
        match code {
            400 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Authentication,
            404 => ErrorKind::ModelNotFound,
            429 => ErrorKind::RateLimit,
            500..=599 => ErrorKind::ProviderTransient,
            _ => ErrorKind::Internal,
        }
    }

    /// Shorthand for `kind().is_retryable()`, used by the orchestrator's
    /// retry loop so it never has to import [`ErrorKind`] itself.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes_per_taxonomy() {
        assert_eq!(ProviderError::kind_from_status(400), ErrorKind::Validation);
        assert_eq!(ProviderError::kind_from_status(401), ErrorKind::Authentication);
        assert_eq!(ProviderError::kind_from_status(403), ErrorKind::Authentication);
        assert_eq!(ProviderError::kind_from_status(404), ErrorKind::ModelNotFound);
        assert_eq!(ProviderError::kind_from_status(429), ErrorKind::RateLimit);
        assert_eq!(ProviderError::kind_from_status(503), ErrorKind::ProviderTransient);
        assert_eq!(ProviderError::kind_from_status(418), ErrorKind::Internal);
    }

    #[test]
    fn only_provider_transient_is_retryable() {
        assert!(ErrorKind::ProviderTransient.is_retryable());
        assert!(!ErrorKind::RateLimit.is_retryable());
        assert!(!ErrorKind::ModelNotFound.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }

    #[test]
    fn provider_error_variants_classify_as_expected() {
        assert_eq!(ProviderError::RateLimit.kind(), ErrorKind::RateLimit);
        assert_eq!(ProviderError::QuotaExceeded.kind(), ErrorKind::ProviderFatal);
        assert_eq!(ProviderError::ServiceUnavailable.kind(), ErrorKind::ProviderTransient);
        assert_eq!(
            ProviderError::ModelNotFound { model: "gpt-5".into() }.kind(),
            ErrorKind::ModelNotFound
        );
        assert_eq!(
            ProviderError::ValidationError { field: "model".into(), message: "required".into() }.kind(),
            ErrorKind::Validation
        );
        assert!(ProviderError::ServiceUnavailable.is_retryable());
        assert!(!ProviderError::RateLimit.is_retryable());
    }

    #[test]
    fn client_error_delegates_to_wrapped_provider_error() {
        let client_error: ClientError = ProviderError::RateLimit.into();
        assert_eq!(client_error.kind(), ErrorKind::RateLimit);
    }

    #[test]
    fn client_error_local_variants_classify_as_circuit_open() {
        assert_eq!(
            ClientError::CircuitOpen { provider: "openai".into() }.kind(),
            ErrorKind::CircuitOpen
        );
        assert_eq!(ClientError::AdmissionQueueFull.kind(), ErrorKind::CircuitOpen);
    }
}
