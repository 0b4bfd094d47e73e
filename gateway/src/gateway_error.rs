//! HTTP-facing error envelope.
//!
//! [`GatewayError`] wraps the SDK's [`ClientError`]/[`ProviderError`] plus
//! gateway-local variants (auth, malformed request, rate limit, admission)
//! and renders every one of them through [`ErrorKind`] into the
//! `{error:{name,message,code,statusCode,details,timestamp}}` envelope,
//! with `Retry-After` attached to rate-limit responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::error::{ClientError, ErrorKind, ProviderError};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("authentication required: {message}")]
    Auth { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("rate limit exceeded")]
    RateLimit { retry_after_secs: u64 },

    #[error("deprecated endpoint: {message}")]
    Deprecated { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Client(e) => e.kind(),
            GatewayError::Provider(e) => e.kind(),
            GatewayError::Auth { .. } => ErrorKind::Authentication,
            GatewayError::InvalidRequest { .. } => ErrorKind::Validation,
            GatewayError::RateLimit { .. } => ErrorKind::RateLimit,
            GatewayError::Deprecated { .. } => ErrorKind::Validation,
            GatewayError::Internal { .. } | GatewayError::Serialization(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorKind::RateLimit => "RATE_LIMIT_EXCEEDED",
            ErrorKind::ProviderTransient => "PROVIDER_TRANSIENT_ERROR",
            ErrorKind::ProviderFatal => "PROVIDER_FATAL_ERROR",
            ErrorKind::CircuitOpen => "SERVICE_UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        if let GatewayError::Deprecated { .. } = self {
            return StatusCode::GONE;
        }
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ProviderTransient | ErrorKind::ProviderFatal => StatusCode::BAD_GATEWAY,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Value {
        match self {
            GatewayError::Client(ClientError::ModelNotFound { model }) => json!({ "model": model }),
            GatewayError::Client(ClientError::CircuitOpen { provider }) => json!({ "provider": provider }),
            GatewayError::Provider(ProviderError::ModelNotFound { model }) => json!({ "model": model }),
            GatewayError::Provider(ProviderError::Api { code, .. }) => json!({ "providerStatus": code }),
            GatewayError::InvalidRequest { .. } => Value::Null,
            _ => Value::Null,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let name = self.code();
        let message = self.to_string();
        let details = self.details();

        let body = Json(json!({
            "error": {
                "name": name,
                "message": message,
                "code": name,
                "statusCode": status.as_u16(),
                "details": details,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        let mut response = (status, body).into_response();
        if let GatewayError::RateLimit { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}
