//! Runtime-selected realtime adapter (C7 dispatch).
//!
//! [`RealtimeSession`](crate::realtime::RealtimeSession) is generic over a
//! single concrete [`RealtimeUpstreamAdapter`], but the WebSocket handler
//! that owns it doesn't know which provider a client wants until the
//! upgrade request arrives. `AnyRealtimeAdapter` closes that gap the same
//! way [`crate::providers::create_provider`] dispatches over provider name:
//! one enum, one match per trait method.

use super::normalizer::RealtimeProviderKind;
use super::session::{RealtimeSessionConfig, RealtimeUpstreamAdapter};
use super::RealtimeError;
use crate::providers::gemini_realtime::GeminiRealtimeAdapter;
use crate::providers::openai_realtime::OpenAiRealtimeAdapter;
use serde_json::Value;

pub enum AnyRealtimeAdapter {
    OpenAi(OpenAiRealtimeAdapter),
    Gemini(GeminiRealtimeAdapter),
}

impl AnyRealtimeAdapter {
    pub fn new(kind: RealtimeProviderKind, ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        match kind {
            RealtimeProviderKind::OpenAi => Self::OpenAi(OpenAiRealtimeAdapter::new(ws_url, api_key)),
            RealtimeProviderKind::Gemini => Self::Gemini(GeminiRealtimeAdapter::new(ws_url, api_key)),
        }
    }
}

#[async_trait::async_trait]
impl RealtimeUpstreamAdapter for AnyRealtimeAdapter {
    fn provider_kind(&self) -> RealtimeProviderKind {
        match self {
            Self::OpenAi(a) => a.provider_kind(),
            Self::Gemini(a) => a.provider_kind(),
        }
    }

    async fn connect(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        match self {
            Self::OpenAi(a) => a.connect(config).await,
            Self::Gemini(a) => a.connect(config).await,
        }
    }

    async fn send_session_update(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        match self {
            Self::OpenAi(a) => a.send_session_update(config).await,
            Self::Gemini(a) => a.send_session_update(config).await,
        }
    }

    async fn append_audio_base64(&mut self, audio_b64: &str) -> Result<(), RealtimeError> {
        match self {
            Self::OpenAi(a) => a.append_audio_base64(audio_b64).await,
            Self::Gemini(a) => a.append_audio_base64(audio_b64).await,
        }
    }

    async fn commit_audio(&mut self) -> Result<(), RealtimeError> {
        match self {
            Self::OpenAi(a) => a.commit_audio().await,
            Self::Gemini(a) => a.commit_audio().await,
        }
    }

    async fn clear_audio(&mut self) -> Result<(), RealtimeError> {
        match self {
            Self::OpenAi(a) => a.clear_audio().await,
            Self::Gemini(a) => a.clear_audio().await,
        }
    }

    fn try_next_event(&mut self) -> Option<Value> {
        match self {
            Self::OpenAi(a) => a.try_next_event(),
            Self::Gemini(a) => a.try_next_event(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Self::OpenAi(a) => a.is_closed(),
            Self::Gemini(a) => a.is_closed(),
        }
    }

    async fn close(&mut self) {
        match self {
            Self::OpenAi(a) => a.close().await,
            Self::Gemini(a) => a.close().await,
        }
    }
}
