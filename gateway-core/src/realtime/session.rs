//! # Realtime Session Multiplexer (C6)
//!
//! One [`RealtimeSession`] per client WebSocket: owns the canonical state
//! machine (CONNECTED → CONFIGURED → UPSTREAM_OPEN → CLOSED), lazily opens
//! the upstream adapter on first audio, validates every chunk before
//! touching the network, and tracks buffered-audio accounting.
//!
//! Session state is confined to a single task; this type is not `Sync`
//! by design (the adapter is driven from one place at a time).

use crate::audio::{decode_and_validate_chunk, AudioAccounting, AudioError, DEFAULT_MAX_CHUNK_BYTES};
use crate::realtime::{normalize, RealtimeError, RealtimeProviderKind, UnifiedEvent};
use crate::vad::VadConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Canonical lifecycle of a realtime session: CONNECTED → CONFIGURED →
/// UPSTREAM_OPEN → CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Configured,
    UpstreamOpen,
    Closed,
}

/// Neutral session configuration accumulated from `session.update` patches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeSessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vad: Option<VadConfig>,
}

impl RealtimeSessionConfig {
    /// Apply a partial update from a `session.update` message; only fields
    /// present in `patch` overwrite the current value.
    fn merge(&mut self, patch: RealtimeSessionConfig) {
        if patch.model.is_some() {
            self.model = patch.model;
        }
        if patch.provider.is_some() {
            self.provider = patch.provider;
        }
        if patch.language.is_some() {
            self.language = patch.language;
        }
        if patch.prompt.is_some() {
            self.prompt = patch.prompt;
        }
        if !patch.include.is_empty() {
            self.include = patch.include;
        }
        if patch.vad.is_some() {
            self.vad = patch.vad;
        }
    }
}

/// Client → gateway realtime messages, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(RealtimeSessionConfig),
    #[serde(rename = "input_audio.append")]
    InputAudioAppend { audio: String },
    #[serde(rename = "input_audio.commit")]
    InputAudioCommit {},
    #[serde(rename = "input_audio.clear")]
    InputAudioClear {},
}

/// Small canonical interface every realtime upstream adapter implements
/// (C7). Implementors: [`crate::providers::openai_realtime::OpenAiRealtimeAdapter`],
/// [`crate::providers::gemini_realtime::GeminiRealtimeAdapter`].
#[async_trait::async_trait]
pub trait RealtimeUpstreamAdapter: Send {
    fn provider_kind(&self) -> RealtimeProviderKind;

    /// Establish the upstream connection, honoring a 15s connect timeout.
    /// Must flush anything queued pre-open and start the adapter's own
    /// keep-alive where supported.
    async fn connect(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError>;

    async fn send_session_update(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError>;

    async fn append_audio_base64(&mut self, audio_b64: &str) -> Result<(), RealtimeError>;

    async fn commit_audio(&mut self) -> Result<(), RealtimeError>;

    async fn clear_audio(&mut self) -> Result<(), RealtimeError>;

    /// Pull the next upstream event already pushed onto the adapter's
    /// internal inbound queue, if any, without blocking.
    fn try_next_event(&mut self) -> Option<Value>;

    /// Whether the upstream connection has gone away since `connect()`
    /// succeeded (reader task exited on a close frame or a transport
    /// error). Checked on every poll so the session can react to a death
    /// that happens between client messages rather than only noticing on
    /// the next send.
    fn is_closed(&self) -> bool;

    async fn close(&mut self);
}

fn error_event(code: &str, message: &str) -> Value {
    json!({"type": "error", "code": code, "message": message})
}

fn error_event_with_provider(code: &str, message: &str, provider: &str) -> Value {
    json!({"type": "error", "code": code, "message": message, "provider": provider})
}

/// Per-client realtime session: owns the state machine, the upstream
/// adapter, and audio accounting. Generic over the adapter so the
/// multiplexer itself has no dependency on a specific provider's wire
/// format — only on the canonical [`RealtimeUpstreamAdapter`] contract.
pub struct RealtimeSession<A: RealtimeUpstreamAdapter> {
    pub id: Uuid,
    state: SessionState,
    config: RealtimeSessionConfig,
    adapter: A,
    accounting: AudioAccounting,
    max_chunk_bytes: usize,
    last_activity: Instant,
    /// Set once a `transcript.done` has been delivered to the client.
    /// Gates whether a later upstream death is reported as an `error` or
    /// passes silently.
    transcript_done_seen: bool,
}

impl<A: RealtimeUpstreamAdapter> RealtimeSession<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connected,
            config: RealtimeSessionConfig::default(),
            adapter,
            accounting: AudioAccounting::default(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            last_activity: Instant::now(),
            transcript_done_seen: false,
        }
    }

    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffered_audio_ms(&self) -> u64 {
        self.accounting.buffered_ms()
    }

    /// The `session.created` message the caller must send immediately after
    /// the WebSocket upgrade completes.
    pub fn session_created_event(&self) -> Value {
        json!({"type": "session.created", "sessionId": self.id})
    }

    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.last_activity.elapsed() > max_idle
    }

    pub fn idle_timeout_event(&self) -> Value {
        error_event("idle_timeout", "session closed: no client activity within the idle window")
    }

    /// Dispatch one client event, returning the gateway → client messages it
    /// produces (zero or more; audio appends that are accepted upstream
    /// produce none directly — their effects arrive later via
    /// `handle_upstream_event`).
    pub async fn handle_client_event(&mut self, event: ClientEvent) -> Vec<Value> {
        self.last_activity = Instant::now();
        match event {
            ClientEvent::SessionUpdate(patch) => self.handle_session_update(patch).await,
            ClientEvent::InputAudioAppend { audio } => self.handle_audio_append(audio).await,
            ClientEvent::InputAudioCommit {} => self.handle_audio_commit().await,
            ClientEvent::InputAudioClear {} => self.handle_audio_clear().await,
        }
    }

    /// Project a raw provider event through the normalizer into wire-ready
    /// gateway messages, in upstream arrival order.
    pub fn handle_upstream_event(&mut self, event: &Value) -> Vec<Value> {
        let unified = normalize(self.adapter.provider_kind(), event);
        self.note_unified_events(&unified);
        unified
            .into_iter()
            .map(|unified| serde_json::to_value(unified).unwrap_or(Value::Null))
            .collect()
    }

    /// Drain any upstream events the adapter has already buffered,
    /// normalized and ready for the client, then check whether the
    /// upstream connection has died since the last poll.
    pub fn drain_upstream_events(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(event) = self.adapter.try_next_event() {
            let unified = normalize(self.adapter.provider_kind(), &event);
            self.note_unified_events(&unified);
            out.extend(
                unified
                    .into_iter()
                    .map(|unified| serde_json::to_value(unified).unwrap_or(Value::Null)),
            );
        }
        if let Some(closed_event) = self.poll_upstream_closed() {
            out.push(closed_event);
        }
        out
    }

    fn note_unified_events(&mut self, events: &[UnifiedEvent]) {
        if events.iter().any(|event| matches!(event, UnifiedEvent::TranscriptDone { .. })) {
            self.transcript_done_seen = true;
        }
    }

    /// Checks whether the upstream adapter's reader task has exited since
    /// it was last observed open. Per the cancellation rule: surfaces as
    /// an `error` of code `upstream_closed` only if it happens before a
    /// `transcript.done`; otherwise the closure passes silently.
    fn poll_upstream_closed(&mut self) -> Option<Value> {
        if self.state != SessionState::UpstreamOpen || !self.adapter.is_closed() {
            return None;
        }
        self.state = SessionState::Closed;
        if self.transcript_done_seen {
            None
        } else {
            Some(error_event_with_provider(
                "upstream_closed",
                "upstream connection closed before a transcript was completed",
                self.config.provider.as_deref().unwrap_or("unknown"),
            ))
        }
    }

    pub async fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            self.adapter.close().await;
        }
    }

    async fn handle_session_update(&mut self, patch: RealtimeSessionConfig) -> Vec<Value> {
        self.config.merge(patch);
        if self.state == SessionState::Connected {
            self.state = SessionState::Configured;
        }

        if self.state == SessionState::UpstreamOpen {
            if let Err(err) = self.adapter.send_session_update(&self.config).await {
                return vec![error_event("upstream_closed", &err.to_string())];
            }
        }

        vec![json!({"type": "session.updated"})]
    }

    /// Validate first, open upstream second — see the corresponding design
    /// note on chunk-validation ordering.
    async fn handle_audio_append(&mut self, audio_b64: String) -> Vec<Value> {
        let bytes = match decode_and_validate_chunk(&audio_b64, self.max_chunk_bytes) {
            Ok(bytes) => bytes,
            Err(AudioError::InvalidBase64) => {
                return vec![error_event("invalid_audio_base64", "audio chunk is not valid base64")];
            }
            Err(_) => {
                return vec![error_event("invalid_audio_chunk", "audio chunk failed PCM16 validation")];
            }
        };

        if let Err(event) = self.ensure_upstream_open().await {
            return vec![event];
        }

        self.accounting.record_chunk(bytes.len());

        if let Err(err) = self.adapter.append_audio_base64(&audio_b64).await {
            return vec![error_event("upstream_closed", &err.to_string())];
        }

        Vec::new()
    }

    async fn handle_audio_commit(&mut self) -> Vec<Value> {
        if let Err(event) = self.ensure_upstream_open().await {
            return vec![event];
        }
        if let Err(err) = self.adapter.commit_audio().await {
            return vec![error_event("upstream_closed", &err.to_string())];
        }
        Vec::new()
    }

    async fn handle_audio_clear(&mut self) -> Vec<Value> {
        self.accounting.clear();
        if self.state == SessionState::UpstreamOpen {
            if let Err(err) = self.adapter.clear_audio().await {
                return vec![error_event("upstream_closed", &err.to_string())];
            }
        }
        Vec::new()
    }

    async fn ensure_upstream_open(&mut self) -> Result<(), Value> {
        if self.state == SessionState::Closed {
            return Err(error_event("upstream_closed", "session already closed"));
        }
        if self.state == SessionState::UpstreamOpen {
            return Ok(());
        }

        match self.adapter.connect(&self.config).await {
            Ok(()) => {
                self.state = SessionState::UpstreamOpen;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Closed;
                Err(error_event_with_provider(
                    "upstream_closed",
                    &err.to_string(),
                    self.config.provider.as_deref().unwrap_or("unknown"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeAdapter {
        connected: Arc<AtomicBool>,
        connect_should_fail: bool,
        sent_updates: usize,
        appended: Vec<String>,
        committed: usize,
        cleared: usize,
        inbound: VecDeque<Value>,
        upstream_dead: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl RealtimeUpstreamAdapter for FakeAdapter {
        fn provider_kind(&self) -> RealtimeProviderKind {
            RealtimeProviderKind::OpenAi
        }

        async fn connect(&mut self, _config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
            if self.connect_should_fail {
                return Err(RealtimeError::ConnectTimeout);
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send_session_update(&mut self, _config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
            self.sent_updates += 1;
            Ok(())
        }

        async fn append_audio_base64(&mut self, audio_b64: &str) -> Result<(), RealtimeError> {
            self.appended.push(audio_b64.to_string());
            Ok(())
        }

        async fn commit_audio(&mut self) -> Result<(), RealtimeError> {
            self.committed += 1;
            Ok(())
        }

        async fn clear_audio(&mut self) -> Result<(), RealtimeError> {
            self.cleared += 1;
            Ok(())
        }

        fn try_next_event(&mut self) -> Option<Value> {
            self.inbound.pop_front()
        }

        fn is_closed(&self) -> bool {
            self.upstream_dead.load(Ordering::SeqCst)
        }

        async fn close(&mut self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    fn pcm16_b64(byte_len: usize) -> String {
        crate::audio::encode_chunk(&vec![0u8; byte_len])
    }

    #[tokio::test]
    async fn starts_connected_and_emits_session_created() {
        let session = RealtimeSession::new(FakeAdapter::default());
        assert_eq!(session.state(), SessionState::Connected);
        let event = session.session_created_event();
        assert_eq!(event["type"], "session.created");
    }

    #[tokio::test]
    async fn session_update_before_audio_moves_to_configured_without_opening_upstream() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        let events = session
            .handle_client_event(ClientEvent::SessionUpdate(RealtimeSessionConfig {
                model: Some("gpt-test".to_string()),
                ..Default::default()
            }))
            .await;
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(events[0]["type"], "session.updated");
    }

    #[tokio::test]
    async fn first_audio_append_lazily_opens_upstream() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        let events = session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(320) })
            .await;
        assert!(events.is_empty());
        assert_eq!(session.state(), SessionState::UpstreamOpen);
        assert_eq!(session.buffered_audio_ms(), 10);
    }

    #[tokio::test]
    async fn oversized_chunk_rejected_without_opening_upstream() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        let events = session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(40_000) })
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["code"], "invalid_audio_chunk");
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn invalid_base64_rejected_without_closing_session() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        let events = session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: "!!not-base64!!".to_string() })
            .await;
        assert_eq!(events[0]["code"], "invalid_audio_base64");
        assert_ne!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn commit_without_prior_audio_also_opens_upstream() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        session.handle_client_event(ClientEvent::InputAudioCommit {}).await;
        assert_eq!(session.state(), SessionState::UpstreamOpen);
    }

    #[tokio::test]
    async fn clear_resets_accounting() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(320) })
            .await;
        assert!(session.buffered_audio_ms() > 0);
        session.handle_client_event(ClientEvent::InputAudioClear {}).await;
        assert_eq!(session.buffered_audio_ms(), 0);
    }

    #[tokio::test]
    async fn failed_connect_closes_session_and_emits_error() {
        let adapter = FakeAdapter { connect_should_fail: true, ..Default::default() };
        let mut session = RealtimeSession::new(adapter);
        let events = session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(320) })
            .await;
        assert_eq!(events[0]["code"], "upstream_closed");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn upstream_event_normalizes_through_to_client() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        let event = json!({
            "type": "conversation.item.input_audio_transcription.delta",
            "delta": "Hello"
        });
        let out = session.handle_upstream_event(&event);
        assert_eq!(out[0]["type"], "transcript.delta");
        assert_eq!(out[0]["text"], "Hello");
    }

    #[tokio::test]
    async fn idle_detection_respects_configured_window() {
        let session = RealtimeSession::new(FakeAdapter::default());
        assert!(!session.is_idle(Duration::from_secs(60)));
        assert!(session.is_idle(Duration::from_secs(0)));
    }

    #[tokio::test]
    async fn upstream_death_before_transcript_done_surfaces_as_error() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(320) })
            .await;
        assert_eq!(session.state(), SessionState::UpstreamOpen);

        session.adapter.upstream_dead.store(true, Ordering::SeqCst);
        let events = session.drain_upstream_events();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["code"], "upstream_closed");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn upstream_death_after_transcript_done_is_silent() {
        let mut session = RealtimeSession::new(FakeAdapter::default());
        session
            .handle_client_event(ClientEvent::InputAudioAppend { audio: pcm16_b64(320) })
            .await;
        assert_eq!(session.state(), SessionState::UpstreamOpen);

        session.adapter.inbound.push_back(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "done talking"
        }));
        let completed = session.drain_upstream_events();
        assert_eq!(completed[0]["type"], "transcript.done");

        session.adapter.upstream_dead.store(true, Ordering::SeqCst);
        let events = session.drain_upstream_events();

        assert!(events.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
