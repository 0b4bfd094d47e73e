//! Upstream adapter for a Gemini-shaped realtime transcription API (C7).
//!
//! Session config is applied once at connect via the `setup` frame; later
//! `session.update` patches are best-effort (Gemini's Live API does not
//! support reconfiguring an open session). Audio flows through
//! `realtimeInput`/`clientContent` frames instead of OpenAI's
//! `input_audio_buffer.*` vocabulary.

use crate::realtime::{RealtimeError, RealtimeProviderKind, RealtimeSessionConfig, RealtimeUpstreamAdapter};
use crate::vad::{map_to_gemini, VadMode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
const QUEUE_CAPACITY: usize = 1000;

struct BoundedQueue {
    items: Mutex<VecDeque<Value>>,
    notify: Notify,
}

impl BoundedQueue {
    fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new() }
    }

    async fn push(&self, value: Value) {
        let mut items = self.items.lock().await;
        if items.len() >= QUEUE_CAPACITY {
            items.pop_front();
            tracing::warn!("realtime outbound queue full, dropping oldest frame");
        }
        items.push_back(value);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<Value> {
        self.items.try_lock().ok().and_then(|mut items| items.pop_front())
    }

    async fn drain_one(&self) -> Value {
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            self.notify.notified().await;
        }
    }
}

pub struct GeminiRealtimeAdapter {
    ws_url: String,
    api_key: String,
    manual_vad: bool,
    outbound: Arc<BoundedQueue>,
    inbound: Arc<Mutex<VecDeque<Value>>>,
    closed: Arc<AtomicBool>,
    writer_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl GeminiRealtimeAdapter {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            manual_vad: false,
            outbound: Arc::new(BoundedQueue::new()),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(AtomicBool::new(false)),
            writer_task: None,
            reader_task: None,
            keepalive_task: None,
        }
    }

    async fn enqueue(&self, frame: Value) {
        self.outbound.push(frame).await;
    }

    fn setup_frame(config: &RealtimeSessionConfig) -> Value {
        let activity_detection = config.vad.as_ref().map(map_to_gemini);
        json!({
            "setup": {
                "model": config.model,
                "generationConfig": {
                    "responseModalities": ["TEXT"],
                },
                "inputAudioTranscription": {
                    "language": config.language,
                    "prompt": config.prompt,
                },
                "realtimeInputConfig": {
                    "automaticActivityDetection": activity_detection,
                },
            }
        })
    }
}

#[async_trait::async_trait]
impl RealtimeUpstreamAdapter for GeminiRealtimeAdapter {
    fn provider_kind(&self) -> RealtimeProviderKind {
        RealtimeProviderKind::Gemini
    }

    async fn connect(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        self.manual_vad = matches!(config.vad.as_ref().map(|v| v.mode), Some(VadMode::Manual));

        let url = format!("{}?key={}", self.ws_url, self.api_key);
        let mut request = url
            .into_client_request()
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        request
            .headers_mut()
            .insert("Content-Type", HeaderValue::from_static("application/json"));

        let (stream, _response) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| RealtimeError::ConnectTimeout)?
        .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let (mut sink, mut source) = stream.split();

        let outbound = self.outbound.clone();
        self.writer_task = Some(tokio::spawn(async move {
            loop {
                let frame = outbound.drain_one().await;
                let text = frame.to_string();
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }));

        let inbound = self.inbound.clone();
        let closed = self.closed.clone();
        self.reader_task = Some(tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            let mut queue = inbound.lock().await;
                            if queue.len() >= QUEUE_CAPACITY {
                                queue.pop_front();
                            }
                            queue.push_back(value);
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                            let mut queue = inbound.lock().await;
                            if queue.len() >= QUEUE_CAPACITY {
                                queue.pop_front();
                            }
                            queue.push_back(value);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            closed.store(true, Ordering::SeqCst);
        }));

        let outbound_keepalive = self.outbound.clone();
        self.keepalive_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            loop {
                ticker.tick().await;
                outbound_keepalive.push(json!({"type": "ping"})).await;
            }
        }));

        self.enqueue(Self::setup_frame(config)).await;
        Ok(())
    }

    async fn send_session_update(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        self.manual_vad = matches!(config.vad.as_ref().map(|v| v.mode), Some(VadMode::Manual));
        tracing::debug!("gemini realtime session update is best-effort on an open connection");
        Ok(())
    }

    async fn append_audio_base64(&mut self, audio_b64: &str) -> Result<(), RealtimeError> {
        self.enqueue(json!({
            "realtimeInput": {
                "audio": {
                    "data": audio_b64,
                    "mimeType": "audio/pcm;rate=16000",
                }
            }
        }))
        .await;
        Ok(())
    }

    async fn commit_audio(&mut self) -> Result<(), RealtimeError> {
        if self.manual_vad {
            self.enqueue(json!({
                "clientContent": {
                    "turns": [],
                    "turnComplete": true,
                }
            }))
            .await;
        }
        Ok(())
    }

    async fn clear_audio(&mut self) -> Result<(), RealtimeError> {
        Ok(())
    }

    fn try_next_event(&mut self) -> Option<Value> {
        self.inbound.try_lock().ok().and_then(|mut queue| queue.pop_front())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
    }
}

impl Drop for GeminiRealtimeAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VadConfig;

    #[test]
    fn adapter_reports_gemini_kind() {
        let adapter = GeminiRealtimeAdapter::new("wss://example.invalid", "key-test");
        assert_eq!(adapter.provider_kind(), RealtimeProviderKind::Gemini);
    }

    #[test]
    fn setup_frame_carries_model_and_transcription_language() {
        let config = RealtimeSessionConfig {
            model: Some("gemini-live-test".to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        };
        let frame = GeminiRealtimeAdapter::setup_frame(&config);
        assert_eq!(frame["setup"]["model"], "gemini-live-test");
        assert_eq!(frame["setup"]["inputAudioTranscription"]["language"], "en");
    }

    #[test]
    fn setup_frame_maps_vad_through_gemini_mapper() {
        let config = RealtimeSessionConfig { vad: Some(VadConfig::manual()), ..Default::default() };
        let frame = GeminiRealtimeAdapter::setup_frame(&config);
        assert_eq!(
            frame["setup"]["realtimeInputConfig"]["automaticActivityDetection"]["disabled"],
            true
        );
    }

    #[tokio::test]
    async fn manual_vad_commit_sends_turn_complete() {
        let mut adapter = GeminiRealtimeAdapter::new("wss://example.invalid", "key-test");
        adapter.manual_vad = true;
        adapter.commit_audio().await.unwrap();
        let frame = adapter.outbound.try_pop().unwrap();
        assert_eq!(frame["clientContent"]["turnComplete"], true);
    }

    #[tokio::test]
    async fn server_vad_commit_is_a_no_op() {
        let mut adapter = GeminiRealtimeAdapter::new("wss://example.invalid", "key-test");
        adapter.manual_vad = false;
        adapter.commit_audio().await.unwrap();
        assert!(adapter.outbound.try_pop().is_none());
    }
}
