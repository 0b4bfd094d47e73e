//! Upstream adapter for an OpenAI-shaped realtime transcription API (C7).
//!
//! Wraps a `tokio-tungstenite` WebSocket: bearer auth plus a realtime
//! version header on connect, a bounded pre-open send queue drained by a
//! dedicated writer task, and a 20s keep-alive ping once open.

use crate::realtime::{RealtimeError, RealtimeProviderKind, RealtimeSessionConfig, RealtimeUpstreamAdapter};
use crate::vad::map_to_openai;
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

/// Bounded FIFO that evicts the oldest entry (with a warning) rather than
/// blocking the caller when full. Shared between the public adapter methods
/// (producers) and the background writer task (consumer).
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

pub struct OpenAiRealtimeAdapter {
    ws_url: String,
    api_key: String,
    outbound: Arc<BoundedQueue>,
    inbound: Arc<Mutex<VecDeque<Value>>>,
    closed: Arc<AtomicBool>,
    writer_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl OpenAiRealtimeAdapter {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
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
}

#[async_trait::async_trait]
impl RealtimeUpstreamAdapter for OpenAiRealtimeAdapter {
    fn provider_kind(&self) -> RealtimeProviderKind {
        RealtimeProviderKind::OpenAi
    }

    async fn connect(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        let mut request = self
            .ws_url
            .clone()
            .into_client_request()
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

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

        self.send_session_update(config).await?;
        Ok(())
    }

    async fn send_session_update(&mut self, config: &RealtimeSessionConfig) -> Result<(), RealtimeError> {
        let turn_detection = config.vad.as_ref().and_then(map_to_openai);
        self.enqueue(json!({
            "type": "transcription_session.update",
            "session": {
                "input_audio_transcription": {
                    "language": config.language,
                    "prompt": config.prompt,
                },
                "turn_detection": turn_detection,
                "include": config.include,
            }
        }))
        .await;
        Ok(())
    }

    async fn append_audio_base64(&mut self, audio_b64: &str) -> Result<(), RealtimeError> {
        self.enqueue(json!({"type": "input_audio_buffer.append", "audio": audio_b64})).await;
        Ok(())
    }

    async fn commit_audio(&mut self) -> Result<(), RealtimeError> {
        self.enqueue(json!({"type": "input_audio_buffer.commit"})).await;
        Ok(())
    }

    async fn clear_audio(&mut self) -> Result<(), RealtimeError> {
        self.enqueue(json!({"type": "input_audio_buffer.clear"})).await;
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

impl Drop for OpenAiRealtimeAdapter {
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

    #[tokio::test]
    async fn outbound_queue_evicts_oldest_when_full() {
        let queue = BoundedQueue::new();
        for i in 0..QUEUE_CAPACITY + 10 {
            queue.push(json!({"i": i})).await;
        }
        let first = queue.try_pop().unwrap();
        assert_eq!(first["i"], 10);
    }

    #[test]
    fn adapter_reports_openai_kind() {
        let adapter = OpenAiRealtimeAdapter::new("wss://example.invalid", "sk-test");
        assert_eq!(adapter.provider_kind(), RealtimeProviderKind::OpenAi);
    }
}
