//! # HTTP/WebSocket request handlers
//!
//! Every `/v1/*` endpoint described in the external API reference: chat
//! completions (JSON and SSE-streamed), embeddings, audio transcription/
//! translation/speech, model listing, health/metrics, admin introspection,
//! and the realtime transcription WebSocket (plus its deprecated,
//! 410-returning predecessor).

use crate::gateway_error::GatewayError;
use crate::server::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::http::StatusCode;
use futures::StreamExt;
use gateway_core::models::{AudioRequest, AudioResponse, ChatRequest, EmbeddingRequest, EmbeddingResponse, SpeechRequest, SpeechResponse};
use gateway_core::realtime::{AnyRealtimeAdapter, ClientEvent, RealtimeSession};
use gateway_core::realtime::RealtimeProviderKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

/// `POST /v1/chat/completions`. Non-streaming requests return the chat
/// response as JSON; `"stream": true` switches to SSE, terminated by the
/// literal `data: [DONE]\n\n` frame once the upstream stream ends.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    if request.stream.unwrap_or(false) {
        return Ok(streaming_chat_completions(state, request).await?.into_response());
    }

    let response = state.gateway.chat_completion(request).await?;
    Ok(Json(response).into_response())
}

async fn streaming_chat_completions(
    state: AppState,
    request: ChatRequest,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let mut stream = state.gateway.stream_chat_completion(request).await?;

    let events = async_stream::stream! {
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    let data = serde_json::to_string(&chunk).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
                Err(e) => {
                    let error_body = json!({
                        "error": {
                            "code": "PROVIDER_TRANSIENT_ERROR",
                            "message": e.to_string(),
                        }
                    });
                    yield Ok(Event::default().data(error_body.to_string()));
                    break;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `POST /v1/embeddings`.
pub async fn embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, GatewayError> {
    Ok(Json(state.gateway.embedding(request).await?))
}

/// `POST /v1/audio/transcriptions`.
pub async fn audio_transcriptions(
    State(state): State<AppState>,
    Json(request): Json<AudioRequest>,
) -> Result<Json<AudioResponse>, GatewayError> {
    Ok(Json(state.gateway.audio_transcription(request).await?))
}

/// `POST /v1/audio/translations`.
pub async fn audio_translations(
    State(state): State<AppState>,
    Json(request): Json<AudioRequest>,
) -> Result<Json<AudioResponse>, GatewayError> {
    Ok(Json(state.gateway.audio_translation(request).await?))
}

/// `POST /v1/audio/speech`.
pub async fn text_to_speech(
    State(state): State<AppState>,
    Json(request): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, GatewayError> {
    Ok(Json(state.gateway.text_to_speech(request).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct ModelsQuery {
    pub capability: Option<String>,
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub provider: Option<String>,
    pub realtime: Option<bool>,
    pub search: Option<String>,
}

/// `GET /v1/models`, filterable by `capability`, `type` (alias for
/// capability), `provider`, `realtime`, and a case-insensitive `search`
/// substring over the model id.
pub async fn list_models(State(state): State<AppState>, Query(query): Query<ModelsQuery>) -> Json<Value> {
    let mut models = state.gateway.registry().get_available_models();

    let capability_filter = query.capability.or(query.model_type);
    if let Some(capability) = capability_filter {
        models.retain(|m| m.capabilities.iter().any(|c| format!("{c:?}").eq_ignore_ascii_case(&capability)));
    }
    if let Some(provider) = &query.provider {
        models.retain(|m| &m.provider == provider);
    }
    if query.realtime == Some(true) {
        models.retain(|m| m.capabilities.iter().any(|c| matches!(c, gateway_core::models::ModelCapability::Realtime)));
    }
    if let Some(search) = &query.search {
        let search = search.to_ascii_lowercase();
        models.retain(|m| m.id.to_ascii_lowercase().contains(&search));
    }

    let data: Vec<Value> = models
        .into_iter()
        .map(|m| {
            json!({
                "id": m.id,
                "object": "model",
                "provider": m.provider,
                "capabilities": m.capabilities,
                "context_window": m.context_window,
            })
        })
        .collect();

    Json(json!({ "object": "list", "data": data }))
}

/// `GET /v1/models/capability/{cap}`: shorthand for `GET /v1/models?capability=`.
pub async fn list_models_by_capability(
    State(state): State<AppState>,
    Path(cap): Path<String>,
    Query(mut query): Query<ModelsQuery>,
) -> Json<Value> {
    query.capability = Some(cap);
    list_models(State(state), Query(query)).await
}

/// `GET /v1/models/{id}`.
pub async fn get_model(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, GatewayError> {
    let descriptor = state
        .gateway
        .registry()
        .get_model_info(&id)
        .ok_or_else(|| GatewayError::Client(gateway_core::ClientError::ModelNotFound { model: id }))?;

    Ok(Json(json!({
        "id": descriptor.id,
        "object": "model",
        "provider": descriptor.provider,
        "capabilities": descriptor.capabilities,
        "context_window": descriptor.context_window,
    })))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /health/ready`: ready once at least one provider is not unhealthy.
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let healthy = state.gateway.get_provider_health_status().await.into_values().any(|ok| ok);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({ "ready": healthy }))).into_response()
}

pub async fn health_live() -> Json<Value> {
    Json(json!({ "alive": true }))
}

pub async fn health_detailed(State(state): State<AppState>) -> Json<Value> {
    let providers = state.gateway.get_provider_health_status().await;
    Json(json!({
        "status": "healthy",
        "providers": providers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn health_metrics() -> Json<Value> {
    let metrics = crate::metrics::get_aggregated_metrics().await;
    Json(serde_json::to_value(metrics).unwrap_or(Value::Null))
}

pub async fn metrics() -> Json<Value> {
    let metrics = crate::metrics::get_aggregated_metrics().await;
    Json(serde_json::to_value(metrics).unwrap_or(Value::Null))
}

pub async fn prometheus_metrics() -> Response {
    let body = crate::metrics::get_prometheus_metrics().await;
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn list_providers(State(state): State<AppState>) -> Json<Value> {
    let providers: Vec<Value> = state
        .gateway
        .registry()
        .get_all()
        .into_iter()
        .map(|record| {
            json!({
                "name": record.name,
                "health_status": format!("{:?}", record.health_status),
                "total_requests": record.metrics.total_requests,
                "successful_requests": record.metrics.successful_requests,
                "failed_requests": record.metrics.failed_requests,
                "average_latency_ms": record.metrics.average_latency_ms,
            })
        })
        .collect();
    Json(json!({ "providers": providers }))
}

pub async fn get_circuit_breaker_metrics(State(state): State<AppState>) -> Json<Value> {
    let metrics = state.gateway.get_circuit_breaker_metrics().await;
    let out: serde_json::Map<String, Value> = metrics
        .into_iter()
        .map(|(name, m)| {
            (
                name,
                json!({
                    "state": format!("{:?}", m.state),
                    "failure_count": m.failure_count,
                    "success_count": m.success_count,
                }),
            )
        })
        .collect();
    Json(Value::Object(out))
}

/// `GET /v1/realtime/transcribe`, the deprecated predecessor of
/// `/v1/realtime/transcription`. Returns 410 Gone without upgrading the
/// connection: clients that try to speak the old protocol get a
/// clear signal rather than a silently-broken WebSocket.
pub async fn realtime_transcribe_deprecated() -> Response {
    GatewayError::Deprecated {
        message: "Deprecated endpoint. Use /v1/realtime/transcription".to_string(),
    }
    .into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct RealtimeQuery {
    pub provider: Option<String>,
}

/// `GET /v1/realtime/transcription`: upgrades to a WebSocket, sends
/// `session.created` immediately, then drives a
/// [`RealtimeSession<AnyRealtimeAdapter>`] for the lifetime of the socket.
pub async fn realtime_transcription(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_realtime_socket(socket, state, query))
}

async fn handle_realtime_socket(mut socket: WebSocket, state: AppState, query: RealtimeQuery) {
    let provider_kind = match query.provider.as_deref() {
        Some("gemini") => RealtimeProviderKind::Gemini,
        _ => RealtimeProviderKind::OpenAi,
    };
    let (ws_url, api_key) = match provider_kind {
        RealtimeProviderKind::OpenAi => (
            state.config.realtime.openai_ws_url.clone(),
            state.config.providers.get("openai").map(|p| p.api_key.clone()).unwrap_or_default(),
        ),
        RealtimeProviderKind::Gemini => (
            state.config.realtime.gemini_ws_url.clone(),
            state.config.providers.get("gemini").map(|p| p.api_key.clone()).unwrap_or_default(),
        ),
    };

    let adapter = AnyRealtimeAdapter::new(provider_kind, ws_url, api_key);
    let mut session = RealtimeSession::new(adapter).with_max_chunk_bytes(state.config.realtime.max_chunk_bytes);

    let created = session.session_created_event();
    if socket.send(WsMessage::Text(created.to_string().into())).await.is_err() {
        return;
    }

    let idle_timeout = Duration::from_secs(state.config.realtime.idle_timeout_secs);
    let mut idle_check = tokio::time::interval(Duration::from_secs(15));
    let mut upstream_poll = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(incoming) = incoming else { break };
                let Ok(incoming) = incoming else { break };
                match incoming {
                    WsMessage::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                for outgoing in session.handle_client_event(event).await {
                                    if socket.send(WsMessage::Text(outgoing.to_string().into())).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                let error = json!({"type": "error", "code": "invalid_event", "message": e.to_string()});
                                if socket.send(WsMessage::Text(error.to_string().into())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    WsMessage::Binary(_) => {
                        let error = json!({"type": "error", "code": "binary_unsupported", "message": "binary frames are not supported"});
                        if socket.send(WsMessage::Text(error.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                }
            }
            _ = upstream_poll.tick() => {
                for outgoing in session.drain_upstream_events() {
                    if socket.send(WsMessage::Text(outgoing.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
            _ = idle_check.tick() => {
                if session.is_idle(idle_timeout) {
                    let idle_event = session.idle_timeout_event();
                    let _ = socket.send(WsMessage::Text(idle_event.to_string().into())).await;
                    break;
                }
            }
        }
    }

    session.close().await;
    let _ = socket.send(WsMessage::Close(None)).await;
}
