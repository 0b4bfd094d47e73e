//! # Realtime Event Normalizer (C8)
//!
//! Pure mapping from a provider-native realtime event to the gateway's fixed
//! unified vocabulary. No I/O, no session state: identical inputs always
//! produce identical outputs, and an empty or unrecognized event normalizes
//! to an empty list rather than an error.

use serde::Serialize;
use serde_json::Value;

/// Which realtime provider shape `normalize` should interpret the event as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProviderKind {
    OpenAi,
    Gemini,
}

/// One event in the gateway's unified realtime vocabulary, ready to be
/// serialized straight onto the client WebSocket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum UnifiedEvent {
    #[serde(rename = "transcript.delta")]
    TranscriptDelta {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    #[serde(rename = "transcript.done")]
    TranscriptDone {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    #[serde(rename = "speech_started")]
    SpeechStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    #[serde(rename = "speech_stopped")]
    SpeechStopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    #[serde(rename = "interrupted")]
    Interrupted { interrupted: bool },
    #[serde(rename = "usage")]
    Usage { data: Value },
    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated { data: Value },
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

/// Normalize one provider-native event. Never panics, never returns an
/// error: unknown shapes simply yield no unified events.
pub fn normalize(provider: RealtimeProviderKind, event: &Value) -> Vec<UnifiedEvent> {
    match provider {
        RealtimeProviderKind::OpenAi => normalize_openai(event),
        RealtimeProviderKind::Gemini => normalize_gemini(event),
    }
}

fn str_field<'a>(event: &'a Value, field: &str) -> Option<&'a str> {
    event.get(field).and_then(|v| v.as_str())
}

fn normalize_openai(event: &Value) -> Vec<UnifiedEvent> {
    let Some(kind) = str_field(event, "type") else {
        return Vec::new();
    };

    match kind {
        "conversation.item.input_audio_transcription.delta" => {
            let Some(text) = str_field(event, "delta") else {
                return Vec::new();
            };
            vec![UnifiedEvent::TranscriptDelta { text: text.to_string(), meta: None }]
        }
        "conversation.item.input_audio_transcription.completed" => {
            vec![UnifiedEvent::TranscriptDone {
                text: str_field(event, "transcript").map(str::to_string),
            }]
        }
        "input_audio_buffer.speech_started" => vec![UnifiedEvent::SpeechStarted { meta: None }],
        "input_audio_buffer.speech_stopped" => vec![UnifiedEvent::SpeechStopped { meta: None }],
        "rate_limits.updated" => vec![UnifiedEvent::RateLimitsUpdated { data: event.clone() }],
        "error" => vec![openai_error_event(event)],
        _ => Vec::new(),
    }
}

fn openai_error_event(event: &Value) -> UnifiedEvent {
    let error = event.get("error").cloned().unwrap_or(Value::Null);
    let code = error
        .get("code")
        .and_then(|c| c.as_str())
        .unwrap_or("provider_error")
        .to_string();
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("upstream realtime error")
        .to_string();

    UnifiedEvent::Error {
        code,
        message,
        provider: "openai".to_string(),
        details: Some(error),
    }
}

fn normalize_gemini(event: &Value) -> Vec<UnifiedEvent> {
    let mut events = Vec::new();

    let content = event
        .get("serverContent")
        .or_else(|| event.get("realtimeServerContent"));

    if let Some(content) = content {
        if let Some(text) = content
            .get("inputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|t| t.as_str())
        {
            events.push(UnifiedEvent::TranscriptDelta {
                text: text.to_string(),
                meta: Some(serde_json::json!({"source": "input"})),
            });
        }

        if let Some(transcriptions) = content
            .get("inputTranscriptions")
            .and_then(|t| t.as_array())
        {
            for entry in transcriptions {
                if let Some(text) = entry.get("text").and_then(|t| t.as_str()) {
                    events.push(UnifiedEvent::TranscriptDelta {
                        text: text.to_string(),
                        meta: Some(serde_json::json!({"source": "input"})),
                    });
                }
            }
        }

        if let Some(parts) = content
            .get("modelTurn")
            .and_then(|t| t.get("parts"))
            .and_then(|p| p.as_array())
        {
            let concatenated: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if !concatenated.is_empty() {
                events.push(UnifiedEvent::TranscriptDelta {
                    text: concatenated,
                    meta: Some(serde_json::json!({"source": "model"})),
                });
            }
        }

        if content.get("turnComplete").and_then(|v| v.as_bool()) == Some(true) {
            events.push(UnifiedEvent::TranscriptDone { text: None });
        }

        if let Some(interrupted) = content.get("interrupted").and_then(|v| v.as_bool()) {
            events.push(UnifiedEvent::Interrupted { interrupted });
        }
    }

    if let Some(usage) = event.get("usageMetadata") {
        events.push(UnifiedEvent::Usage { data: usage.clone() });
    }

    if let Some(error) = event.get("error") {
        let code = error
            .get("code")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "provider_error".to_string());
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("upstream realtime error")
            .to_string();
        events.push(UnifiedEvent::Error {
            code,
            message,
            provider: "gemini".to_string(),
            details: Some(error.clone()),
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_event_normalizes_to_empty_list() {
        assert!(normalize(RealtimeProviderKind::OpenAi, &json!({})).is_empty());
        assert!(normalize(RealtimeProviderKind::Gemini, &json!({})).is_empty());
    }

    #[test]
    fn openai_delta_maps_to_transcript_delta() {
        let event = json!({
            "type": "conversation.item.input_audio_transcription.delta",
            "delta": "Hel",
        });
        let events = normalize(RealtimeProviderKind::OpenAi, &event);
        assert_eq!(events, vec![UnifiedEvent::TranscriptDelta { text: "Hel".to_string(), meta: None }]);
    }

    #[test]
    fn openai_completed_maps_to_transcript_done() {
        let event = json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "Hello",
        });
        let events = normalize(RealtimeProviderKind::OpenAi, &event);
        assert_eq!(events, vec![UnifiedEvent::TranscriptDone { text: Some("Hello".to_string()) }]);
    }

    #[test]
    fn openai_speech_edges_pass_through() {
        let started = json!({"type": "input_audio_buffer.speech_started"});
        let stopped = json!({"type": "input_audio_buffer.speech_stopped"});
        assert_eq!(normalize(RealtimeProviderKind::OpenAi, &started), vec![UnifiedEvent::SpeechStarted { meta: None }]);
        assert_eq!(normalize(RealtimeProviderKind::OpenAi, &stopped), vec![UnifiedEvent::SpeechStopped { meta: None }]);
    }

    #[test]
    fn openai_error_defaults_code_when_absent() {
        let event = json!({"type": "error", "error": {"message": "boom"}});
        let events = normalize(RealtimeProviderKind::OpenAi, &event);
        match &events[0] {
            UnifiedEvent::Error { code, provider, .. } => {
                assert_eq!(code, "provider_error");
                assert_eq!(provider, "openai");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn openai_unknown_type_drops() {
        let event = json!({"type": "response.audio.delta"});
        assert!(normalize(RealtimeProviderKind::OpenAi, &event).is_empty());
    }

    #[test]
    fn gemini_input_transcription_maps_with_source_meta() {
        let event = json!({"serverContent": {"inputTranscription": {"text": "hi"}}});
        let events = normalize(RealtimeProviderKind::Gemini, &event);
        assert_eq!(
            events,
            vec![UnifiedEvent::TranscriptDelta {
                text: "hi".to_string(),
                meta: Some(json!({"source": "input"})),
            }]
        );
    }

    #[test]
    fn gemini_model_turn_concatenates_parts() {
        let event = json!({
            "serverContent": {
                "modelTurn": {"parts": [{"text": "Hel"}, {"text": "lo"}]}
            }
        });
        let events = normalize(RealtimeProviderKind::Gemini, &event);
        assert_eq!(
            events,
            vec![UnifiedEvent::TranscriptDelta {
                text: "Hello".to_string(),
                meta: Some(json!({"source": "model"})),
            }]
        );
    }

    #[test]
    fn gemini_turn_complete_maps_to_transcript_done() {
        let event = json!({"serverContent": {"turnComplete": true}});
        assert_eq!(
            normalize(RealtimeProviderKind::Gemini, &event),
            vec![UnifiedEvent::TranscriptDone { text: None }]
        );
    }

    #[test]
    fn gemini_interrupted_flag_passes_through() {
        let event = json!({"serverContent": {"interrupted": true}});
        assert_eq!(
            normalize(RealtimeProviderKind::Gemini, &event),
            vec![UnifiedEvent::Interrupted { interrupted: true }]
        );
    }

    #[test]
    fn gemini_usage_metadata_passes_through() {
        let event = json!({"usageMetadata": {"totalTokenCount": 42}});
        let events = normalize(RealtimeProviderKind::Gemini, &event);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], UnifiedEvent::Usage { .. }));
    }

    #[test]
    fn normalize_is_pure() {
        let event = json!({"type": "input_audio_buffer.speech_started"});
        let first = normalize(RealtimeProviderKind::OpenAi, &event);
        let second = normalize(RealtimeProviderKind::OpenAi, &event);
        assert_eq!(first, second);
    }
}
