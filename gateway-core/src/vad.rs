//! # VAD Mapper
//!
//! Translates the gateway's neutral voice-activity-detection config into
//! each realtime provider's native wire shape (C10). Pure, side-effect-free
//! translation — no network or session state involved.

use serde::{Deserialize, Serialize};

/// Neutral VAD configuration accepted from the client in `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VadConfig {
    #[serde(rename = "type")]
    pub mode: VadMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_sensitivity: Option<VadSensitivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_sensitivity: Option<VadSensitivity>,
}

impl VadConfig {
    pub fn manual() -> Self {
        Self {
            mode: VadMode::Manual,
            silence_duration_ms: None,
            prefix_padding_ms: None,
            start_sensitivity: None,
            end_sensitivity: None,
        }
    }

    pub fn server_vad() -> Self {
        Self {
            mode: VadMode::ServerVad,
            silence_duration_ms: None,
            prefix_padding_ms: None,
            start_sensitivity: None,
            end_sensitivity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadMode {
    ServerVad,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VadSensitivity {
    High,
    Medium,
    Low,
}

const DEFAULT_SILENCE_DURATION_MS: u32 = 500;
const DEFAULT_PREFIX_PADDING_MS: u32 = 300;

/// OpenAI-shaped `transcription_session.update.input_audio_transcription`
/// turn-detection frame. `None` disables provider-side VAD (manual mode).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpenAiTurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
}

pub fn map_to_openai(config: &VadConfig) -> Option<OpenAiTurnDetection> {
    match config.mode {
        VadMode::Manual => None,
        VadMode::ServerVad => Some(OpenAiTurnDetection {
            detection_type: "server_vad".to_string(),
            silence_duration_ms: config.silence_duration_ms.unwrap_or(DEFAULT_SILENCE_DURATION_MS),
            prefix_padding_ms: config.prefix_padding_ms.unwrap_or(DEFAULT_PREFIX_PADDING_MS),
        }),
    }
}

/// Inverse of [`map_to_openai`], used by the VAD round-trip test.
pub fn unmap_from_openai(detection: Option<&OpenAiTurnDetection>) -> VadConfig {
    match detection {
        None => VadConfig::manual(),
        Some(d) => VadConfig {
            mode: VadMode::ServerVad,
            silence_duration_ms: Some(d.silence_duration_ms),
            prefix_padding_ms: Some(d.prefix_padding_ms),
            start_sensitivity: None,
            end_sensitivity: None,
        },
    }
}

/// Gemini-shaped `automaticActivityDetection` block.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeminiActivityDetection {
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_of_speech_sensitivity: Option<VadSensitivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_speech_sensitivity: Option<VadSensitivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,
}

pub fn map_to_gemini(config: &VadConfig) -> GeminiActivityDetection {
    match config.mode {
        VadMode::Manual => GeminiActivityDetection {
            disabled: true,
            start_of_speech_sensitivity: None,
            end_of_speech_sensitivity: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        },
        VadMode::ServerVad => GeminiActivityDetection {
            disabled: false,
            start_of_speech_sensitivity: Some(config.start_sensitivity.unwrap_or(VadSensitivity::Medium)),
            end_of_speech_sensitivity: Some(config.end_sensitivity.unwrap_or(VadSensitivity::Medium)),
            prefix_padding_ms: Some(config.prefix_padding_ms.unwrap_or(DEFAULT_PREFIX_PADDING_MS)),
            silence_duration_ms: Some(config.silence_duration_ms.unwrap_or(DEFAULT_SILENCE_DURATION_MS)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_mode_disables_openai_vad() {
        assert_eq!(map_to_openai(&VadConfig::manual()), None);
    }

    #[test]
    fn server_vad_uses_documented_defaults() {
        let mapped = map_to_openai(&VadConfig::server_vad()).unwrap();
        assert_eq!(mapped.silence_duration_ms, 500);
        assert_eq!(mapped.prefix_padding_ms, 300);
    }

    #[test]
    fn openai_round_trip_preserves_type_and_timings() {
        let original = VadConfig {
            mode: VadMode::ServerVad,
            silence_duration_ms: Some(750),
            prefix_padding_ms: Some(200),
            start_sensitivity: None,
            end_sensitivity: None,
        };
        let mapped = map_to_openai(&original).unwrap();
        let roundtripped = unmap_from_openai(Some(&mapped));
        assert_eq!(roundtripped.mode, original.mode);
        assert_eq!(roundtripped.silence_duration_ms, original.silence_duration_ms);
        assert_eq!(roundtripped.prefix_padding_ms, original.prefix_padding_ms);
    }

    #[test]
    fn manual_round_trip_is_manual() {
        assert_eq!(unmap_from_openai(None).mode, VadMode::Manual);
    }

    #[test]
    fn gemini_manual_disables_detection() {
        let mapped = map_to_gemini(&VadConfig::manual());
        assert!(mapped.disabled);
    }

    #[test]
    fn gemini_server_vad_enables_with_defaults() {
        let mapped = map_to_gemini(&VadConfig::server_vad());
        assert!(!mapped.disabled);
        assert_eq!(mapped.silence_duration_ms, Some(500));
        assert_eq!(mapped.prefix_padding_ms, Some(300));
    }
}
