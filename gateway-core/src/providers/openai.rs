use crate::common::validate_chat_request;
use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    SpeechRequest, SpeechResponse, StreamChunk,
};
use crate::providers::{HealthStatus, Provider, ProviderConfig, ProviderHealth, StreamResult};
use async_stream::stream;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Instant;

/// Adapter for the OpenAI chat/embeddings/audio API (C1, C7 upstream shape).
///
/// This is the canonical OpenAI-shaped provider the gateway fronts: its
/// wire format *is* the gateway's own external wire format, so request and
/// response bodies pass through largely unchanged.
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration {
                message: "OpenAI provider requires an API key".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        headers.insert(
            "Authorization",
            format!("Bearer {}", self.config.api_key).parse().unwrap(),
        );
        headers.insert("Content-Type", "application/json".parse().unwrap());

        for (key, value) in &self.config.headers {
            if let (Ok(header_name), Ok(header_value)) =
                (key.parse::<reqwest::header::HeaderName>(), value.parse())
            {
                headers.insert(header_name, header_value);
            }
        }

        headers
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();

        match response.text().await {
            Ok(body) => {
                if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&body) {
                    let message = error_json
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .unwrap_or("Unknown API error")
                        .to_string();

                    match status.as_u16() {
                        401 | 403 => ProviderError::InvalidApiKey,
                        404 => ProviderError::ModelNotFound {
                            model: "unknown".to_string(),
                        },
                        429 => ProviderError::RateLimit,
                        _ => ProviderError::Api {
                            code: status.as_u16(),
                            message,
                        },
                    }
                } else {
                    ProviderError::Api {
                        code: status.as_u16(),
                        message: body,
                    }
                }
            }
            Err(_) => ProviderError::Api {
                code: status.as_u16(),
                message: "Failed to read error response".to_string(),
            },
        }
    }

    /// `audio/transcriptions` and `audio/translations` share the same
    /// multipart shape; only the endpoint and (for transcription) the
    /// optional `language` field differ.
    async fn transcribe_or_translate(
        &self,
        endpoint: &str,
        mut request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        if request.file.is_empty() {
            return Err(ProviderError::ValidationError {
                field: "file".to_string(),
                message: "audio file is required".to_string(),
            });
        }
        request.model = self.map_model(&request.model);
        let url = self.build_url(endpoint);
        let headers = self.build_headers();

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(request.file)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", request.model);

        if let Some(language) = request.language {
            form = form.text("language", language);
        }
        if let Some(prompt) = request.prompt {
            form = form.text("prompt", prompt);
        }

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let audio_response: AudioResponse = response.json().await?;
        Ok(audio_response)
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
            "text-embedding-3-small".to_string(),
            "text-embedding-3-large".to_string(),
            "text-embedding-ada-002".to_string(),
            "whisper-1".to_string(),
            "tts-1".to_string(),
            "tts-1-hd".to_string(),
        ]
    }

    async fn chat_completion(
        &self,
        mut request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        validate_chat_request(&request)?;
        request.model = self.map_model(&request.model);
        let url = self.build_url("chat/completions");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response)
    }

    async fn stream_chat_completion(
        &self,
        mut request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        validate_chat_request(&request)?;
        request.model = self.map_model(&request.model);
        request.stream = Some(true);

        let url = self.build_url("chat/completions");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        buffer.push_str(&chunk_str);

                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if let Some(json_str) = line.strip_prefix("data: ") {
                                if json_str == "[DONE]" {
                                    return;
                                }

                                match serde_json::from_str::<StreamChunk>(json_str) {
                                    Ok(stream_chunk) => yield Ok(stream_chunk),
                                    Err(e) => yield Err(ProviderError::Serialization(e)),
                                }
                            }
                        }
                    }
                    Err(e) => yield Err(ProviderError::Http(e)),
                }
            }
        });

        Ok(stream)
    }

    async fn embedding(
        &self,
        mut request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        request.model = self.map_model(&request.model);
        let url = self.build_url("embeddings");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let embedding_response: EmbeddingResponse = response.json().await?;
        Ok(embedding_response)
    }

    async fn audio_transcription(
        &self,
        request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        self.transcribe_or_translate("audio/transcriptions", request).await
    }

    async fn audio_translation(
        &self,
        request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        self.transcribe_or_translate("audio/translations", request).await
    }

    async fn text_to_speech(
        &self,
        mut request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        const VALID_VOICES: &[&str] = &[
            "alloy", "echo", "fable", "onyx", "nova", "shimmer",
        ];
        if !VALID_VOICES.contains(&request.voice.as_str()) {
            return Err(ProviderError::ValidationError {
                field: "voice".to_string(),
                message: format!("unsupported voice '{}'", request.voice),
            });
        }

        request.model = self.map_model(&request.model);
        let url = self.build_url("audio/speech");
        let headers = self.build_headers();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let audio_bytes = response.bytes().await?;

        Ok(SpeechResponse {
            audio: audio_bytes.to_vec(),
            content_type,
        })
    }

    fn model_catalog(&self) -> Vec<crate::models::ModelDescriptor> {
        use crate::models::{ModelCapability, ModelCost, ModelDescriptor};

        let chat = [ModelCapability::Chat, ModelCapability::Streaming, ModelCapability::FunctionCalling];
        let embed = [ModelCapability::Embedding];
        let audio_in = [ModelCapability::AudioTranscription];
        let audio_out = [ModelCapability::TextToSpeech];

        vec![
            ModelDescriptor::new("gpt-4o", self.name())
                .with_capabilities(chat)
                .with_cost(ModelCost { input_cost_per_1k: 0.0025, output_cost_per_1k: 0.01 })
                .with_context_window(128_000),
            ModelDescriptor::new("gpt-4o-mini", self.name())
                .with_capabilities(chat)
                .with_cost(ModelCost { input_cost_per_1k: 0.00015, output_cost_per_1k: 0.0006 })
                .with_context_window(128_000),
            ModelDescriptor::new("gpt-4-turbo", self.name())
                .with_capabilities(chat)
                .with_cost(ModelCost { input_cost_per_1k: 0.01, output_cost_per_1k: 0.03 })
                .with_context_window(128_000),
            ModelDescriptor::new("gpt-4", self.name())
                .with_capabilities(chat)
                .with_cost(ModelCost { input_cost_per_1k: 0.03, output_cost_per_1k: 0.06 })
                .with_context_window(8_192),
            ModelDescriptor::new("gpt-3.5-turbo", self.name())
                .with_capabilities(chat)
                .with_cost(ModelCost { input_cost_per_1k: 0.0005, output_cost_per_1k: 0.0015 })
                .with_context_window(16_385),
            ModelDescriptor::new("text-embedding-3-small", self.name())
                .with_capabilities(embed)
                .with_cost(ModelCost { input_cost_per_1k: 0.00002, output_cost_per_1k: 0.0 }),
            ModelDescriptor::new("text-embedding-3-large", self.name())
                .with_capabilities(embed)
                .with_cost(ModelCost { input_cost_per_1k: 0.00013, output_cost_per_1k: 0.0 }),
            ModelDescriptor::new("whisper-1", self.name()).with_capabilities(audio_in),
            ModelDescriptor::new("tts-1", self.name()).with_capabilities(audio_out),
        ]
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let start = Instant::now();

        let url = self.build_url("models");
        let headers = self.build_headers();

        let response = self.client.get(&url).headers(headers).send().await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: HashMap::new(),
            }),
            Ok(resp) => {
                let mut details = HashMap::new();
                details.insert(
                    "status_code".to_string(),
                    resp.status().as_u16().to_string(),
                );

                Ok(ProviderHealth {
                    status: HealthStatus::Degraded,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
            Err(e) => {
                let mut details = HashMap::new();
                details.insert("error".to_string(), e.to_string());

                Ok(ProviderHealth {
                    status: HealthStatus::Unhealthy,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let config = ProviderConfig::new("openai", "");
        assert!(OpenAIProvider::new(config).is_err());
    }

    #[test]
    fn defaults_to_public_base_url() {
        let config = ProviderConfig::new("openai", "test-key");
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn maps_models_through_config() {
        let config =
            ProviderConfig::new("openai", "test-key").with_model_mapping("gpt-test-1", "gpt-4o");
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.map_model("gpt-test-1"), "gpt-4o");
        assert_eq!(provider.map_model("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn supported_models_nonempty() {
        let config = ProviderConfig::new("openai", "test-key");
        let provider = OpenAIProvider::new(config).unwrap();
        assert!(provider.supported_models().contains(&"gpt-4o".to_string()));
    }
}
