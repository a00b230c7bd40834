//! Модуль для интеграции с OpenAI API
//!
//! Адаптер `Synthesizer` поверх `POST /audio/speech`. Ответ приходит в MP3
//! и декодируется через symphonia.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use crate::error::{DubError, Result, SynthesisError};
use crate::media::decode::decode_audio_bytes;
use crate::tts::{SynthesisResult, Synthesizer};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "tts-1";

/// Голоса, которые принимает API
pub const VOICES: &[&str] =
    &["alloy", "ash", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer"];

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
    speed: f64,
}

/// Синтезатор на базе OpenAI TTS
pub struct OpenAiSynthesizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    speed: f64,
}

impl OpenAiSynthesizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            speed: 1.0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Базовая скорость речи (0.25..=4.0)
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.clamp(0.25, 4.0);
        self
    }

    /// Другой адрес API (прокси, совместимый сервис)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Проверить ключ запросом списка моделей
    pub async fn validate_api_key(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            log::error!("OpenAI API key is empty");
            return Err(DubError::Configuration("OpenAI API key is required".to_string()));
        }

        log::debug!("Making test request to OpenAI API to validate key...");
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
            log::error!("OpenAI API key validation failed (status {}): {}", status, error_text);
            return Err(DubError::Configuration(format!(
                "Invalid OpenAI API key: {} (status {})",
                error_text, status
            )));
        }

        log::info!("OpenAI API key validated successfully");
        Ok(())
    }
}

/// Сопоставить неуспешный ответ API с ошибкой синтеза
fn classify_error(status: StatusCode, body: &str, voice: &str, language: &str) -> SynthesisError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return SynthesisError::Unavailable(format!("status {}: {}", status, body));
    }

    let lower = body.to_lowercase();
    if lower.contains("voice") {
        SynthesisError::UnsupportedVoice(voice.to_string())
    } else if lower.contains("language") {
        SynthesisError::UnsupportedLanguage(language.to_string())
    } else {
        SynthesisError::Rejected(format!("status {}: {}", status, body))
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice: &str,
    ) -> std::result::Result<SynthesisResult, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::Rejected("empty input text".to_string()));
        }
        if !VOICES.contains(&voice) {
            return Err(SynthesisError::UnsupportedVoice(voice.to_string()));
        }

        let request = SpeechRequest {
            model: &self.model,
            voice,
            input: text,
            response_format: "mp3",
            speed: self.speed,
        };

        log::debug!(
            "Requesting speech for {} chars (voice {}, language {})",
            text.chars().count(),
            voice,
            language
        );
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("OpenAI API error (status {}): {}", status, body);
            return Err(classify_error(status, &body, voice, language));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        let clip = decode_audio_bytes(&bytes, Some("mp3"))
            .map_err(|e| SynthesisError::Rejected(format!("undecodable response: {}", e)))?;

        Ok(SynthesisResult::new(clip))
    }
}
