//! Модуль для работы с TTS
//!
//! Контракт внешнего синтезатора речи и его обертки: повторы,
//! кэширование, подготовка текста и адаптер OpenAI.

pub mod cache;
pub mod openai;
pub mod retry;
pub mod text;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::error::SynthesisError;
use crate::media::audio::AudioBuffer;

/// Результат синтеза одного чанка
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub clip: AudioBuffer,
    /// Естественная длительность клипа до подгонки
    pub natural_duration: Duration,
}

impl SynthesisResult {
    /// Длительность берется из самого клипа
    pub fn new(clip: AudioBuffer) -> Self {
        let natural_duration = clip.duration();
        Self { clip, natural_duration }
    }
}

/// Внешний синтезатор речи
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice: &str,
    ) -> Result<SynthesisResult, SynthesisError>;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice: &str,
    ) -> Result<SynthesisResult, SynthesisError> {
        (**self).synthesize(text, language, voice).await
    }
}

pub use cache::CachingSynthesizer;
pub use openai::OpenAiSynthesizer;
pub use retry::{synthesize_with_retry, RetryDecision, RetryMachine, RetryState};
pub use text::prepare_text_for_tts;
