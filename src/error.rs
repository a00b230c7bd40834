//! Модуль обработки ошибок библиотеки tts-dub
//!
//! Ошибки разделены на два уровня: `SynthesisError` описывает сбой
//! синтеза одного чанка, `DubError` описывает ошибку, которая дошла до вызывающего кода.

use thiserror::Error;

/// Ошибки внешнего синтезатора речи для одного чанка
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthesisError {
    /// Временная недоступность сервиса (повторяемая)
    #[error("synthesis unavailable: {0}")]
    Unavailable(String),

    /// Превышен срок ожидания ответа (повторяемая)
    #[error("synthesis timed out")]
    Timeout,

    /// Голос не поддерживается (фатальная для чанка)
    #[error("unsupported voice: {0}")]
    UnsupportedVoice(String),

    /// Язык не поддерживается (фатальная для чанка)
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Сервис отклонил запрос или вернул непригодный ответ (фатальная для чанка)
    #[error("synthesis rejected: {0}")]
    Rejected(String),
}

impl SynthesisError {
    /// Можно ли повторить запрос после этой ошибки
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Ошибки библиотеки tts-dub
#[derive(Debug, Error)]
pub enum DubError {
    /// Транскрипт нарушает инварианты (перекрытие событий, нулевая длительность)
    #[error("malformed transcript at event {index}: {reason}")]
    MalformedTranscript { index: usize, reason: String },

    /// Синтез чанка не удался окончательно
    #[error("synthesis failed for event {event}: {source}")]
    Synthesis {
        event: usize,
        #[source]
        source: SynthesisError,
    },

    /// Дорожки не удалось выровнять для микширования
    #[error("mix alignment error: {0}")]
    MixAlignment(String),

    /// Ошибка обработки аудио
    #[error("audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка декодирования аудио
    #[error("audio decode error: {0}")]
    Decode(String),

    /// Ошибка конфигурации
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl DubError {
    /// Индекс события, к которому относится ошибка, если он известен
    pub fn event_index(&self) -> Option<usize> {
        match self {
            Self::MalformedTranscript { index, .. } => Some(*index),
            Self::Synthesis { event, .. } => Some(*event),
            _ => None,
        }
    }
}

impl From<&str> for DubError {
    fn from(s: &str) -> Self {
        DubError::Other(s.to_string())
    }
}

impl From<String> for DubError {
    fn from(s: String) -> Self {
        DubError::Other(s)
    }
}

/// Тип Result для библиотеки tts-dub
pub type Result<T> = std::result::Result<T, DubError>;
