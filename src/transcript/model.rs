//! Модель транскрипта: что и когда произносится
//!
//! Транскрипт принимается на вход готовым и больше не изменяется.
//! Все производные данные (чанки, планы подгонки, дорожка) создаются отдельно.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{DubError, Result};

/// Одно событие транскрипта с фиксированным окном времени
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Смещение от начала медиа
    pub start: Duration,
    /// Длительность исходного окна
    pub duration: Duration,
    /// Фрагменты текста, составляющие реплику
    pub chunks: Vec<String>,
    /// Язык синтеза (если не задан, берется из транскрипта)
    pub language: Option<String>,
    /// Голос синтеза (если не задан, берется из транскрипта)
    pub voice: Option<String>,
}

impl Event {
    /// Создать событие с одним фрагментом текста
    pub fn new(start: Duration, duration: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            chunks: vec![text.into()],
            language: None,
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Конец окна события
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    /// Полный текст события
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Упорядоченная последовательность событий и общие параметры
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    events: Vec<Event>,
    language: String,
    voice: String,
    media_duration: Duration,
}

impl Transcript {
    /// Создать транскрипт и проверить инварианты.
    ///
    /// Если `media_duration` не задана, используется конец последнего события.
    pub fn new(
        events: Vec<Event>,
        language: impl Into<String>,
        voice: impl Into<String>,
        media_duration: Option<Duration>,
    ) -> Result<Self> {
        validate_events(&events)?;

        let last_end = events.last().map(Event::end).unwrap_or_default();
        let media_duration = match media_duration {
            Some(total) if total < last_end => {
                return Err(DubError::MalformedTranscript {
                    index: events.len() - 1,
                    reason: format!(
                        "event ends at {:.3}s beyond media duration {:.3}s",
                        last_end.as_secs_f64(),
                        total.as_secs_f64()
                    ),
                });
            }
            Some(total) => total,
            None => last_end,
        };

        Ok(Self {
            events,
            language: language.into(),
            voice: voice.into(),
            media_duration,
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// События в порядке временной шкалы
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Язык по умолчанию
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Голос по умолчанию
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Полная длительность медиа, `[0, media_duration)`
    pub fn media_duration(&self) -> Duration {
        self.media_duration
    }

    /// Язык события с учетом значения по умолчанию
    pub fn language_for(&self, event: &Event) -> String {
        event.language.clone().unwrap_or_else(|| self.language.clone())
    }

    /// Голос события с учетом значения по умолчанию
    pub fn voice_for(&self, event: &Event) -> String {
        event.voice.clone().unwrap_or_else(|| self.voice.clone())
    }

    /// Суммарная длительность всех событий
    pub fn speech_duration(&self) -> Duration {
        self.events.iter().map(|e| e.duration).sum()
    }

    /// Паузы перед каждым событием и после последнего
    pub fn gaps(&self) -> Vec<Duration> {
        let mut cursor = Duration::ZERO;
        let mut gaps = Vec::with_capacity(self.events.len() + 1);
        for event in &self.events {
            gaps.push(event.start - cursor);
            cursor = event.end();
        }
        gaps.push(self.media_duration - cursor);
        gaps
    }

    /// События покрывают медиа без пауз
    pub fn is_contiguous(&self) -> bool {
        self.gaps().iter().all(|gap| gap.is_zero())
    }
}

/// Проверка: длительности положительны, события не перекрываются
fn validate_events(events: &[Event]) -> Result<()> {
    let mut previous_end = Duration::ZERO;
    for (index, event) in events.iter().enumerate() {
        if event.duration.is_zero() {
            return Err(DubError::MalformedTranscript {
                index,
                reason: "event duration must be positive".to_string(),
            });
        }
        if event.start < previous_end {
            return Err(DubError::MalformedTranscript {
                index,
                reason: format!(
                    "event starts at {:.3}s before previous event ends at {:.3}s",
                    event.start.as_secs_f64(),
                    previous_end.as_secs_f64()
                ),
            });
        }
        previous_end = event.end();
    }
    Ok(())
}
