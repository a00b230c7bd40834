//! Синтезатор со сценарием для тестов

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use crate::error::SynthesisError;
use crate::media::audio::{frames_at, AudioBuffer};
use crate::tts::{SynthesisResult, Synthesizer};

/// Амплитуда синтезированного "голоса"
pub const SPEECH_LEVEL: f32 = 0.5;

/// Синтезатор, отвечающий по заранее заданному сценарию.
///
/// Длительность клипа задается явно для текста или считается по числу
/// символов. Клип представляет собой постоянный сигнал `SPEECH_LEVEL`.
pub struct ScriptedSynthesizer {
    sample_rate: u32,
    per_char: Duration,
    durations: HashMap<String, Duration>,
    failures: HashMap<String, (u32, SynthesisError)>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            sample_rate: 8_000,
            per_char: Duration::from_millis(50),
            durations: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Длительность речи на один символ для текстов без явной длительности
    pub fn with_per_char(mut self, per_char: Duration) -> Self {
        self.per_char = per_char;
        self
    }

    pub fn with_duration(mut self, text: &str, duration: Duration) -> Self {
        self.durations.insert(text.to_string(), duration);
        self
    }

    /// Всегда отвечать ошибкой на этот текст
    pub fn failing(self, text: &str, error: SynthesisError) -> Self {
        self.failing_times(text, u32::MAX, error)
    }

    /// Отвечать ошибкой первые `times` раз
    pub fn failing_times(mut self, text: &str, times: u32, error: SynthesisError) -> Self {
        self.failures.insert(text.to_string(), (times, error));
        self
    }

    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn calls(&self, text: &str) -> u32 {
        self.calls.lock().get(text).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Тексты, которые запрашивались хотя бы раз
    pub fn requested(&self) -> Vec<String> {
        let mut texts: Vec<String> = self.calls.lock().keys().cloned().collect();
        texts.sort();
        texts
    }

    /// Наибольшее число одновременных вызовов
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn natural_duration(&self, text: &str) -> Duration {
        self.durations
            .get(text)
            .copied()
            .unwrap_or_else(|| self.per_char * text.chars().count() as u32)
    }
}

impl Default for ScriptedSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _language: &str,
        _voice: &str,
    ) -> Result<SynthesisResult, SynthesisError> {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(text.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        // Дать другим задачам стартовать, чтобы параллелизм был наблюдаем
        let delay = self.delays.get(text).copied().unwrap_or(Duration::from_millis(2));
        tokio::time::sleep(delay).await;

        if let Some((times, error)) = self.failures.get(text) {
            if call <= *times {
                return Err(error.clone());
            }
        }

        let frames = frames_at(self.natural_duration(text), self.sample_rate);
        let clip = AudioBuffer::new(vec![SPEECH_LEVEL; frames], self.sample_rate, 1);
        Ok(SynthesisResult::new(clip))
    }
}
