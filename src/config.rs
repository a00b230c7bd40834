//! Модуль конфигурации библиотеки tts-dub
//!
//! Этот модуль содержит структуры и перечисления для настройки подгонки,
//! разбиения, повторов синтеза и микширования.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{DubError, Result};

/// Границы подгонки длительности синтезированной речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FitConfig {
    /// Минимальный коэффициент скорости (замедление)
    pub min_speed: f64,
    /// Максимальный коэффициент скорости (ускорение)
    pub max_speed: f64,
    /// Допустимая доля тишины в окне (0.0 - 1.0)
    pub max_pad_fraction: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            min_speed: 0.85,
            max_speed: 1.5,
            max_pad_fraction: 0.2,
        }
    }
}

/// Настройки разбиения текста события на чанки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Максимальная глубина разбиения
    pub max_depth: u8,
    /// Максимальная длина текста одного запроса, символов
    pub max_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_chars: 1000,
        }
    }
}

/// Политика повторов запроса к синтезатору
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Общее число попыток, включая первую
    pub max_attempts: u32,
    /// Базовая задержка перед повтором, мс (удваивается с каждой попыткой)
    pub base_delay_ms: u64,
    /// Срок ожидания одного вызова, мс
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Срок ожидания одного вызова
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Задержка перед повтором номер `retry` (начиная с 1)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exp))
    }
}

/// Что делать, если чанк не удалось синтезировать
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Прервать обработку всего транскрипта
    FailFast,
    /// Заменить чанк тишиной и отметить событие как деградированное
    #[default]
    BestEffort,
}

/// Относительные веса дорожек при микшировании
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixSpec {
    /// Вес оригинальной дорожки
    pub original_weight: f32,
    /// Вес синтезированной речи
    pub speech_weight: f32,
}

impl Default for MixSpec {
    fn default() -> Self {
        Self {
            original_weight: 0.2,
            speech_weight: 1.0,
        }
    }
}

impl MixSpec {
    /// Создать и проверить пару весов
    pub fn new(original_weight: f32, speech_weight: f32) -> Result<Self> {
        let spec = Self { original_weight, speech_weight };
        spec.validate()?;
        Ok(spec)
    }

    /// Оба веса неотрицательны и хотя бы один строго положителен
    pub fn validate(&self) -> Result<()> {
        let finite = self.original_weight.is_finite() && self.speech_weight.is_finite();
        if !finite || self.original_weight < 0.0 || self.speech_weight < 0.0 {
            return Err(DubError::Configuration(format!(
                "mix weights must be finite and non-negative: {:?}",
                self
            )));
        }
        if self.original_weight == 0.0 && self.speech_weight == 0.0 {
            return Err(DubError::Configuration(
                "at least one mix weight must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Нормированные коэффициенты (сумма равна 1)
    pub fn gains(&self) -> (f32, f32) {
        let total = self.original_weight + self.speech_weight;
        (self.original_weight / total, self.speech_weight / total)
    }
}

/// Обработка оригинального звука между событиями
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BetweenEvents {
    /// Микшировать дорожки на всём протяжении
    #[default]
    Fill,
    /// Между событиями оставлять оригинальный звук без изменений
    Blank,
}

/// Формат собранной дорожки речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputFormat {
    /// Частота дискретизации, Гц
    pub sample_rate: u32,
    /// Количество каналов
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

/// Настройки кэша синтеза
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Использовать кэширование
    pub enabled: bool,
    /// Директория для кэша на диске (только память, если не задана)
    pub dir: Option<String>,
    /// Максимальный размер кэша в байтах (отдельно для памяти и для диска)
    pub max_size_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_size_bytes: Some(512 * 1024 * 1024), // 512 MB
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DubbingConfig {
    /// Границы подгонки длительности
    pub fit: FitConfig,
    /// Разбиение на чанки
    pub chunking: ChunkerConfig,
    /// Повторы синтеза
    pub retry: RetryPolicy,
    /// Политика обработки отказов
    pub failure_policy: FailurePolicy,
    /// Максимальное количество одновременных запросов к синтезатору
    pub max_concurrent_requests: usize,
    /// Веса микширования
    pub mix: MixSpec,
    /// Режим между событиями
    pub between_events: BetweenEvents,
    /// Допустимое расхождение длины оригинала и дорожки речи, мс
    pub mix_tolerance_ms: u64,
    /// Формат дорожки речи
    pub output: OutputFormat,
    /// Кэш синтеза
    pub cache: CacheConfig,
}

impl Default for DubbingConfig {
    fn default() -> Self {
        Self {
            fit: FitConfig::default(),
            chunking: ChunkerConfig::default(),
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
            max_concurrent_requests: 5,
            mix: MixSpec::default(),
            between_events: BetweenEvents::default(),
            mix_tolerance_ms: 250,
            output: OutputFormat::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl DubbingConfig {
    pub fn mix_tolerance(&self) -> Duration {
        Duration::from_millis(self.mix_tolerance_ms)
    }

    /// Прочитать конфигурацию из JSON строки
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Прочитать конфигурацию из JSON файла
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        let fit = &self.fit;
        if !(fit.min_speed > 0.0 && fit.min_speed <= 1.0) {
            return Err(DubError::Configuration(format!(
                "min_speed must be in (0, 1], got {}",
                fit.min_speed
            )));
        }
        if !(fit.max_speed >= 1.0 && fit.max_speed.is_finite()) {
            return Err(DubError::Configuration(format!(
                "max_speed must be >= 1, got {}",
                fit.max_speed
            )));
        }
        if !(0.0..=1.0).contains(&fit.max_pad_fraction) {
            return Err(DubError::Configuration(format!(
                "max_pad_fraction must be in [0, 1], got {}",
                fit.max_pad_fraction
            )));
        }
        if self.chunking.max_chars == 0 {
            return Err(DubError::Configuration("chunking.max_chars must be >= 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(DubError::Configuration("retry.max_attempts must be >= 1".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(DubError::Configuration(
                "max_concurrent_requests must be >= 1".to_string(),
            ));
        }
        if self.output.sample_rate == 0 || self.output.channels == 0 {
            return Err(DubError::Configuration(format!(
                "invalid output format: {:?}",
                self.output
            )));
        }
        self.mix.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DubbingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.max_depth, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.failure_policy, FailurePolicy::BestEffort);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = DubbingConfig::from_json_str(
            r#"{ "fit": { "max_speed": 1.3 }, "failure_policy": "FailFast" }"#,
        )
        .unwrap();
        assert_eq!(config.fit.max_speed, 1.3);
        assert_eq!(config.fit.min_speed, 0.85);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.max_concurrent_requests, 5);
    }

    #[test]
    fn test_invalid_mix_weights() {
        assert!(MixSpec::new(0.0, 0.0).is_err());
        assert!(MixSpec::new(-1.0, 1.0).is_err());
        assert!(MixSpec::new(0.0, 1.0).is_ok());
    }

    #[test]
    fn test_gains_are_normalized() {
        let (original, speech) = MixSpec::new(2.0, 10.0).unwrap().gains();
        assert!((original + speech - 1.0).abs() < 1e-6);
        assert_eq!(MixSpec::new(1.0, 0.0).unwrap().gains(), (1.0, 0.0));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy { max_attempts: 3, base_delay_ms: 100, timeout_ms: 1000 };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_rejects_inverted_speed_bounds() {
        let mut config = DubbingConfig::default();
        config.fit.max_speed = 0.9;
        assert!(matches!(config.validate(), Err(DubError::Configuration(_))));
    }
}
