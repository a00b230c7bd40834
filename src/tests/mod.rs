//! Сквозные тесты конвейера на сценарном синтезаторе

mod test_pipeline;
mod test_scenarios;

use std::sync::Arc;
use std::time::Duration;
use crate::config::{CacheConfig, DubbingConfig, OutputFormat, RetryPolicy};
use crate::media::assembly::{AssembledTrack, SegmentKind};
use crate::pipeline::Dubber;
use crate::transcript::{Event, Transcript};
use crate::tts::mock::ScriptedSynthesizer;
use crate::tts::Synthesizer;

pub const RATE: u32 = 8_000;

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

/// 8 кГц моно, быстрые повторы, без кэша
pub fn test_config() -> DubbingConfig {
    DubbingConfig {
        retry: RetryPolicy { max_attempts: 3, base_delay_ms: 1, timeout_ms: 2_000 },
        output: OutputFormat { sample_rate: RATE, channels: 1 },
        cache: CacheConfig { enabled: false, ..CacheConfig::default() },
        ..DubbingConfig::default()
    }
}

pub fn dubber(config: DubbingConfig, synth: &Arc<ScriptedSynthesizer>) -> Dubber {
    let synthesizer: Arc<dyn Synthesizer> = synth.clone();
    Dubber::new(config, synthesizer).unwrap()
}

pub fn transcript(events: Vec<Event>, media: Duration) -> Transcript {
    Transcript::new(events, "en-US", "alloy", Some(media)).unwrap()
}

pub fn kinds(track: &AssembledTrack) -> Vec<(SegmentKind, std::ops::Range<usize>)> {
    track.segments.iter().map(|s| (s.kind, s.frames.clone())).collect()
}

/// Среднее значение семплов в диапазоне кадров (моно)
pub fn mean(track: &AssembledTrack, frames: std::ops::Range<usize>) -> f32 {
    let slice = &track.audio.samples[frames];
    slice.iter().sum::<f32>() / slice.len() as f32
}
