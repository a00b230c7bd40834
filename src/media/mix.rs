//! Микширование оригинальной дорожки с синтезированной речью

use std::time::Duration;
use log::{info, warn};
use rayon::prelude::*;
use crate::config::{BetweenEvents, MixSpec};
use crate::error::{DubError, Result};
use crate::media::assembly::AssembledTrack;
use crate::media::audio::{self, frames_at, AudioBuffer};

/// Пиковый уровень после нормализации перегруженного микса
const MIX_HEADROOM_PEAK: f32 = 0.95;

/// Микшер двух дорожек
#[derive(Debug, Clone, Copy)]
pub struct Mixer {
    spec: MixSpec,
    between_events: BetweenEvents,
    tolerance: Duration,
}

impl Mixer {
    pub fn new(spec: MixSpec, between_events: BetweenEvents, tolerance: Duration) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec, between_events, tolerance })
    }

    /// Смешать оригинал с дорожкой речи.
    ///
    /// Оригинал приводится к формату речи. Если длины расходятся больше,
    /// чем на допуск, возвращается `MixAlignment`; меньшая разница
    /// выравнивается обрезкой или тишиной.
    pub fn mix(&self, original: &AudioBuffer, speech: &AssembledTrack) -> Result<AudioBuffer> {
        let target = &speech.audio;
        let mut original = audio::convert(original, target.sample_rate, target.channels)?;

        let tolerance = frames_at(self.tolerance, target.sample_rate);
        let diff = original.frames().abs_diff(target.frames());
        if diff > tolerance {
            return Err(DubError::MixAlignment(format!(
                "original track is {:.3}s, speech track is {:.3}s",
                original.duration().as_secs_f64(),
                target.duration().as_secs_f64()
            )));
        }
        if diff > 0 {
            warn!("Aligning original track to speech track: {} frames difference", diff);
            original.set_frames(target.frames());
        }

        let (original_gain, speech_gain) = self.spec.gains();
        info!(
            "Mixing: original gain={:.3}, speech gain={:.3}, between events={:?}",
            original_gain, speech_gain, self.between_events
        );

        // Единичный вес возвращает дорожку без изменений
        if speech_gain == 0.0 {
            return Ok(original);
        }
        if original_gain == 0.0 && self.between_events == BetweenEvents::Fill {
            return Ok(target.clone());
        }

        let mut mixed: Vec<f32> = original
            .samples
            .par_iter()
            .zip(target.samples.par_iter())
            .map(|(&o, &s)| o * original_gain + s * speech_gain)
            .collect();

        if self.between_events == BetweenEvents::Blank {
            let channels = target.channels as usize;
            for gap in speech.gaps() {
                let range = gap.start * channels..gap.end * channels;
                mixed[range.clone()].copy_from_slice(&original.samples[range]);
            }
        }

        let max_amplitude = mixed.par_iter().map(|s| s.abs()).reduce(|| 0.0f32, f32::max);
        if max_amplitude > 1.0 {
            audio::normalize_peak(&mut mixed, MIX_HEADROOM_PEAK);
        }

        Ok(AudioBuffer::new(mixed, target.sample_rate, target.channels))
    }
}
