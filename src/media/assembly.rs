//! Сборка дорожки речи
//!
//! Подогнанные клипы укладываются на временную шкалу в кадрах.
//! Границы считаются от абсолютного времени (`round(t * sample_rate)`),
//! поэтому соседние фрагменты стыкуются без зазоров и наложений,
//! а ошибка округления не накапливается.

use std::ops::Range;
use std::time::Duration;
use log::{debug, info};
use crate::config::OutputFormat;
use crate::error::{DubError, Result};
use crate::media::audio::{self, frames_at, AudioBuffer};
use crate::timing::fitter::{FitAction, FitPlan};
use crate::transcript::Transcript;

/// Длительность fade in/out на краях каждого клипа
const CLIP_FADE: Duration = Duration::from_millis(5);

/// Чанк с планом подгонки, готовый к укладке
#[derive(Debug, Clone)]
pub struct FittedChunk {
    pub plan: FitPlan,
    /// Синтезированный клип; `None` означает тишину в окне
    pub clip: Option<AudioBuffer>,
}

impl FittedChunk {
    pub fn speech(plan: FitPlan, clip: AudioBuffer) -> Self {
        Self { plan, clip: Some(clip) }
    }

    pub fn silence(allotted: Duration) -> Self {
        Self { plan: FitPlan::silence(allotted), clip: None }
    }

    pub fn allotted(&self) -> Duration {
        self.plan.allotted
    }
}

/// Содержимое участка дорожки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Пауза между событиями
    Gap,
    /// Речь чанка `chunk` события `event`
    Speech { event: usize, chunk: usize },
    /// Тишина внутри окна события
    Silence { event: usize, chunk: usize },
}

/// Участок дорожки в кадрах
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub frames: Range<usize>,
}

/// Собранная дорожка речи
#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub audio: AudioBuffer,
    /// Участки в порядке шкалы, без зазоров и наложений
    pub segments: Vec<Segment>,
    /// Окно каждого события в кадрах
    pub event_spans: Vec<Range<usize>>,
}

impl AssembledTrack {
    /// Участки покрывают дорожку целиком и не перекрываются
    pub fn is_contiguous(&self) -> bool {
        let mut cursor = 0;
        for segment in &self.segments {
            if segment.frames.start != cursor || segment.frames.end < segment.frames.start {
                return false;
            }
            cursor = segment.frames.end;
        }
        cursor == self.audio.frames()
    }

    /// Паузы между событиями
    pub fn gaps(&self) -> impl Iterator<Item = &Range<usize>> {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Gap)
            .map(|s| &s.frames)
    }
}

/// Сборщик дорожки
#[derive(Debug, Clone, Copy)]
pub struct TrackAssembler {
    format: OutputFormat,
}

impl TrackAssembler {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Собрать дорожку длиной `media_duration` из чанков каждого события.
    ///
    /// `events[i]` содержит упорядоченные чанки `i`-го события; сумма их окон
    /// должна точно совпадать с длительностью события.
    pub fn assemble(
        &self,
        transcript: &Transcript,
        events: &[Vec<FittedChunk>],
    ) -> Result<AssembledTrack> {
        if events.len() != transcript.len() {
            return Err(DubError::AudioProcessing(format!(
                "Expected chunks for {} events, got {}",
                transcript.len(),
                events.len()
            )));
        }

        let OutputFormat { sample_rate, channels } = self.format;
        let total_frames = frames_at(transcript.media_duration(), sample_rate);
        let mut audio = AudioBuffer::silence(total_frames, sample_rate, channels);
        let mut segments = Vec::new();
        let mut event_spans = Vec::with_capacity(events.len());
        let mut cursor = 0usize;

        for (index, (event, chunks)) in transcript.iter().zip(events).enumerate() {
            let allotted: Duration = chunks.iter().map(FittedChunk::allotted).sum();
            if allotted != event.duration {
                return Err(DubError::AudioProcessing(format!(
                    "Chunks of event {} cover {:.6}s instead of {:.6}s",
                    index,
                    allotted.as_secs_f64(),
                    event.duration.as_secs_f64()
                )));
            }

            let event_start = frames_at(event.start, sample_rate);
            if event_start > cursor {
                segments.push(Segment { kind: SegmentKind::Gap, frames: cursor..event_start });
            }

            let mut chunk_start_time = event.start;
            let mut chunk_start = event_start;
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                let chunk_end_time = chunk_start_time + chunk.allotted();
                let chunk_end = frames_at(chunk_end_time, sample_rate);
                let window = chunk_end - chunk_start;

                let kind = match self.render(chunk, window)? {
                    Some(rendered) => {
                        let offset = chunk_start * channels as usize;
                        audio.samples[offset..offset + rendered.samples.len()]
                            .copy_from_slice(&rendered.samples);
                        SegmentKind::Speech { event: index, chunk: chunk_index }
                    }
                    None => SegmentKind::Silence { event: index, chunk: chunk_index },
                };
                segments.push(Segment { kind, frames: chunk_start..chunk_end });

                chunk_start_time = chunk_end_time;
                chunk_start = chunk_end;
            }

            event_spans.push(event_start..chunk_start);
            cursor = chunk_start;
        }

        if total_frames > cursor {
            segments.push(Segment { kind: SegmentKind::Gap, frames: cursor..total_frames });
        }

        info!(
            "Assembled speech track: {} events, {} segments, {:.3}s",
            events.len(),
            segments.len(),
            audio.duration().as_secs_f64()
        );

        Ok(AssembledTrack { audio, segments, event_spans })
    }

    /// Привести клип к формату дорожки и подогнать к окну в `window` кадров
    fn render(&self, chunk: &FittedChunk, window: usize) -> Result<Option<AudioBuffer>> {
        let Some(clip) = &chunk.clip else {
            return Ok(None);
        };
        if window == 0 {
            return Ok(None);
        }

        let OutputFormat { sample_rate, channels } = self.format;
        let clip = audio::convert(clip, sample_rate, channels)?;

        let speech_frames = match chunk.plan.action {
            FitAction::NoChange | FitAction::SpeedScale(_) => window,
            FitAction::PadSilence { .. } => {
                frames_at(chunk.plan.speech_duration(), sample_rate).min(window)
            }
            FitAction::Truncate { speed, .. } => {
                (clip.frames() as f64 / speed).round() as usize
            }
        };

        debug!(
            "Rendering {} frames into {} of {} window frames (x{:.3})",
            clip.frames(),
            speech_frames,
            window,
            chunk.plan.speed()
        );

        let mut rendered = audio::stretch_to_frames(&clip, speech_frames)?;
        rendered.set_frames(speech_frames.min(window));
        audio::apply_fade(&mut rendered, CLIP_FADE);
        rendered.set_frames(window);
        Ok(Some(rendered))
    }
}
