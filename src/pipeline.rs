//! Конвейер дубляжа
//!
//! `Dubber` проводит транскрипт через все этапы:
//! `Ingesting -> Synthesizing -> Assembling -> Mixing -> Done`.
//!
//! Синтез идет проходами. В каждом проходе все ожидающие чанки
//! запрашиваются параллельно (не больше `max_concurrent_requests`
//! одновременно), а результаты записываются в заранее выделенные ячейки
//! по индексу. Чанки, которые не помещаются в окно, делятся и попадают
//! в следующий проход. Глубина деления ограничена, поэтому проходов
//! не больше `max_depth + 1`.

use std::collections::BTreeSet;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use crate::config::{DubbingConfig, FailurePolicy};
use crate::error::{DubError, Result, SynthesisError};
use crate::media::assembly::{AssembledTrack, FittedChunk, TrackAssembler};
use crate::media::audio::AudioBuffer;
use crate::media::mix::Mixer;
use crate::progress::{PipelineState, ProgressTracker};
use crate::timing::{Chunk, Chunker, DurationFitter, FitOutcome};
use crate::transcript::Transcript;
use crate::tts::cache::with_cache;
use crate::tts::{prepare_text_for_tts, synthesize_with_retry, SynthesisResult, Synthesizer};

/// Итоги запуска конвейера
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DubReport {
    /// События, у которых хотя бы один чанк заменен тишиной
    pub degraded_events: Vec<usize>,
    /// Чанки, подогнанные с потерями после исчерпания деления
    pub forced_chunks: usize,
    /// Итоговое количество чанков
    pub chunk_count: usize,
    /// Сколько раз чанк делился пополам
    pub split_count: usize,
}

impl DubReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_events.is_empty()
    }
}

/// Ячейка чанка в списке события
enum Slot {
    Pending(Chunk),
    Ready(FittedChunk),
}

/// Запрос одного прохода синтеза
struct Request {
    event: usize,
    position: usize,
    chunk: Chunk,
}

type SynthesisOutcome = std::result::Result<SynthesisResult, SynthesisError>;

/// Оркестратор дубляжа
pub struct Dubber {
    config: DubbingConfig,
    synthesizer: Arc<dyn Synthesizer>,
    fitter: DurationFitter,
    chunker: Chunker,
}

impl Dubber {
    /// Создать оркестратор; если в настройках включен кэш, синтезатор
    /// оборачивается в `CachingSynthesizer`.
    pub fn new(config: DubbingConfig, synthesizer: Arc<dyn Synthesizer>) -> Result<Self> {
        config.validate()?;
        let synthesizer = with_cache(synthesizer, &config.cache)?;
        Ok(Self {
            fitter: DurationFitter::new(config.fit),
            chunker: Chunker::new(config.chunking),
            config,
            synthesizer,
        })
    }

    pub fn config(&self) -> &DubbingConfig {
        &self.config
    }

    /// Озвучить транскрипт и смешать речь с оригинальной дорожкой
    pub async fn run(
        &self,
        transcript: &Transcript,
        original: &AudioBuffer,
    ) -> Result<(AudioBuffer, DubReport)> {
        self.run_with_progress(transcript, original, None).await
    }

    /// То же, что `run`, с отслеживанием прогресса
    pub async fn run_with_progress(
        &self,
        transcript: &Transcript,
        original: &AudioBuffer,
        tracker: Option<&ProgressTracker>,
    ) -> Result<(AudioBuffer, DubReport)> {
        let local = ProgressTracker::new();
        let tracker = tracker.unwrap_or(&local);

        let result = match self.build_track(transcript, tracker).await {
            Ok((track, report)) => self.mix(original, &track, tracker).map(|mixed| (mixed, report)),
            Err(e) => Err(e),
        };
        finish(tracker, result)
    }

    /// Собрать только дорожку речи, без микширования
    pub async fn synthesize_track(
        &self,
        transcript: &Transcript,
        tracker: Option<&ProgressTracker>,
    ) -> Result<(AssembledTrack, DubReport)> {
        let local = ProgressTracker::new();
        let tracker = tracker.unwrap_or(&local);

        let result = self.build_track(transcript, tracker).await;
        finish(tracker, result)
    }

    async fn build_track(
        &self,
        transcript: &Transcript,
        tracker: &ProgressTracker,
    ) -> Result<(AssembledTrack, DubReport)> {
        tracker.set_state(PipelineState::Ingesting);
        info!(
            "Dubbing {} events over {:.3}s (language {}, voice {})",
            transcript.len(),
            transcript.media_duration().as_secs_f64(),
            transcript.language(),
            transcript.voice()
        );
        let mut events = self.ingest(transcript);
        tracker.update_step_progress(100.0, Some(format!("Prepared {} events", transcript.len())));

        tracker.set_state(PipelineState::Synthesizing);
        let mut report = DubReport::default();
        self.synthesize_all(transcript, &mut events, &mut report, tracker).await?;

        tracker.set_state(PipelineState::Assembling);
        let fitted: Vec<Vec<FittedChunk>> = events
            .into_iter()
            .map(|slots| {
                slots
                    .into_iter()
                    .filter_map(|slot| match slot {
                        Slot::Ready(chunk) => Some(chunk),
                        Slot::Pending(_) => None,
                    })
                    .collect()
            })
            .collect();
        report.chunk_count = fitted.iter().map(Vec::len).sum();
        let track = TrackAssembler::new(self.config.output).assemble(transcript, &fitted)?;

        if report.is_degraded() {
            warn!("Dubbing finished with degraded events: {:?}", report.degraded_events);
        }
        info!(
            "Speech track ready: {} chunks, {} splits, {} forced",
            report.chunk_count, report.split_count, report.forced_chunks
        );
        Ok((track, report))
    }

    fn mix(
        &self,
        original: &AudioBuffer,
        track: &AssembledTrack,
        tracker: &ProgressTracker,
    ) -> Result<AudioBuffer> {
        tracker.set_state(PipelineState::Mixing);
        let mixer = Mixer::new(
            self.config.mix,
            self.config.between_events,
            self.config.mix_tolerance(),
        )?;
        mixer.mix(original, track)
    }

    /// Начальные чанки каждого события
    fn ingest(&self, transcript: &Transcript) -> Vec<Vec<Slot>> {
        transcript
            .iter()
            .map(|event| {
                let text = prepare_text_for_tts(&event.text());
                self.chunker
                    .prepare(&text, event.duration)
                    .into_iter()
                    .map(Slot::Pending)
                    .collect()
            })
            .collect()
    }

    /// Проходы синтеза, пока не останется ожидающих чанков
    async fn synthesize_all(
        &self,
        transcript: &Transcript,
        events: &mut [Vec<Slot>],
        report: &mut DubReport,
        tracker: &ProgressTracker,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut degraded = BTreeSet::new();
        let mut pass = 0;

        loop {
            let requests = self.collect_requests(events);
            if requests.is_empty() {
                break;
            }
            pass += 1;
            debug!("Synthesis pass {}: {} chunks", pass, requests.len());

            let results = self.synthesize_pass(transcript, &requests, &semaphore).await?;

            // Деления применяются с конца списка, чтобы позиции не сдвигались
            let mut splits: Vec<(usize, usize, [Chunk; 2])> = Vec::new();
            for (request, outcome) in requests.into_iter().zip(results) {
                let Request { event, position, chunk } = request;

                let result = match outcome {
                    Ok(result) => result,
                    Err(source) => {
                        warn!(
                            "Event {} degraded: replacing {:.3}s chunk with silence ({})",
                            event,
                            chunk.allotted.as_secs_f64(),
                            source
                        );
                        degraded.insert(event);
                        events[event][position] = Slot::Ready(FittedChunk::silence(chunk.allotted));
                        continue;
                    }
                };

                let plan = match self.fitter.fit(chunk.allotted, result.natural_duration) {
                    FitOutcome::Fit(plan) => plan,
                    FitOutcome::NeedsSplit { scale } => match self.chunker.split(&chunk) {
                        Some(parts) => {
                            report.split_count += 1;
                            splits.push((event, position, parts));
                            continue;
                        }
                        None => {
                            warn!(
                                "Event {}: chunk needs x{:.2} but cannot be split further \
                                 (depth {}), forcing fit",
                                event, scale, chunk.depth
                            );
                            report.forced_chunks += 1;
                            self.fitter.force_fit(chunk.allotted, result.natural_duration)
                        }
                    },
                };
                events[event][position] = Slot::Ready(FittedChunk::speech(plan, result.clip));
            }

            for (event, position, [left, right]) in splits.into_iter().rev() {
                let slots = &mut events[event];
                slots[position] = Slot::Pending(left);
                slots.insert(position + 1, Slot::Pending(right));
            }

            let (ready, total) = count_ready(events);
            tracker.update_step_progress(
                ready as f32 / total.max(1) as f32 * 100.0,
                Some(format!("Synthesized {}/{} chunks", ready, total)),
            );
        }

        report.degraded_events = degraded.into_iter().collect();
        Ok(())
    }

    /// Один проход: все запросы параллельно, результат `i` относится к запросу `i`.
    ///
    /// При `FailFast` первая ошибка возвращается сразу, а остальные задачи
    /// прерываются.
    async fn synthesize_pass(
        &self,
        transcript: &Transcript,
        requests: &[Request],
        semaphore: &Arc<Semaphore>,
    ) -> Result<Vec<SynthesisOutcome>> {
        let mut tasks = JoinSet::new();
        for (index, request) in requests.iter().enumerate() {
            let event = &transcript.events()[request.event];
            let synthesizer = Arc::clone(&self.synthesizer);
            let semaphore = Arc::clone(semaphore);
            let text = request.chunk.text.clone();
            let language = transcript.language_for(event);
            let voice = transcript.voice_for(event);
            let policy = self.config.retry;
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, Err(SynthesisError::Unavailable(e.to_string()))),
                };
                let outcome =
                    synthesize_with_retry(synthesizer.as_ref(), &text, &language, &voice, &policy)
                        .await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<SynthesisOutcome>> = requests.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) =
                joined.map_err(|e| DubError::Other(format!("Synthesis task failed: {}", e)))?;
            if let Err(source) = &outcome {
                if self.config.failure_policy == FailurePolicy::FailFast {
                    let event = requests[index].event;
                    debug!("Event {} failed, aborting {} pending syntheses", event, tasks.len());
                    tasks.abort_all();
                    return Err(DubError::Synthesis { event, source: source.clone() });
                }
            }
            results[index] = Some(outcome);
        }

        // Все задачи завершились, поэтому каждая ячейка заполнена
        Ok(results.into_iter().flatten().collect())
    }

    /// Ожидающие чанки; пустые тексты сразу становятся тишиной
    fn collect_requests(&self, events: &mut [Vec<Slot>]) -> Vec<Request> {
        let mut requests = Vec::new();
        for (event, slots) in events.iter_mut().enumerate() {
            for (position, slot) in slots.iter_mut().enumerate() {
                let Slot::Pending(chunk) = slot else { continue };
                if chunk.text.trim().is_empty() {
                    debug!("Event {}: empty chunk becomes silence", event);
                    *slot = Slot::Ready(FittedChunk::silence(chunk.allotted));
                    continue;
                }
                requests.push(Request { event, position, chunk: chunk.clone() });
            }
        }
        requests
    }
}

/// Перевести трекер в конечное состояние по результату
fn finish<T>(tracker: &ProgressTracker, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => tracker.complete(),
        Err(e) => tracker.fail(e.to_string()),
    }
    result
}

fn count_ready(events: &[Vec<Slot>]) -> (usize, usize) {
    let total = events.iter().map(Vec::len).sum();
    let ready = events
        .iter()
        .flatten()
        .filter(|slot| matches!(slot, Slot::Ready(_)))
        .count();
    (ready, total)
}
