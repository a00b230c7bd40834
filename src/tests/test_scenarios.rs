//! Сценарии подгонки одной реплики и отказа синтеза

use std::sync::Arc;
use super::*;
use crate::config::FailurePolicy;
use crate::error::{DubError, SynthesisError};
use crate::media::assembly::SegmentKind;
use crate::notification::MemoryProgressObserver;
use crate::progress::{PipelineState, ProgressTracker};

fn hello(window: Duration) -> Transcript {
    transcript(vec![Event::new(Duration::ZERO, window, "Hello world")], window)
}

#[tokio::test]
async fn test_longer_speech_is_sped_up() {
    // 6s речи в окне 5s -> x1.2 без деления
    let synth = Arc::new(ScriptedSynthesizer::new().with_duration("Hello world", secs(6.0)));
    let (track, report) = dubber(test_config(), &synth)
        .synthesize_track(&hello(secs(5.0)), None)
        .await
        .unwrap();

    assert_eq!(track.audio.frames(), 40_000);
    assert_eq!(kinds(&track), vec![(SegmentKind::Speech { event: 0, chunk: 0 }, 0..40_000)]);
    assert_eq!(report.split_count, 0);
    assert_eq!(report.chunk_count, 1);
    assert_eq!(synth.total_calls(), 1);
    assert!((mean(&track, 10_000..30_000) - 0.5).abs() < 0.05);
}

#[tokio::test]
async fn test_too_long_speech_is_split_in_two() {
    // 9s в окне 5s требует x1.8: делим на "Hello" и "world" по 2.5s
    let synth = Arc::new(
        ScriptedSynthesizer::new()
            .with_duration("Hello world", secs(9.0))
            .with_duration("Hello", secs(3.0))
            .with_duration("world", secs(2.8)),
    );
    let (track, report) = dubber(test_config(), &synth)
        .synthesize_track(&hello(secs(5.0)), None)
        .await
        .unwrap();

    assert_eq!(
        kinds(&track),
        vec![
            (SegmentKind::Speech { event: 0, chunk: 0 }, 0..20_000),
            (SegmentKind::Speech { event: 0, chunk: 1 }, 20_000..40_000),
        ]
    );
    assert_eq!(report.split_count, 1);
    assert_eq!(report.chunk_count, 2);
    assert_eq!(report.forced_chunks, 0);
    assert_eq!(synth.requested(), vec!["Hello", "Hello world", "world"]);
}

#[tokio::test]
async fn test_short_speech_is_slowed_and_padded() {
    // 3s в окне 5s: x0.85 дает ~3.53s речи и ~1.47s тишины
    let synth = Arc::new(ScriptedSynthesizer::new().with_duration("Hello world", secs(3.0)));
    let (track, _) = dubber(test_config(), &synth)
        .synthesize_track(&hello(secs(5.0)), None)
        .await
        .unwrap();

    assert_eq!(track.audio.frames(), 40_000);
    assert!((mean(&track, 5_000..20_000) - 0.5).abs() < 0.05);
    assert!(track.audio.samples[28_300..].iter().all(|&s| s == 0.0));
}

fn two_lines() -> Transcript {
    transcript(
        vec![
            Event::new(Duration::ZERO, secs(2.0), "First line."),
            Event::new(secs(3.0), secs(2.0), "Broken line."),
        ],
        secs(6.0),
    )
}

#[tokio::test]
async fn test_best_effort_replaces_failed_chunk_with_silence() {
    let synth = Arc::new(
        ScriptedSynthesizer::new()
            .failing("Broken line.", SynthesisError::Unavailable("503".into())),
    );
    let mut tracker = ProgressTracker::new();
    let history = MemoryProgressObserver::new();
    tracker.add_observer(Box::new(history.clone()));

    let (track, report) = dubber(test_config(), &synth)
        .synthesize_track(&two_lines(), Some(&tracker))
        .await
        .unwrap();

    assert_eq!(synth.calls("Broken line."), 3);
    assert_eq!(report.degraded_events, vec![1]);
    assert_eq!(
        kinds(&track),
        vec![
            (SegmentKind::Speech { event: 0, chunk: 0 }, 0..16_000),
            (SegmentKind::Gap, 16_000..24_000),
            (SegmentKind::Silence { event: 1, chunk: 0 }, 24_000..40_000),
            (SegmentKind::Gap, 40_000..48_000),
        ]
    );
    assert!(track.audio.samples[24_000..40_000].iter().all(|&s| s == 0.0));
    assert!(track.is_contiguous());

    assert_eq!(tracker.state(), PipelineState::Done);
    let states: Vec<PipelineState> = history.history().iter().map(|p| p.state).collect();
    assert!(states.contains(&PipelineState::Synthesizing));
    assert_eq!(states.last(), Some(&PipelineState::Done));
}

#[tokio::test]
async fn test_fail_fast_reports_event_index() {
    let synth = Arc::new(
        ScriptedSynthesizer::new()
            .failing("Broken line.", SynthesisError::UnsupportedVoice("alloy".into())),
    );
    let config = DubbingConfig { failure_policy: FailurePolicy::FailFast, ..test_config() };
    let tracker = ProgressTracker::new();

    let err = dubber(config, &synth)
        .synthesize_track(&two_lines(), Some(&tracker))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DubError::Synthesis { event: 1, source: SynthesisError::UnsupportedVoice(_) }
    ));
    assert_eq!(err.event_index(), Some(1));
    // Фатальная ошибка не повторяется
    assert_eq!(synth.calls("Broken line."), 1);
    assert_eq!(tracker.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_fail_fast_does_not_wait_for_slow_chunks() {
    let synth = Arc::new(
        ScriptedSynthesizer::new()
            .with_delay("First line.", secs(1.5))
            .failing("Broken line.", SynthesisError::UnsupportedVoice("alloy".into())),
    );
    let config = DubbingConfig { failure_policy: FailurePolicy::FailFast, ..test_config() };

    let started = tokio::time::Instant::now();
    let err = dubber(config, &synth)
        .synthesize_track(&two_lines(), None)
        .await
        .unwrap_err();

    assert!(started.elapsed() < ms(500), "returned after {:?}", started.elapsed());
    assert!(matches!(
        err,
        DubError::Synthesis { event: 1, source: SynthesisError::UnsupportedVoice(_) }
    ));
    // Медленный чанк прерван, а не повторен
    assert_eq!(synth.calls("First line."), 1);
}
