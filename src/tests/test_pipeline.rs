//! Параллелизм, порядок сборки и микширование

use std::sync::Arc;
use super::*;
use crate::config::{BetweenEvents, ChunkerConfig, MixSpec};
use crate::error::{DubError, SynthesisError};
use crate::media::audio::AudioBuffer;
use crate::progress::{PipelineState, ProgressTracker};

fn lines() -> Transcript {
    transcript(
        vec![
            Event::new(ms(0), ms(1_000), "One two three."),
            Event::new(ms(1_500), ms(800), "Four."),
            Event::new(ms(2_500), ms(1_200), "Five six seven eight."),
        ],
        ms(4_000),
    )
}

#[tokio::test]
async fn test_completion_order_does_not_change_track() {
    let in_order = Arc::new(ScriptedSynthesizer::new());
    let reversed = Arc::new(
        ScriptedSynthesizer::new()
            .with_delay("One two three.", ms(40))
            .with_delay("Four.", ms(20))
            .with_delay("Five six seven eight.", ms(1)),
    );

    let (expected, _) =
        dubber(test_config(), &in_order).synthesize_track(&lines(), None).await.unwrap();
    let (actual, _) =
        dubber(test_config(), &reversed).synthesize_track(&lines(), None).await.unwrap();

    assert_eq!(actual.segments, expected.segments);
    assert_eq!(actual.audio, expected.audio);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let events = (0..12)
        .map(|i| Event::new(ms(i * 500), ms(400), format!("Line {}", i)))
        .collect();
    let transcript = transcript(events, ms(6_000));
    let synth = (0..12).fold(ScriptedSynthesizer::new().with_per_char(ms(60)), |s, i| {
        s.with_delay(&format!("Line {}", i), ms(10))
    });
    let synth = Arc::new(synth);
    let config = DubbingConfig { max_concurrent_requests: 3, ..test_config() };

    dubber(config, &synth).synthesize_track(&transcript, None).await.unwrap();

    assert_eq!(synth.total_calls(), 12);
    assert_eq!(synth.max_in_flight(), 3);
}

#[tokio::test]
async fn test_blank_mode_keeps_original_between_events() {
    // Второе событие не синтезируется и становится тишиной
    let synth = Arc::new(
        ScriptedSynthesizer::new().failing("Four.", SynthesisError::Timeout),
    );
    let config = DubbingConfig {
        mix: MixSpec::new(1.0, 1.0).unwrap(),
        between_events: BetweenEvents::Blank,
        ..test_config()
    };
    let original = AudioBuffer::new(vec![0.2; 32_000], RATE, 1);

    let (mixed, report) = dubber(config, &synth).run(&lines(), &original).await.unwrap();

    assert_eq!(report.degraded_events, vec![1]);
    assert_eq!(mixed.frames(), 32_000);
    // Паузы: оригинал без изменений
    assert!(mixed.samples[8_000..12_000].iter().all(|&s| s == 0.2));
    assert!(mixed.samples[29_600..].iter().all(|&s| s == 0.2));
    // Тишина деградировавшего события: только оригинал с весом 0.5
    assert!(mixed.samples[12_000..18_400].iter().all(|&s| (s - 0.1).abs() < 1e-6));
    // Речь: 0.5 * 0.2 + 0.5 * 0.5
    let speech = &mixed.samples[2_000..6_000];
    let level = speech.iter().sum::<f32>() / speech.len() as f32;
    assert!((level - 0.35).abs() < 0.05, "speech level {}", level);
}

#[tokio::test]
async fn test_mismatched_original_is_rejected() {
    let synth = Arc::new(ScriptedSynthesizer::new());
    let original = AudioBuffer::new(vec![0.2; 16_000], RATE, 1);
    let tracker = ProgressTracker::new();

    let err = dubber(test_config(), &synth)
        .run_with_progress(&lines(), &original, Some(&tracker))
        .await
        .unwrap_err();

    assert!(matches!(err, DubError::MixAlignment(_)));
    assert_eq!(tracker.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_original_is_resampled_before_mixing() {
    let synth = Arc::new(ScriptedSynthesizer::new());
    // 4s стерео 16 кГц
    let original = AudioBuffer::new(vec![0.1; 64_000 * 2], 16_000, 2);

    let (mixed, _) = dubber(test_config(), &synth).run(&lines(), &original).await.unwrap();

    assert_eq!(mixed.sample_rate, RATE);
    assert_eq!(mixed.channels, 1);
    assert_eq!(mixed.frames(), 32_000);
}

#[tokio::test]
async fn test_clips_are_converted_to_output_format() {
    let synth = Arc::new(ScriptedSynthesizer::new().with_sample_rate(24_000));

    let (track, _) = dubber(test_config(), &synth).synthesize_track(&lines(), None).await.unwrap();

    assert_eq!(track.audio.sample_rate, RATE);
    assert_eq!(track.audio.frames(), 32_000);
    assert!(track.is_contiguous());
    assert!((mean(&track, 2_000..6_000) - 0.5).abs() < 0.05);
}

#[tokio::test]
async fn test_repeated_lines_hit_cache() {
    let events = vec![
        Event::new(ms(0), ms(1_000), "Again."),
        Event::new(ms(1_000), ms(1_000), "Again."),
    ];
    let synth = Arc::new(ScriptedSynthesizer::new());
    let mut config = test_config();
    config.cache.enabled = true;
    config.max_concurrent_requests = 1;

    dubber(config, &synth)
        .synthesize_track(&transcript(events, ms(2_000)), None)
        .await
        .unwrap();

    assert_eq!(synth.calls("Again."), 1);
}

#[tokio::test]
async fn test_markup_only_event_becomes_silence() {
    let events = vec![
        Event::new(ms(0), ms(1_000), "[music]"),
        Event::new(ms(1_000), ms(1_000), "<i>Hi</i> there"),
    ];
    let synth = Arc::new(ScriptedSynthesizer::new());

    let (track, _) = dubber(test_config(), &synth)
        .synthesize_track(&transcript(events, ms(2_000)), None)
        .await
        .unwrap();

    assert_eq!(synth.requested(), vec!["Hi there"]);
    assert_eq!(track.segments[0].kind, SegmentKind::Silence { event: 0, chunk: 0 });
    assert!(track.audio.samples[..8_000].iter().all(|&s| s == 0.0));
}

#[tokio::test]
async fn test_unsplittable_chunk_is_forced() {
    let word = "Supercalifragilisticexpialidocious";
    let events = vec![Event::new(ms(0), ms(2_000), word)];
    let synth = Arc::new(ScriptedSynthesizer::new().with_duration(word, secs(10.0)));

    let (track, report) = dubber(test_config(), &synth)
        .synthesize_track(&transcript(events, ms(2_000)), None)
        .await
        .unwrap();

    assert_eq!(report.forced_chunks, 1);
    assert_eq!(report.split_count, 0);
    assert_eq!(track.audio.frames(), 16_000);
    assert!(track.is_contiguous());
}

#[tokio::test]
async fn test_split_depth_is_bounded() {
    let text = (0..40).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
    let events = vec![Event::new(ms(0), ms(1_000), text.as_str())];
    // Любой фрагмент звучит слишком долго
    let synth = Arc::new(ScriptedSynthesizer::new().with_per_char(ms(500)));
    let config = DubbingConfig {
        chunking: ChunkerConfig { max_depth: 2, ..ChunkerConfig::default() },
        ..test_config()
    };

    let (track, report) = dubber(config, &synth)
        .synthesize_track(&transcript(events, ms(1_000)), None)
        .await
        .unwrap();

    assert_eq!(report.split_count, 3);
    assert_eq!(report.chunk_count, 4);
    assert_eq!(report.forced_chunks, 4);
    assert_eq!(track.audio.frames(), 8_000);
    assert!(track.is_contiguous());
}

#[tokio::test]
async fn test_long_text_is_split_before_synthesis() {
    let events = vec![Event::new(ms(0), ms(4_000), "First half here. Second half there.")];
    let synth = Arc::new(ScriptedSynthesizer::new().with_per_char(ms(100)));
    let config = DubbingConfig {
        chunking: ChunkerConfig { max_chars: 20, ..ChunkerConfig::default() },
        ..test_config()
    };

    let (_, report) = dubber(config, &synth)
        .synthesize_track(&transcript(events, ms(4_000)), None)
        .await
        .unwrap();

    assert_eq!(synth.requested(), vec!["First half here.", "Second half there."]);
    assert_eq!(report.chunk_count, 2);
}
