//! Основной файл библиотеки tts-dub
//!
//! Библиотека озвучивает транскрипт с таймкодами: синтезирует речь для
//! каждого события, подгоняет ее под исходное окно времени, собирает
//! непрерывную дорожку речи и смешивает ее с оригинальным аудио.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tts_dub::{read_wav, DubbingConfig, Dubber, OpenAiSynthesizer, Transcript};
//!
//! # async fn demo(transcript: Transcript) -> tts_dub::Result<()> {
//! let synthesizer = Arc::new(OpenAiSynthesizer::new("sk-..."));
//! let dubber = Dubber::new(DubbingConfig::default(), synthesizer)?;
//! let original = read_wav("original.wav")?;
//! let (mixed, report) = dubber.run(&transcript, &original).await?;
//! # let _ = (mixed, report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod notification;
pub mod pipeline;
pub mod progress;
pub mod timing;
pub mod transcript;
pub mod tts;

#[cfg(test)]
mod tests;

pub use config::{
    BetweenEvents, CacheConfig, ChunkerConfig, DubbingConfig, FailurePolicy, FitConfig, MixSpec,
    OutputFormat, RetryPolicy,
};
pub use error::{DubError, Result, SynthesisError};
pub use media::{read_wav, write_wav, AssembledTrack, AudioBuffer};
pub use pipeline::{DubReport, Dubber};
pub use progress::{PipelineState, ProgressInfo, ProgressObserver, ProgressTracker};
pub use transcript::{Event, Transcript};
pub use tts::{CachingSynthesizer, OpenAiSynthesizer, SynthesisResult, Synthesizer};
