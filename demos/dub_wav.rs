//! Пример озвучивания WAV-дорожки по субтитрам WebVTT
//!
//! ```text
//! OPENAI_API_KEY=sk-... cargo run --example dub_wav -- \
//!     subtitles.vtt original.wav dubbed.wav [voice] [language] [config.json]
//! ```

use std::sync::Arc;
use anyhow::{bail, Context, Result};
use tts_dub::notification::{
    CompositeProgressObserver, ConsoleProgressObserver, FileProgressObserver,
};
use tts_dub::transcript::vtt::parse_vtt_file;
use tts_dub::{
    read_wav, write_wav, DubbingConfig, Dubber, OpenAiSynthesizer, ProgressTracker, Synthesizer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Инициализируем логирование
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!(
            "usage: dub_wav <subtitles.vtt> <original.wav> <output.wav> \
             [voice] [language] [config.json]"
        );
    }
    let voice = args.get(3).map(String::as_str).unwrap_or("alloy");
    let language = args.get(4).map(String::as_str).unwrap_or("en");

    let config = match args.get(5) {
        Some(path) => DubbingConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path))?,
        None => DubbingConfig::default(),
    };

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
    let openai = OpenAiSynthesizer::new(api_key);
    openai.validate_api_key().await?;

    let original = read_wav(&args[1])?;
    let transcript = parse_vtt_file(&args[0], language, voice, Some(original.duration()))?;

    let mut observers = CompositeProgressObserver::new();
    observers.add_observer(Box::new(ConsoleProgressObserver::new()));
    observers.add_observer(Box::new(FileProgressObserver::new("dub_progress.log")));
    let mut tracker = ProgressTracker::new();
    tracker.add_observer(Box::new(observers));

    let synthesizer: Arc<dyn Synthesizer> = Arc::new(openai);
    let dubber = Dubber::new(config, synthesizer)?;
    let (mixed, report) = dubber.run_with_progress(&transcript, &original, Some(&tracker)).await?;

    write_wav(&args[2], &mixed)?;
    println!("Dubbed track written to {}", args[2]);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
