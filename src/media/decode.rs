//! Декодирование сжатого аудио через symphonia
//!
//! Ответы синтезаторов (MP3, AAC) и исходные дорожки приводятся
//! к `AudioBuffer` с сохранением числа каналов.

use std::path::Path;
use log::{info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use crate::error::{DubError, Result};
use crate::media::audio::AudioBuffer;
use crate::media::wav;

/// Декодировать аудио из памяти; `extension` служит подсказкой формата
pub fn decode_audio_bytes(data: &[u8], extension: Option<&str>) -> Result<AudioBuffer> {
    if data.is_empty() {
        return Err(DubError::Decode("Empty audio data".to_string()));
    }

    let cursor = std::io::Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| DubError::Decode(format!("Failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubError::Decode("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubError::Decode(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DubError::Decode(format!("Failed to read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(sample_buf.samples());
            }
            // Поврежденный пакет пропускаем
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(DubError::Decode(format!("Decoding failed: {}", e))),
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(DubError::Decode("Audio stream has unknown format".to_string()));
    }

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Декодировать аудиофайл; WAV читается через hound, остальное через symphonia
pub fn decode_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let buffer = match extension.as_str() {
        "wav" => wav::read_wav(path)?,
        // Только форматы, для которых включены возможности symphonia
        "mp3" | "aac" => {
            let data = std::fs::read(path)?;
            decode_audio_bytes(&data, Some(&extension))?
        }
        _ => {
            return Err(DubError::Decode(format!(
                "Unsupported audio format: {}",
                path.display()
            )))
        }
    };

    info!(
        "Decoded {} ({} frames, {} Hz, {} ch)",
        path.display(),
        buffer.frames(),
        buffer.sample_rate,
        buffer.channels
    );
    Ok(buffer)
}
