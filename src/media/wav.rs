//! Чтение и запись WAV через hound

use std::io::{Read, Seek, Write};
use std::path::Path;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::info;
use crate::error::{DubError, Result};
use crate::media::audio::AudioBuffer;

/// Прочитать WAV-файл, сохраняя число каналов
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let reader = WavReader::open(path.as_ref())?;
    let buffer = read_samples(reader)?;
    info!(
        "Read WAV {} ({} frames, {} Hz, {} ch)",
        path.as_ref().display(),
        buffer.frames(),
        buffer.sample_rate,
        buffer.channels
    );
    Ok(buffer)
}

/// Декодировать WAV из памяти
pub fn decode_wav_bytes(data: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(std::io::Cursor::new(data))?;
    read_samples(reader)
}

fn read_samples<R: Read>(mut reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|s| s as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8388608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 2147483648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        _ => {
            return Err(DubError::Decode(format!(
                "Unsupported WAV format: {:?}, {} bits",
                spec.sample_format, spec.bits_per_sample
            )))
        }
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

fn spec_for(buffer: &AudioBuffer) -> WavSpec {
    WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

fn write_samples<W: Write + Seek>(mut writer: WavWriter<W>, buffer: &AudioBuffer) -> Result<()> {
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Записать буфер в WAV-файл (32-бит float)
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &AudioBuffer) -> Result<()> {
    let writer = WavWriter::create(path.as_ref(), spec_for(buffer))?;
    write_samples(writer, buffer)?;
    info!(
        "Saved WAV {} ({} frames, {} Hz, {} ch)",
        path.as_ref().display(),
        buffer.frames(),
        buffer.sample_rate,
        buffer.channels
    );
    Ok(())
}

/// Закодировать буфер в WAV в памяти
pub fn encode_wav_bytes(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let writer = WavWriter::new(&mut cursor, spec_for(buffer))?;
    write_samples(writer, buffer)?;
    Ok(cursor.into_inner())
}
