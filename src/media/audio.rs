//! Модуль для работы с аудиоданными в памяти
//!
//! `AudioBuffer` хранит чередующиеся (interleaved) семплы f32.
//! Здесь же функции приведения формата: смена частоты дискретизации
//! и числа каналов, растяжение до точного числа кадров, нормализация.

use std::time::Duration;
use log::{debug, info, warn};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use crate::error::{DubError, Result};

/// PCM-аудио в памяти
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Чередующиеся семплы в диапазоне [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self { samples, sample_rate, channels }
    }

    /// Тишина заданной длины в кадрах
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Количество кадров (семплов на канал)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Совпадает ли формат с заданным
    pub fn has_format(&self, sample_rate: u32, channels: u16) -> bool {
        self.sample_rate == sample_rate && self.channels == channels
    }

    /// Максимальная абсолютная амплитуда
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()))
    }

    /// Разделить на каналы
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        let channels = self.channels.max(1) as usize;
        let mut planar = vec![Vec::with_capacity(self.frames()); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        planar
    }

    /// Собрать из отдельных каналов одинаковой длины
    pub fn from_planar(planar: &[Vec<f32>], sample_rate: u32) -> Self {
        let channels = planar.len();
        let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for channel in planar {
                samples.push(channel[frame]);
            }
        }
        Self::new(samples, sample_rate, channels as u16)
    }

    /// Привести к заданному числу каналов.
    ///
    /// Многоканальный звук сводится в моно усреднением; моно дублируется
    /// во все каналы.
    pub fn to_channels(&self, channels: u16) -> AudioBuffer {
        if channels == self.channels {
            return self.clone();
        }

        let src = self.channels.max(1) as usize;
        let mono: Vec<f32> = if src == 1 {
            self.samples.clone()
        } else {
            self.samples
                .chunks_exact(src)
                .map(|frame| frame.iter().sum::<f32>() / src as f32)
                .collect()
        };

        let dst = channels as usize;
        let samples = if dst == 1 {
            mono
        } else {
            mono.iter().flat_map(|&s| std::iter::repeat(s).take(dst)).collect()
        };
        AudioBuffer::new(samples, self.sample_rate, channels)
    }

    /// Обрезать или дополнить тишиной до точного числа кадров
    pub fn set_frames(&mut self, frames: usize) {
        self.samples.resize(frames * self.channels as usize, 0.0);
    }
}

/// Число кадров для длительности с округлением до ближайшего
pub fn frames_at(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Привести буфер к формату (частота и каналы)
pub fn convert(buffer: &AudioBuffer, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    if buffer.has_format(sample_rate, channels) {
        return Ok(buffer.clone());
    }
    let mapped = buffer.to_channels(channels);
    resample(&mapped, sample_rate)
}

/// Сменить частоту дискретизации
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate == target_rate {
        return Ok(buffer.clone());
    }
    if buffer.sample_rate == 0 || target_rate == 0 {
        return Err(DubError::AudioProcessing(format!(
            "Invalid sample rate conversion {} -> {}",
            buffer.sample_rate, target_rate
        )));
    }

    let target_frames = (buffer.frames() as f64 * target_rate as f64 / buffer.sample_rate as f64)
        .round() as usize;
    debug!(
        "Resampling {} frames {} Hz -> {} Hz",
        buffer.frames(),
        buffer.sample_rate,
        target_rate
    );

    let mut result = stretch_to_frames(buffer, target_frames)?;
    result.sample_rate = target_rate;
    Ok(result)
}

/// Растянуть или сжать буфер до точного числа кадров.
///
/// Используется для изменения скорости речи: коэффициент ресемплинга равен
/// отношению целевого числа кадров к исходному, частота при этом не меняется.
pub fn stretch_to_frames(buffer: &AudioBuffer, target_frames: usize) -> Result<AudioBuffer> {
    let frames = buffer.frames();
    if frames == target_frames {
        return Ok(buffer.clone());
    }
    if frames == 0 || target_frames == 0 {
        return Ok(AudioBuffer::silence(target_frames, buffer.sample_rate, buffer.channels));
    }

    let ratio = target_frames as f64 / frames as f64;
    let planar = stretch_with_rubato(&buffer.to_planar(), ratio)?;
    let mut result = AudioBuffer::from_planar(&planar, buffer.sample_rate);
    result.channels = buffer.channels;
    result.set_frames(target_frames);
    Ok(result)
}

/// Ресемплинг с помощью Rubato (Sinc-интерполяция).
///
/// Полные блоки обрабатываются через `process`, остаток через
/// `process_partial`, затем ресемплер досливается. Задержка фильтра
/// отбрасывается из начала результата.
fn stretch_with_rubato(input: &[Vec<f32>], ratio: f64) -> Result<Vec<Vec<f32>>> {
    let channels = input.len();
    let frames = input.first().map(Vec::len).unwrap_or(0);
    if channels == 0 || frames == 0 {
        return Ok(vec![Vec::new(); channels]);
    }

    // Размер блока зависит от длины фрагмента
    let block_size = if frames < 4_096 {
        64
    } else if frames < 22_050 {
        256
    } else {
        1024
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, block_size, channels)
        .map_err(|e| DubError::AudioProcessing(format!("Failed to init resampler: {}", e)))?;

    let expected = (frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    while frames - pos >= block_size {
        let block: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..pos + block_size]).collect();
        let chunk = resampler
            .process(block.as_slice(), None)
            .map_err(|e| DubError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        append(chunk, &mut output);
        pos += block_size;
    }

    if pos < frames {
        let tail: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..]).collect();
        let chunk = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| DubError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        append(chunk, &mut output);
    }

    // Сливаем задержку фильтра
    let mut guard = 0;
    while output[0].len() < expected + delay && guard < 64 {
        let chunk = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| DubError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        append(chunk, &mut output);
        guard += 1;
    }

    for channel in output.iter_mut() {
        channel.drain(..delay.min(channel.len()));
    }
    Ok(output)
}

fn append(chunk: Vec<Vec<f32>>, output: &mut [Vec<f32>]) {
    for (out, part) in output.iter_mut().zip(chunk) {
        out.extend_from_slice(&part);
    }
}

/// Вычисляет среднеквадратичное значение (RMS)
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Нормализует пиковую амплитуду до `target_peak` на месте.
///
/// Возвращает примененный коэффициент (1.0, если звук тихий или пустой).
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) -> f32 {
    let max_amplitude = samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    if max_amplitude <= 0.00001 {
        warn!("Audio is silent or too quiet to normalize: peak {:.6}", max_amplitude);
        return 1.0;
    }

    let factor = target_peak / max_amplitude;
    for sample in samples.iter_mut() {
        *sample *= factor;
    }
    info!(
        "Peak normalization: max_amplitude={:.6}, target={:.3}, factor={:.6}",
        max_amplitude, target_peak, factor
    );
    factor
}

/// Короткие fade in/out для устранения щелчков на краях клипа
pub fn apply_fade(buffer: &mut AudioBuffer, fade: Duration) {
    let frames = buffer.frames();
    let fade_frames = frames_at(fade, buffer.sample_rate).min(frames / 4);
    if fade_frames == 0 {
        return;
    }
    let channels = buffer.channels as usize;

    for i in 0..fade_frames {
        let factor = i as f32 / fade_frames as f32;
        for ch in 0..channels {
            buffer.samples[i * channels + ch] *= factor;
            buffer.samples[(frames - 1 - i) * channels + ch] *= factor;
        }
    }
}
