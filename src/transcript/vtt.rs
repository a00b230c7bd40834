//! Модуль для чтения транскрипта из WebVTT
//!
//! Это адаптер источника транскрипта: ядро работает только с готовым
//! `Transcript`, а формат файла разбирается здесь.

use std::path::Path;
use std::time::Duration;
use crate::error::{DubError, Result};
use crate::transcript::model::{Event, Transcript};

/// Прочитать VTT файл и построить проверенный транскрипт
pub fn parse_vtt_file<P: AsRef<Path>>(
    vtt_file_path: P,
    language: &str,
    voice: &str,
    media_duration: Option<Duration>,
) -> Result<Transcript> {
    let content = std::fs::read_to_string(&vtt_file_path).map_err(|e| {
        DubError::Other(format!(
            "Failed to open VTT file {}: {}",
            vtt_file_path.as_ref().display(),
            e
        ))
    })?;
    let events = parse_vtt_str(&content)?;
    log::info!("Parsed {} cues from {}", events.len(), vtt_file_path.as_ref().display());
    Transcript::new(events, language, voice, media_duration)
}

/// Разобрать содержимое VTT в список событий
pub fn parse_vtt_str(content: &str) -> Result<Vec<Event>> {
    let mut lines = content.lines();

    // Проверяем заголовок WebVTT
    match lines.next() {
        Some(header) if header.trim_start_matches('\u{feff}').starts_with("WEBVTT") => {}
        _ => {
            return Err(DubError::Other(
                "Invalid VTT file format: missing WEBVTT header".to_string(),
            ))
        }
    }

    let mut events = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in lines {
        if line.trim().is_empty() {
            if let Some(event) = parse_cue_block(&block) {
                events.push(event);
            }
            block.clear();
        } else {
            block.push(line);
        }
    }
    if let Some(event) = parse_cue_block(&block) {
        events.push(event);
    }

    Ok(events)
}

/// Разбор одного блока: необязательный идентификатор, строка времени, текст
fn parse_cue_block(lines: &[&str]) -> Option<Event> {
    let timing_pos = lines.iter().position(|line| line.contains("-->"))?;
    let mut parts = lines[timing_pos].split("-->");
    let start = parse_timestamp(parts.next()?)?;
    // После времени окончания могут идти настройки cue ("align:start")
    let end = parse_timestamp(parts.next()?.split_whitespace().next()?)?;

    let text = lines[timing_pos + 1..]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(Event::new(start, end.saturating_sub(start), text))
}

/// Разбор времени в формате HH:MM:SS.mmm или MM:SS.mmm
fn parse_timestamp(value: &str) -> Option<Duration> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (whole, fraction) = seconds.split_once(['.', ',']).unwrap_or((seconds, "0"));
    let whole = whole.parse::<u64>().ok()?;
    let millis = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()? * 100,
        2 => fraction.parse::<u64>().ok()? * 10,
        _ => fraction.get(..3)?.parse::<u64>().ok()?,
    };

    Some(Duration::from_millis(
        hours * 3_600_000 + minutes * 60_000 + whole * 1000 + millis,
    ))
}
