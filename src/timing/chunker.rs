//! Разбиение текста события на чанки
//!
//! Если синтезированная речь не помещается в окно даже на максимальной
//! скорости, текст делится на две части по границе предложения или
//! фразы, ближайшей к середине, а окно делится пропорционально длине частей.

use std::time::Duration;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use crate::config::ChunkerConfig;

lazy_static! {
    // Конец предложения, возможно с закрывающей кавычкой или скобкой
    static ref SENTENCE_BOUNDARY: Regex = Regex::new(r#"[.!?…]+["'»”)\]]*\s+"#).unwrap();
    // Граница фразы внутри предложения
    static ref CLAUSE_BOUNDARY: Regex = Regex::new(r"[,;:]\s+|\s+[—–-]\s+").unwrap();
    static ref WORD_BOUNDARY: Regex = Regex::new(r"\s+").unwrap();
}

/// Часть текста события со своим окном
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Выделенная длительность
    pub allotted: Duration,
    /// Глубина разбиения (0 - исходный текст события)
    pub depth: u8,
}

impl Chunk {
    pub fn root(text: impl Into<String>, allotted: Duration) -> Self {
        Self { text: text.into(), allotted, depth: 0 }
    }

    /// Количество символов для пропорционального деления окна
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Делитель текста на чанки
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn max_depth(&self) -> u8 {
        self.config.max_depth
    }

    /// Разделить чанк на две части.
    ///
    /// Возвращает `None`, если глубина исчерпана или в тексте нет границы
    /// (одно неделимое слово). Сумма окон частей точно равна окну чанка.
    pub fn split(&self, chunk: &Chunk) -> Option<[Chunk; 2]> {
        if chunk.depth >= self.config.max_depth {
            return None;
        }
        let pos = find_split_point(&chunk.text)?;
        let left = chunk.text[..pos].trim_end().to_string();
        let right = chunk.text[pos..].trim_start().to_string();

        let left_chars = left.chars().count() as f64;
        let right_chars = right.chars().count() as f64;
        let share = left_chars / (left_chars + right_chars);
        let left_allotted =
            Duration::from_secs_f64(chunk.allotted.as_secs_f64() * share).min(chunk.allotted);
        let right_allotted = chunk.allotted - left_allotted;

        debug!(
            "Split chunk at depth {} into {} + {} chars ({:.3}s + {:.3}s)",
            chunk.depth,
            left_chars,
            right_chars,
            left_allotted.as_secs_f64(),
            right_allotted.as_secs_f64()
        );

        let depth = chunk.depth + 1;
        Some([
            Chunk { text: left, allotted: left_allotted, depth },
            Chunk { text: right, allotted: right_allotted, depth },
        ])
    }

    /// Делить чанк, пока `needs_split` возвращает `true` и деление возможно.
    /// Листья возвращаются в порядке текста.
    pub fn split_until<F>(&self, root: Chunk, mut needs_split: F) -> Vec<Chunk>
    where
        F: FnMut(&Chunk) -> bool,
    {
        let mut leaves = Vec::new();
        let mut stack = vec![root];

        while let Some(chunk) = stack.pop() {
            let parts = if needs_split(&chunk) { self.split(&chunk) } else { None };
            match parts {
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => leaves.push(chunk),
            }
        }

        leaves
    }

    /// Начальные чанки события: текст длиннее `max_chars` делится заранее
    pub fn prepare(&self, text: &str, allotted: Duration) -> Vec<Chunk> {
        let max_chars = self.config.max_chars;
        self.split_until(Chunk::root(text, allotted), |chunk| chunk.char_count() > max_chars)
    }
}

/// Найти байтовую позицию разделения текста.
///
/// Сначала ищется граница предложения в средней половине текста, затем
/// граница фразы там же; если таких нет, берется любая граница, ближайшая
/// к середине.
pub fn find_split_point(text: &str) -> Option<usize> {
    let len = text.len();
    let middle = len / 2;
    let band = len / 4..=len - len / 4;

    let candidates = |regex: &Regex| -> Vec<usize> {
        regex
            .find_iter(text)
            .map(|m| m.end())
            .filter(|&pos| {
                !text[..pos].trim().is_empty() && !text[pos..].trim().is_empty()
            })
            .collect()
    };
    let nearest =
        |positions: &[usize]| positions.iter().copied().min_by_key(|&pos| pos.abs_diff(middle));

    let sentences = candidates(&SENTENCE_BOUNDARY);
    let clauses = candidates(&CLAUSE_BOUNDARY);

    for class in [&sentences, &clauses] {
        let in_band: Vec<usize> = class.iter().copied().filter(|pos| band.contains(pos)).collect();
        if let Some(pos) = nearest(&in_band) {
            return Some(pos);
        }
    }

    let mut all = candidates(&WORD_BOUNDARY);
    all.extend(sentences);
    all.extend(clauses);
    nearest(&all)
}
