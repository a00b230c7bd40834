//! Модуль подгонки времени
//!
//! Содержит подгонщик длительности и делитель текста на чанки.

pub mod chunker;
pub mod fitter;

pub use chunker::{Chunk, Chunker};
pub use fitter::{DurationFitter, FitAction, FitOutcome, FitPlan};
