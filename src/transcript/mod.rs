//! Модуль для работы с транскриптом
//!
//! Содержит модель событий и адаптер для чтения WebVTT.

pub mod model;
pub mod vtt;

pub use model::{Event, Transcript};
