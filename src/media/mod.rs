//! Модуль для работы с аудио
//!
//! Буфер PCM, ввод-вывод WAV, декодирование, сборка дорожки речи и микширование.

pub mod assembly;
pub mod audio;
pub mod decode;
pub mod mix;
pub mod wav;

pub use assembly::{AssembledTrack, FittedChunk, Segment, SegmentKind, TrackAssembler};
pub use audio::AudioBuffer;
pub use decode::{decode_audio_bytes, decode_audio_file};
pub use mix::Mixer;
pub use wav::{read_wav, write_wav};
