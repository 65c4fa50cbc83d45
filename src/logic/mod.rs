//! Audio seams used by the engine.

pub mod audio;
#[cfg(feature = "audio-output")]
pub mod audio_thread;
