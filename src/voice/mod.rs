//! Voice processing module
//!
//! Speech recognition, synthesis, and the audio plumbing around them.

pub mod audio;
mod capture;
mod playback;
mod stt;
mod tts;
mod voice_map;

pub use capture::{AudioCapture, rms};
pub use playback::{AudioPlayback, DecodedAudio, Playback, decode_file, decode_mp3, decode_wav};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{EspeakTts, Synthesizer, TextToSpeech, audio_file_name};
pub use voice_map::{DEFAULT_VOICE, VoiceMap};
