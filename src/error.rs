//! Error types for Chatterbox

use thiserror::Error;

/// Result type alias for Chatterbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Chatterbox
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, bad value)
    #[error("configuration error: {0}")]
    Config(String),

    /// Empty prompt handed to the chat backend
    #[error("didn't receive input")]
    EmptyPrompt,

    /// A single prompt that alone exceeds the token budget
    #[error("prompt too large: ~{estimated} tokens exceeds budget of {max}")]
    PromptTooLarge {
        /// Estimated token count of the prompt
        estimated: usize,
        /// Configured budget
        max: usize,
    },

    /// Chat completion error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Discord voice connection error
    #[error("voice error: {0}")]
    Voice(String),

    /// Discord channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// OBS overlay error
    #[error("overlay error: {0}")]
    Overlay(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
