//! TOML configuration file loading
//!
//! Supports `~/.config/chatterbox/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Path to a persona TOML file
    #[serde(default)]
    pub persona: Option<String>,

    /// Data directory override
    #[serde(default)]
    pub data_dir: Option<String>,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Token budget configuration
    #[serde(default)]
    pub budget: BudgetFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Discord configuration
    #[serde(default)]
    pub discord: DiscordFileConfig,

    /// OBS overlay configuration
    #[serde(default)]
    pub overlay: OverlayFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o")
    pub model: Option<String>,

    /// OpenAI-compatible base URL
    pub base_url: Option<String>,
}

/// Token budget configuration
#[derive(Debug, Default, Deserialize)]
pub struct BudgetFileConfig {
    pub max_tokens: Option<usize>,
    pub chars_per_token: Option<usize>,
    pub per_message_overhead: Option<usize>,
    pub reply_overhead: Option<usize>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("espeak", "elevenlabs" or "openai")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Logical voice name, overrides the persona's voice
    pub voice: Option<String>,

    /// TTS speed multiplier (OpenAI)
    pub tts_speed: Option<f32>,

    /// Downmix and resample Discord audio to 16kHz before STT
    pub resample: Option<bool>,

    /// Extra logical voice → espeak voice mappings
    #[serde(default)]
    pub espeak_voices: HashMap<String, String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
    pub discord: Option<String>,
}

/// Discord configuration
#[derive(Debug, Default, Deserialize)]
pub struct DiscordFileConfig {
    /// Command prefix (default "!")
    pub command_prefix: Option<String>,
}

/// OBS overlay configuration
#[derive(Debug, Default, Deserialize)]
pub struct OverlayFileConfig {
    /// obs-websocket URL (e.g. "ws://localhost:4455")
    pub url: Option<String>,
    pub password: Option<String>,
    pub scene: Option<String>,
    pub source: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chatterbox/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chatterbox").join("config.toml"))
}
