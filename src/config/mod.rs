//! Configuration management for Chatterbox
//!
//! Values resolve env > TOML file > persona > default.

pub mod file;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;

use crate::conversation::TokenBudget;
use crate::llm::{DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::{Error, Persona, Result};

/// File name of the transcript backup in the data directory
pub const BACKUP_FILE_NAME: &str = "ChatHistoryBackup.txt";

/// Chatterbox configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// Path to data directory (backup, synthesized audio)
    pub data_dir: PathBuf,

    /// Directory synthesized speech files are written to
    pub audio_dir: PathBuf,

    /// Transcript backup file, overwritten after each turn
    pub backup_file: PathBuf,

    /// LLM configuration
    pub llm: LlmConfig,

    /// Transcript token budget
    pub budget: TokenBudget,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Discord configuration
    pub discord: DiscordConfig,

    /// OBS overlay configuration
    pub overlay: OverlayConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier for chat completions
    pub model: String,

    /// OpenAI-compatible base URL
    pub base_url: String,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// OpenAI Whisper API
    #[default]
    Whisper,
    /// Deepgram API
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// Local espeak subprocess
    #[default]
    Espeak,
    /// ElevenLabs API
    ElevenLabs,
    /// OpenAI speech API
    OpenAi,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS model (OpenAI / ElevenLabs)
    pub tts_model: String,

    /// Logical voice name
    pub voice: String,

    /// TTS speed multiplier (OpenAI, 0.25 to 4.0)
    pub tts_speed: f32,

    /// Downmix and resample Discord audio to 16kHz mono before STT
    pub resample: bool,

    /// Extra logical voice → espeak voice mappings
    pub espeak_voices: HashMap<String, String>,
}

/// Discord configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Prefix that marks a message as a bot command
    pub command_prefix: String,
}

/// OBS overlay configuration
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// obs-websocket URL, `None` disables the overlay
    pub url: Option<String>,

    /// obs-websocket password
    pub password: Option<SecretString>,

    /// Scene containing the persona source
    pub scene: String,

    /// Source toggled while the persona speaks
    pub source: String,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper, TTS)
    pub openai: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// Discord bot token
    pub discord: Option<SecretString>,
}

/// Return the data directory (`~/.local/share/chatterbox` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".chatterbox"),
        |d| d.data_dir().join("chatterbox"),
    )
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::from)
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if the persona file cannot be loaded or a value is invalid
    pub fn load(persona_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::from_sources(fc, persona_path, |key| std::env::var(key).ok())?;

        if let Err(e) = std::fs::create_dir_all(&config.audio_dir) {
            tracing::warn!(
                path = %config.audio_dir.display(),
                error = %e,
                "failed to create audio directory"
            );
        }

        Ok(config)
    }

    /// Build configuration from a parsed config file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if the persona file cannot be loaded or a value is invalid
    pub fn from_sources(
        fc: file::ConfigFile,
        persona_path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Persona: CLI > env > toml > embedded
        let persona_path = persona_path
            .map(Path::to_path_buf)
            .or_else(|| env("CHATTERBOX_PERSONA").map(PathBuf::from))
            .or_else(|| fc.persona.map(PathBuf::from));
        let persona = match persona_path {
            Some(path) => Persona::load(&path)?,
            None => Persona::builtin(),
        };

        let api_keys = ApiKeys {
            openai: secret(env("OPENAI_API_KEY").or(fc.api_keys.openai)),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
            deepgram: secret(env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
            discord: secret(
                env("DISCORD_TOKEN")
                    .or_else(|| env("DISCORD_BOT_TOKEN"))
                    .or(fc.api_keys.discord),
            ),
        };

        let data_dir = env("CHATTERBOX_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);
        let audio_dir = data_dir.join("audio");
        let backup_file = data_dir.join(BACKUP_FILE_NAME);

        let llm = LlmConfig {
            model: env("CHATTERBOX_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        };

        let defaults = TokenBudget::default();
        let max_tokens = match env("CHATTERBOX_MAX_TOKENS") {
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid CHATTERBOX_MAX_TOKENS: {v}")))?,
            None => fc.budget.max_tokens.unwrap_or(defaults.max_tokens),
        };
        let budget = TokenBudget {
            max_tokens,
            chars_per_token: fc
                .budget
                .chars_per_token
                .filter(|&n| n > 0)
                .unwrap_or(defaults.chars_per_token),
            per_message_overhead: fc
                .budget
                .per_message_overhead
                .unwrap_or(defaults.per_message_overhead),
            reply_overhead: fc.budget.reply_overhead.unwrap_or(defaults.reply_overhead),
        };

        let stt_provider = env("CHATTERBOX_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|s| s.parse::<SttProvider>())
            .transpose()?
            .unwrap_or_default();
        let tts_provider = env("CHATTERBOX_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|s| s.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or_default();

        let stt_model = env("CHATTERBOX_STT_MODEL")
            .or(fc.voice.stt_model)
            .unwrap_or_else(|| match stt_provider {
                SttProvider::Whisper => "whisper-1".to_string(),
                SttProvider::Deepgram => "nova-2".to_string(),
            });
        let tts_model = env("CHATTERBOX_TTS_MODEL")
            .or(fc.voice.tts_model)
            .unwrap_or_else(|| match tts_provider {
                TtsProvider::ElevenLabs => "eleven_monolingual_v1".to_string(),
                TtsProvider::Espeak | TtsProvider::OpenAi => "tts-1".to_string(),
            });

        let voice = VoiceConfig {
            stt_provider,
            stt_model,
            tts_provider,
            tts_model,
            voice: env("CHATTERBOX_VOICE")
                .or(fc.voice.voice)
                .unwrap_or_else(|| persona.voice.clone()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            resample: env("CHATTERBOX_RESAMPLE")
                .map(|v| parse_bool(&v))
                .or(fc.voice.resample)
                .unwrap_or(true),
            espeak_voices: fc.voice.espeak_voices,
        };

        let discord = DiscordConfig {
            command_prefix: env("CHATTERBOX_COMMAND_PREFIX")
                .or(fc.discord.command_prefix)
                .unwrap_or_else(|| "!".to_string()),
        };

        let overlay = OverlayConfig {
            url: env("OBS_WEBSOCKET_URL").or(fc.overlay.url),
            password: secret(env("OBS_WEBSOCKET_PASSWORD").or(fc.overlay.password)),
            scene: fc
                .overlay
                .scene
                .unwrap_or_else(|| "*** Mid Monitor".to_string()),
            source: fc.overlay.source.unwrap_or_else(|| persona.name.clone()),
        };

        Ok(Self {
            persona,
            data_dir,
            audio_dir,
            backup_file,
            llm,
            budget,
            voice,
            discord,
            overlay,
            api_keys,
        })
    }

    /// Names of the credentials the Discord bot needs but doesn't have
    #[must_use]
    pub fn missing_bot_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.api_keys.discord.is_none() {
            missing.push("DISCORD_TOKEN");
        }
        missing.extend(self.missing_model_credentials());

        missing
    }

    /// Names of the credentials the chat/STT/TTS backends need but don't have
    #[must_use]
    pub fn missing_model_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.api_keys.openai.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.voice.stt_provider == SttProvider::Deepgram && self.api_keys.deepgram.is_none() {
            missing.push("DEEPGRAM_API_KEY");
        }
        if self.voice.tts_provider == TtsProvider::ElevenLabs && self.api_keys.elevenlabs.is_none()
        {
            missing.push("ELEVENLABS_API_KEY");
        }

        missing
    }

    /// Fail with a configuration error listing every missing credential
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any name is missing
    pub fn require(missing: &[&str]) -> Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::Config(format!(
            "missing required environment variables: {}",
            missing.join(", ")
        )))
    }

    /// The OpenAI API key
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the key is not set
    pub fn openai_key(&self) -> Result<SecretString> {
        self.api_keys
            .openai
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(file::ConfigFile::default(), None, env_from(&[])).unwrap();

        assert_eq!(config.persona.name, "Pajama Sam");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.budget, TokenBudget::default());
        assert_eq!(config.voice.stt_provider, SttProvider::Whisper);
        assert_eq!(config.voice.tts_provider, TtsProvider::Espeak);
        assert_eq!(config.voice.voice, "Pointboat");
        assert_eq!(config.discord.command_prefix, "!");
        assert_eq!(config.overlay.source, "Pajama Sam");
        assert!(config.overlay.url.is_none());
        assert!(config.backup_file.ends_with(BACKUP_FILE_NAME));
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = file::ConfigFile::default();
        fc.llm.model = Some("from-file".to_string());
        fc.budget.max_tokens = Some(1000);

        let config = Config::from_sources(
            fc,
            None,
            env_from(&[
                ("CHATTERBOX_LLM_MODEL", "from-env"),
                ("CHATTERBOX_TTS_PROVIDER", "ElevenLabs"),
            ]),
        )
        .unwrap();

        assert_eq!(config.llm.model, "from-env");
        assert_eq!(config.budget.max_tokens, 1000);
        assert_eq!(config.voice.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(config.voice.tts_model, "eleven_monolingual_v1");
    }

    #[test]
    fn invalid_provider_is_config_error() {
        let result = Config::from_sources(
            file::ConfigFile::default(),
            None,
            env_from(&[("CHATTERBOX_STT_PROVIDER", "vosk")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn invalid_max_tokens_is_config_error() {
        let result = Config::from_sources(
            file::ConfigFile::default(),
            None,
            env_from(&[("CHATTERBOX_MAX_TOKENS", "lots")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn legacy_discord_variable_accepted() {
        let config = Config::from_sources(
            file::ConfigFile::default(),
            None,
            env_from(&[("DISCORD_BOT_TOKEN", "abc"), ("OPENAI_API_KEY", "sk")]),
        )
        .unwrap();
        assert!(config.missing_bot_credentials().is_empty());
    }

    #[test]
    fn missing_credentials_listed() {
        let config = Config::from_sources(
            file::ConfigFile::default(),
            None,
            env_from(&[
                ("CHATTERBOX_STT_PROVIDER", "deepgram"),
                ("CHATTERBOX_TTS_PROVIDER", "elevenlabs"),
                ("OPENAI_API_KEY", ""),
            ]),
        )
        .unwrap();

        let missing = config.missing_bot_credentials();
        assert_eq!(
            missing,
            vec![
                "DISCORD_TOKEN",
                "OPENAI_API_KEY",
                "DEEPGRAM_API_KEY",
                "ELEVENLABS_API_KEY"
            ]
        );

        let err = Config::require(&missing).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN, OPENAI_API_KEY"));
    }

    #[test]
    fn persona_voice_overridable() {
        let config = Config::from_sources(
            file::ConfigFile::default(),
            None,
            env_from(&[("CHATTERBOX_VOICE", "Doug Melina")]),
        )
        .unwrap();
        assert_eq!(config.voice.voice, "Doug Melina");
    }
}
