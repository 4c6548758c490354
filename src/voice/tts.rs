//! Text-to-speech (TTS) processing
//!
//! Every backend writes the synthesized speech to a file in the audio
//! directory and hands back its path; the caller plays and deletes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tokio::sync::Mutex;

use super::VoiceMap;
use crate::config::TtsProvider;
use crate::{Error, Result};

/// Produces a playable audio file from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` in the logical `voice` and return the file path
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unavailable or synthesis fails
    async fn synthesize_to_file(&self, text: &str, voice: &str) -> Result<PathBuf>;
}

static NEXT_AUDIO_FILE: AtomicU64 = AtomicU64::new(0);

/// File name for a synthesized message
///
/// Unique within the process, so concurrent replies with the same text never
/// share a file.
#[must_use]
pub fn audio_file_name(text: &str, extension: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let seq = NEXT_AUDIO_FILE.fetch_add(1, Ordering::Relaxed);
    format!("___Msg{}-{seq}.{extension}", &hex::encode(digest)[..16])
}

/// Speech synthesis through a local `espeak` binary
pub struct EspeakTts {
    binary: Option<PathBuf>,
    voices: VoiceMap,
    out_dir: PathBuf,
    speed: u32,
    pitch: u32,
    amplitude: u32,
    timeout: Duration,
}

impl EspeakTts {
    /// Locate `espeak` (or `espeak-ng`) on `PATH`
    ///
    /// A missing binary is not an error here; synthesis fails later and the
    /// caller carries on without audio.
    #[must_use]
    pub fn new(out_dir: PathBuf) -> Self {
        let binary = which::which("espeak")
            .or_else(|_| which::which("espeak-ng"))
            .ok();

        match &binary {
            Some(path) => tracing::info!(path = %path.display(), "espeak TTS initialized"),
            None => tracing::warn!("espeak not available, TTS will not work"),
        }

        Self::with_binary(binary, out_dir)
    }

    /// Use an explicit binary (or none)
    #[must_use]
    pub fn with_binary(binary: Option<PathBuf>, out_dir: PathBuf) -> Self {
        Self {
            binary,
            voices: VoiceMap::espeak(),
            out_dir,
            speed: 150,
            pitch: 50,
            amplitude: 100,
            timeout: Duration::from_secs(30),
        }
    }

    /// Add voice mappings on top of the built-in ones
    #[must_use]
    pub fn with_voices(mut self, extra: &HashMap<String, String>) -> Self {
        self.voices.extend(extra);
        self
    }

    /// Whether an espeak binary was found
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn binary(&self) -> Result<&Path> {
        self.binary
            .as_deref()
            .ok_or_else(|| Error::Tts("espeak not available".to_string()))
    }

    /// Command-line arguments for one synthesis
    ///
    /// Writes a WAV file when `out` is set, otherwise speaks aloud.
    #[must_use]
    pub fn args(&self, text: &str, voice: &str, out: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            self.voices.resolve(voice).to_string(),
            "-s".to_string(),
            self.speed.to_string(),
            "-p".to_string(),
            self.pitch.to_string(),
            "-a".to_string(),
            self.amplitude.to_string(),
        ];
        if let Some(path) = out {
            args.push("-w".to_string());
            args.push(path.display().to_string());
        }
        args.push(text.to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output> {
        let binary = self.binary()?;

        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::Tts("espeak timed out".to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!("espeak error: {}", stderr.trim())));
        }

        Ok(output)
    }

    /// Speak text through the default audio device without writing a file
    ///
    /// # Errors
    ///
    /// Returns error if espeak is unavailable or fails
    pub async fn speak_aloud(&self, text: &str, voice: &str) -> Result<()> {
        self.run(self.args(text, voice, None)).await?;
        Ok(())
    }

    /// List installed espeak voices (one line per voice, header skipped)
    ///
    /// # Errors
    ///
    /// Returns error if espeak is unavailable or fails
    pub async fn list_voices(&self) -> Result<Vec<String>> {
        let output = self.run(vec!["--voices".to_string()]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[async_trait]
impl Synthesizer for EspeakTts {
    async fn synthesize_to_file(&self, text: &str, voice: &str) -> Result<PathBuf> {
        let path = self.out_dir.join(audio_file_name(text, "wav"));
        self.run(self.args(text, voice, Some(&path))).await?;

        tracing::debug!(path = %path.display(), voice, "espeak audio saved");
        Ok(path)
    }
}

/// OpenAI voices usable directly as logical names
const OPENAI_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[derive(serde::Deserialize)]
struct ElevenLabsVoices {
    voices: Vec<ElevenLabsVoice>,
}

#[derive(serde::Deserialize)]
struct ElevenLabsVoice {
    voice_id: String,
    name: String,
}

/// Synthesizes speech through a hosted API (MP3 output)
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    speed: f32,
    model: String,
    provider: TtsProvider,
    out_dir: PathBuf,
    voice_ids: Mutex<HashMap<String, String>>,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(
        api_key: SecretString,
        model: String,
        speed: f32,
        out_dir: PathBuf,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            speed,
            model,
            provider: TtsProvider::OpenAi,
            out_dir,
            voice_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: SecretString, model: String, out_dir: PathBuf) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
            out_dir,
            voice_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text, voice).await,
            TtsProvider::OpenAi | TtsProvider::Espeak => self.synthesize_openai(text, voice).await,
        }
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: openai_voice(voice),
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Resolve an ElevenLabs voice name to its voice ID
    ///
    /// Names not in the account's voice list are used as IDs.
    async fn elevenlabs_voice_id(&self, voice: &str) -> Result<String> {
        let mut ids = self.voice_ids.lock().await;

        if ids.is_empty() {
            let response = self
                .client
                .get("https://api.elevenlabs.io/v1/voices")
                .header("xi-api-key", self.api_key.expose_secret())
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Tts(format!("ElevenLabs voices error {status}: {body}")));
            }

            let list: ElevenLabsVoices = response.json().await?;
            tracing::debug!(count = list.voices.len(), "loaded ElevenLabs voices");
            ids.extend(list.voices.into_iter().map(|v| (v.name, v.voice_id)));
        }

        Ok(ids.get(voice).cloned().unwrap_or_else(|| voice.to_string()))
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let voice_id = self.elevenlabs_voice_id(voice).await?;
        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}");

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// OpenAI voice for a logical name, `alloy` when it isn't an OpenAI voice
fn openai_voice(voice: &str) -> &str {
    OPENAI_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(voice))
        .copied()
        .unwrap_or("alloy")
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize_to_file(&self, text: &str, voice: &str) -> Result<PathBuf> {
        let audio = self.synthesize(text, voice).await?;
        let path = self.out_dir.join(audio_file_name(text, "mp3"));
        tokio::fs::write(&path, &audio).await?;

        tracing::debug!(path = %path.display(), bytes = audio.len(), "TTS audio saved");
        Ok(path)
    }
}
