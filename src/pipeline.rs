//! Voice and text turn pipeline
//!
//! Glues the collaborators together for one exchange: recorded audio or a
//! typed message goes in, a reply comes out in text and (optionally) speech.
//! Collaborator failures stop here and become something the user can read.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, SttProvider, TtsProvider};
use crate::overlay::{NoOverlay, ObsOverlay, Overlay};
use crate::persona::Persona;
use crate::session::Session;
use crate::voice::{EspeakTts, Playback, SpeechToText, Synthesizer, TextToSpeech, Transcriber, audio};
use crate::{Error, Result};

/// Reply sent when the chat backend fails
pub const APOLOGY: &str = "Uh oh! Something went wrong... This is rigged!";

/// What came of a recorded utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing intelligible was said
    NotUnderstood,
    /// The speech was transcribed and answered
    Heard { transcript: String, reply: String },
}

/// Transcription, synthesis and overlay collaborators for one persona
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    overlay: Arc<dyn Overlay>,
    persona: Persona,
    voice: String,
    scene: String,
    source: String,
    resample: bool,
}

impl Pipeline {
    /// Create a pipeline speaking in the persona's voice
    ///
    /// The overlay source defaults to the persona name.
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
        persona: Persona,
    ) -> Self {
        Self {
            transcriber,
            synthesizer,
            overlay: Arc::new(NoOverlay),
            voice: persona.voice.clone(),
            scene: String::new(),
            source: persona.name.clone(),
            persona,
            resample: true,
        }
    }

    /// Toggle `source` in `scene` while speaking
    #[must_use]
    pub fn with_overlay(
        mut self,
        overlay: Arc<dyn Overlay>,
        scene: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.overlay = overlay;
        self.scene = scene.into();
        self.source = source.into();
        self
    }

    /// Speak with a different logical voice
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Whether Discord audio is downmixed to 16kHz mono before STT
    #[must_use]
    pub const fn with_resample(mut self, resample: bool) -> Self {
        self.resample = resample;
        self
    }

    /// Build the configured STT, TTS and overlay backends
    ///
    /// # Errors
    ///
    /// Returns error if a required API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let transcriber = transcriber_from_config(config)?;
        let synthesizer = synthesizer_from_config(config)?;

        let mut pipeline = Self::new(transcriber, synthesizer, config.persona.clone())
            .with_voice(config.voice.voice.clone())
            .with_resample(config.voice.resample);

        if let Some(url) = &config.overlay.url {
            tracing::info!(url = %url, scene = %config.overlay.scene, "OBS overlay enabled");
            pipeline = pipeline.with_overlay(
                Arc::new(ObsOverlay::new(url.clone(), config.overlay.password.clone())),
                config.overlay.scene.clone(),
                config.overlay.source.clone(),
            );
        }

        Ok(pipeline)
    }

    /// The persona replies are attributed to
    #[must_use]
    pub const fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Logical voice used for speech
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Answer a typed message, apologizing if the backend fails
    pub async fn respond_text(&self, session: &mut Session, message: &str) -> String {
        match session.chat_with_history(message).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "chat completion failed");
                APOLOGY.to_string()
            }
        }
    }

    /// Transcribe interleaved PCM, returning an empty string on any failure
    pub async fn transcribe_recording(&self, pcm: &[i16], channels: u16, sample_rate: u32) -> String {
        let wav = match audio::wav_for_speech(pcm, channels, sample_rate, self.resample) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode recording");
                return String::new();
            }
        };

        tracing::debug!(
            secs = audio::duration_secs(pcm.len(), channels, sample_rate),
            wav_bytes = wav.len(),
            "transcribing recording"
        );

        match self.transcriber.transcribe(&wav).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                String::new()
            }
        }
    }

    /// Transcribe a recording and answer it
    pub async fn handle_recording(
        &self,
        session: &mut Session,
        pcm: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> TurnOutcome {
        let transcript = self.transcribe_recording(pcm, channels, sample_rate).await;
        if transcript.is_empty() {
            return TurnOutcome::NotUnderstood;
        }

        let reply = self.respond_text(session, &transcript).await;
        TurnOutcome::Heard { transcript, reply }
    }

    /// Say `text` through `playback` with the overlay source shown meanwhile
    ///
    /// The synthesized file is removed afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails; the overlay is hidden
    /// again either way
    pub async fn speak(&self, playback: &dyn Playback, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        self.set_overlay(true).await;
        let result = self.synthesize_and_play(playback, text).await;
        self.set_overlay(false).await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "could not speak reply");
        }
        result
    }

    async fn synthesize_and_play(&self, playback: &dyn Playback, text: &str) -> Result<()> {
        let path = self.synthesizer.synthesize_to_file(text, &self.voice).await?;
        let played = playback.play_file(&path).await;
        remove_audio_file(&path).await;
        played
    }

    async fn set_overlay(&self, visible: bool) {
        if let Err(e) = self
            .overlay
            .set_source_visibility(&self.scene, &self.source, visible)
            .await
        {
            tracing::debug!(error = %e, visible, "overlay update failed");
        }
    }

    /// Format a chat reply attributed to the persona
    #[must_use]
    pub fn format_reply(&self, text: &str) -> String {
        self.persona.format_reply(text)
    }
}

async fn remove_audio_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "failed to delete audio file");
    }
}

/// The configured speech recognizer
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn transcriber_from_config(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let key = match config.voice.stt_provider {
        SttProvider::Whisper => config.openai_key()?,
        SttProvider::Deepgram => config
            .api_keys
            .deepgram
            .clone()
            .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY is not set".to_string()))?,
    };

    Ok(Arc::new(SpeechToText::new(
        config.voice.stt_provider,
        key,
        config.voice.stt_model.clone(),
    )?))
}

/// The configured speech synthesizer
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn synthesizer_from_config(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    let out_dir = config.audio_dir.clone();
    Ok(match config.voice.tts_provider {
        TtsProvider::Espeak => {
            Arc::new(EspeakTts::new(out_dir).with_voices(&config.voice.espeak_voices))
        }
        TtsProvider::OpenAi => Arc::new(TextToSpeech::new_openai(
            config.openai_key()?,
            config.voice.tts_model.clone(),
            config.voice.tts_speed,
            out_dir,
        )?),
        TtsProvider::ElevenLabs => {
            let key = config
                .api_keys
                .elevenlabs
                .clone()
                .ok_or_else(|| Error::Config("ELEVENLABS_API_KEY is not set".to_string()))?;
            Arc::new(TextToSpeech::new_elevenlabs(
                key,
                config.voice.tts_model.clone(),
                out_dir,
            )?)
        }
    })
}
