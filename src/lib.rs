//! Chatterbox - voice and text persona chatbot for Discord
//!
//! This library provides the core functionality for the bot:
//! - A token-budgeted conversation transcript
//! - Chat sessions against an OpenAI-compatible backend
//! - Voice processing (STT, TTS, audio plumbing)
//! - Discord text commands and voice channel receive/playback
//! - An optional OBS overlay toggled while the persona speaks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        Discord (serenity + songbird)  │  CLI         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Pipeline                          │
//! │   STT  │  Session  │  TTS  │  Playback  │  Overlay  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │             ConversationBuffer                       │
//! │   system prompt  │  turns  │  token budget           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod discord;
pub mod error;
pub mod llm;
pub mod overlay;
pub mod persona;
pub mod pipeline;
pub mod session;
pub mod voice;

pub use config::Config;
pub use conversation::{ConversationBuffer, Role, TokenBudget, Turn};
pub use discord::DiscordBot;
pub use error::{Error, Result};
pub use llm::{ChatCompletion, OpenAiChat};
pub use overlay::{NoOverlay, ObsOverlay, Overlay};
pub use persona::Persona;
pub use pipeline::{APOLOGY, Pipeline, TurnOutcome};
pub use session::Session;
