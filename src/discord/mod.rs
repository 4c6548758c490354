//! Discord bot using serenity and songbird
//!
//! Text commands drive everything. Each guild gets its own conversation
//! session and, while the bot sits in one of its voice channels, its own
//! voice recorder.

mod commands;
mod playback;
mod recorder;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serenity::Client;
use serenity::all::{
    ChannelId, Context, EventHandler, GatewayIntents, GuildId, Mentionable, Message, Ready,
    UserId,
};
use songbird::driver::DecodeMode;
use songbird::{CoreEvent, Event, SerenityInit, Songbird};
use tokio::sync::Mutex;

pub use commands::{Command, help_lines, voice_help};
pub use playback::SongbirdPlayback;
pub use recorder::{MAX_RECORDING_SECS, Recording, VoiceRecorder};

use crate::config::Config;
use crate::llm::ChatCompletion;
use crate::pipeline::{Pipeline, TurnOutcome};
use crate::session::Session;
use crate::voice::audio::{DISCORD_CHANNELS, DISCORD_SAMPLE_RATE};
use crate::{Error, Result};

/// Replies sent back to the text channel
pub mod replies {
    pub const NOT_IN_VOICE_USER: &str = "🔊 You need to be in a voice channel for me to join!";
    pub const NOT_IN_VOICE_BOT: &str = "I'm not in a voice channel!";
    pub const ALREADY_LISTENING: &str = "I'm already listening!";
    pub const NOT_LISTENING: &str = "I'm not currently listening!";
    pub const NO_AUDIO: &str = "No audio was recorded!";
    pub const NOT_UNDERSTOOD: &str = "I couldn't understand what you said. Please try again!";
    pub const STOPPED: &str = "🛑 Stopped listening, processing your message...";
    pub const RESET: &str = "🧹 Fresh start! I forgot everything we talked about.";
}

/// The Discord side of the bot
pub struct DiscordBot {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    completion: Arc<dyn ChatCompletion>,
}

impl DiscordBot {
    /// Create a bot around a pipeline and chat backend
    #[must_use]
    pub fn new(config: Config, pipeline: Pipeline, completion: Arc<dyn ChatCompletion>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            completion,
        }
    }

    /// Connect to Discord and handle events until the gateway shuts down
    ///
    /// # Errors
    ///
    /// Returns error if the token is missing or the client fails
    pub async fn run(self) -> Result<()> {
        let token = self
            .config
            .api_keys
            .discord
            .clone()
            .ok_or_else(|| Error::Config("DISCORD_TOKEN is not set".to_string()))?;

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_VOICE_STATES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = BotHandler {
            config: self.config,
            pipeline: self.pipeline,
            completion: self.completion,
            sessions: Mutex::new(HashMap::new()),
            recorders: Mutex::new(HashMap::new()),
        };

        let songbird_config = songbird::Config::default().decode_mode(DecodeMode::Decode);

        let mut client = Client::builder(token.expose_secret(), intents)
            .event_handler(handler)
            .register_songbird_from_config(songbird_config)
            .await
            .map_err(|e| Error::Channel(format!("Discord client error: {e}")))?;

        tracing::info!("connecting to Discord");
        client
            .start()
            .await
            .map_err(|e| Error::Channel(format!("Discord client error: {e}")))
    }
}

/// Discord event handler
struct BotHandler {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    completion: Arc<dyn ChatCompletion>,
    sessions: Mutex<HashMap<GuildId, Arc<Mutex<Session>>>>,
    recorders: Mutex<HashMap<GuildId, VoiceRecorder>>,
}

impl BotHandler {
    fn new_session(&self) -> Session {
        Session::from_config(&self.config, Arc::clone(&self.completion))
    }

    async fn session(&self, guild: GuildId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(guild).or_insert_with(|| {
            tracing::debug!(guild = %guild, "new conversation session");
            Arc::new(Mutex::new(self.new_session()))
        });
        Arc::clone(session)
    }

    async fn reset_session(&self, guild: GuildId) {
        let session = self.session(guild).await;
        *session.lock().await = self.new_session();
        tracing::info!(guild = %guild, "conversation reset");
    }

    fn prefix(&self) -> &str {
        &self.config.discord.command_prefix
    }

    fn persona_name(&self) -> &str {
        &self.pipeline.persona().name
    }

    async fn handle_command(
        &self,
        ctx: &Context,
        msg: &Message,
        guild: GuildId,
        command: Command,
    ) -> Result<()> {
        match command {
            Command::Join => self.join(ctx, msg, guild).await,
            Command::Leave => self.leave(ctx, msg, guild).await,
            Command::Talk(text) => self.talk(ctx, msg, guild, &text).await,
            Command::Listen => self.listen(ctx, msg, guild).await,
            Command::Stop => self.stop(ctx, msg, guild).await,
            Command::Voice => {
                say(ctx, msg.channel_id, &voice_help(self.prefix(), self.persona_name())).await
            }
            Command::Reset => {
                self.reset_session(guild).await;
                say(ctx, msg.channel_id, replies::RESET).await
            }
            Command::Help => say(ctx, msg.channel_id, &help_lines(self.prefix()).join("\n")).await,
        }
    }

    async fn join(&self, ctx: &Context, msg: &Message, guild: GuildId) -> Result<()> {
        let Some(channel) = author_voice_channel(ctx, guild, msg.author.id) else {
            return say(ctx, msg.channel_id, replies::NOT_IN_VOICE_USER).await;
        };

        let manager = songbird_manager(ctx).await?;
        let call = manager
            .join(guild, channel)
            .await
            .map_err(|e| Error::Voice(format!("failed to join voice channel: {e}")))?;

        let mut recorders = self.recorders.lock().await;
        if !recorders.contains_key(&guild) {
            let recorder = VoiceRecorder::new();
            let mut call = call.lock().await;
            call.add_global_event(Event::Core(CoreEvent::SpeakingStateUpdate), recorder.clone());
            call.add_global_event(Event::Core(CoreEvent::VoiceTick), recorder.clone());
            recorders.insert(guild, recorder);
        }
        drop(recorders);

        tracing::info!(guild = %guild, channel = %channel, "joined voice channel");
        let prefix = self.prefix();
        say(
            ctx,
            msg.channel_id,
            &format!(
                "🎭 **{} joined {}!**\nUse `{prefix}talk <message>` to chat with me or `{prefix}listen` for voice conversation!",
                self.persona_name(),
                channel.mention(),
            ),
        )
        .await
    }

    async fn leave(&self, ctx: &Context, msg: &Message, guild: GuildId) -> Result<()> {
        let manager = songbird_manager(ctx).await?;
        if manager.get(guild).is_none() {
            return say(ctx, msg.channel_id, replies::NOT_IN_VOICE_BOT).await;
        }

        manager
            .remove(guild)
            .await
            .map_err(|e| Error::Voice(format!("failed to leave voice channel: {e}")))?;
        self.recorders.lock().await.remove(&guild);

        tracing::info!(guild = %guild, "left voice channel");
        say(
            ctx,
            msg.channel_id,
            &format!("👋 {} left the voice channel! Babaga-BOOSH!", self.persona_name()),
        )
        .await
    }

    async fn talk(&self, ctx: &Context, msg: &Message, guild: GuildId, text: &str) -> Result<()> {
        if text.is_empty() {
            return say(
                ctx,
                msg.channel_id,
                &format!("Usage: `{}talk <message>`", self.prefix()),
            )
            .await;
        }

        let typing = msg.channel_id.start_typing(&ctx.http);
        let session = self.session(guild).await;
        let mut session = session.lock().await;

        let reply = self.pipeline.respond_text(&mut session, text).await;
        say(ctx, msg.channel_id, &self.pipeline.format_reply(&reply)).await?;
        typing.stop();

        self.speak_in_voice(ctx, guild, &reply).await;
        Ok(())
    }

    async fn listen(&self, ctx: &Context, msg: &Message, guild: GuildId) -> Result<()> {
        let Some(recorder) = self.recorders.lock().await.get(&guild).cloned() else {
            return say(
                ctx,
                msg.channel_id,
                &format!("🔊 I need to be in a voice channel first! Use `{}join`", self.prefix()),
            )
            .await;
        };

        if !recorder.start(Some(msg.author.id.get())).await {
            return say(ctx, msg.channel_id, replies::ALREADY_LISTENING).await;
        }

        tracing::info!(guild = %guild, user = %msg.author.id, "listening");
        say(
            ctx,
            msg.channel_id,
            &format!("🎤 Listening... Speak now! Use `{}stop` when you're done.", self.prefix()),
        )
        .await
    }

    async fn stop(&self, ctx: &Context, msg: &Message, guild: GuildId) -> Result<()> {
        let recorder = self.recorders.lock().await.get(&guild).cloned();
        let listening = match &recorder {
            Some(recorder) => recorder.is_listening().await,
            None => false,
        };
        let Some(recorder) = recorder.filter(|_| listening) else {
            return say(ctx, msg.channel_id, replies::NOT_LISTENING).await;
        };

        say(ctx, msg.channel_id, replies::STOPPED).await?;
        let Some(pcm) = recorder.stop().await else {
            return say(ctx, msg.channel_id, replies::NO_AUDIO).await;
        };
        tracing::info!(guild = %guild, samples = pcm.len(), "recording stopped");

        let typing = msg.channel_id.start_typing(&ctx.http);
        let session = self.session(guild).await;
        let mut session = session.lock().await;

        let outcome = self
            .pipeline
            .handle_recording(&mut session, &pcm, DISCORD_CHANNELS, DISCORD_SAMPLE_RATE)
            .await;
        typing.stop();

        match outcome {
            TurnOutcome::NotUnderstood => say(ctx, msg.channel_id, replies::NOT_UNDERSTOOD).await,
            TurnOutcome::Heard { transcript, reply } => {
                say(ctx, msg.channel_id, &format!("I heard: *{transcript}*")).await?;
                say(ctx, msg.channel_id, &self.pipeline.format_reply(&reply)).await?;
                self.speak_in_voice(ctx, guild, &reply).await;
                Ok(())
            }
        }
    }

    /// Speak in the guild's voice call, if the bot is in one
    async fn speak_in_voice(&self, ctx: &Context, guild: GuildId, text: &str) {
        let Some(manager) = songbird::get(ctx).await else {
            return;
        };
        let Some(call) = manager.get(guild) else {
            return;
        };

        let playback = SongbirdPlayback::new(call);
        if let Err(e) = self.pipeline.speak(&playback, text).await {
            tracing::warn!(guild = %guild, error = %e, "could not speak in voice channel");
        }
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            persona = %self.persona_name(),
            guilds = ready.guilds.len(),
            "Discord bot ready"
        );
        for line in help_lines(self.prefix()) {
            tracing::info!("{line}");
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(self.prefix(), &msg.content) else {
            return;
        };

        tracing::debug!(
            guild = %guild,
            author = %msg.author.name,
            command = ?command,
            "command received"
        );

        if let Err(e) = self.handle_command(&ctx, &msg, guild, command).await {
            tracing::error!(guild = %guild, error = %e, "command failed");
        }
    }
}

/// The voice channel the user is currently in, from the guild cache
fn author_voice_channel(ctx: &Context, guild: GuildId, user: UserId) -> Option<ChannelId> {
    let guild = guild.to_guild_cached(&ctx.cache)?;
    guild.voice_states.get(&user).and_then(|state| state.channel_id)
}

async fn songbird_manager(ctx: &Context) -> Result<Arc<Songbird>> {
    songbird::get(ctx)
        .await
        .ok_or_else(|| Error::Voice("songbird voice client not registered".to_string()))
}

async fn say(ctx: &Context, channel: ChannelId, text: &str) -> Result<()> {
    channel
        .say(&ctx.http, text)
        .await
        .map_err(|e| Error::Channel(format!("Discord send error: {e}")))?;
    Ok(())
}
