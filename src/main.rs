use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatterbox::pipeline::{synthesizer_from_config, transcriber_from_config};
use chatterbox::voice::{
    AudioCapture, AudioPlayback, DecodedAudio, EspeakTts, Playback, VoiceMap, audio, rms,
};
use chatterbox::{ChatCompletion, Config, DiscordBot, OpenAiChat, Pipeline, Session};

/// Chatterbox - voice and text persona chatbot for Discord
#[derive(Parser)]
#[command(name = "chatterbox", version, about)]
struct Cli {
    /// Persona file (TOML); the built-in persona is used when omitted
    #[arg(short, long)]
    persona: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the persona in the terminal
    Chat {
        /// Speak each reply through the local speakers
        #[arg(long)]
        speak: bool,
    },
    /// Ask a single question without conversation history
    Ask {
        /// The question
        text: String,
    },
    /// Synthesize text and play it through the local speakers
    Say {
        /// Text to speak
        text: String,
    },
    /// Transcribe a WAV file, or the microphone when no file is given
    Transcribe {
        /// WAV file to transcribe
        file: Option<PathBuf>,
        /// Seconds to record from the microphone
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// List installed espeak voices and the logical voice mapping
    Voices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chatterbox=info",
        1 => "info,chatterbox=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let persona = cli.persona.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Chat { speak } => chat(persona, speak).await,
            Command::Ask { text } => ask(persona, &text).await,
            Command::Say { text } => say(persona, &text).await,
            Command::Transcribe { file, duration } => {
                transcribe(persona, file.as_deref(), duration).await
            }
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Voices => voices(persona).await,
        };
    }

    let config = Config::load(persona)?;
    Config::require(&config.missing_bot_credentials())?;

    tracing::info!(
        persona = %config.persona.name,
        llm = %config.llm.model,
        stt = ?config.voice.stt_provider,
        tts = ?config.voice.tts_provider,
        "starting chatterbox"
    );

    let completion: Arc<dyn ChatCompletion> = Arc::new(OpenAiChat::from_config(&config)?);
    let pipeline = Pipeline::from_config(&config)?;

    DiscordBot::new(config, pipeline, completion).run().await?;
    Ok(())
}

/// Read one line from the terminal without blocking the runtime
async fn read_line(prompt: &'static str) -> anyhow::Result<String> {
    let line = tokio::task::spawn_blocking(move || {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    })
    .await??;
    Ok(line)
}

/// Interactive terminal chat with history
async fn chat(persona: Option<&Path>, speak: bool) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let mut session = Session::from_config(&config, session_backend(&config)?);

    let pipeline = if speak {
        Config::require(&config.missing_model_credentials())?;
        Some(Pipeline::from_config(&config)?)
    } else {
        None
    };
    let playback = AudioPlayback::new();

    println!(
        "Chatting with {} (type 'exit' to quit, 'reset' to start over)\n",
        config.persona.name
    );

    loop {
        let line = read_line("You").await?;
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                session = Session::from_config(&config, session_backend(&config)?);
                println!("(conversation reset)\n");
                continue;
            }
            _ => {}
        }

        let reply = match session.chat_with_history(line).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "chat completion failed");
                chatterbox::APOLOGY.to_string()
            }
        };
        println!("\n{}: {reply}\n", config.persona.name);

        if let Some(pipeline) = &pipeline {
            if let Err(e) = pipeline.speak(&playback, &reply).await {
                tracing::debug!(error = %e, "reply not spoken");
            }
        }
    }

    Ok(())
}

fn session_backend(config: &Config) -> anyhow::Result<Arc<dyn ChatCompletion>> {
    Ok(Arc::new(OpenAiChat::from_config(config)?))
}

/// Ask one question without history
async fn ask(persona: Option<&Path>, text: &str) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let session = Session::new(
        &config.persona.prompt,
        config.budget,
        session_backend(&config)?,
    );

    let reply = session.chat_once(text).await?;
    println!("{reply}");
    Ok(())
}

/// Synthesize text and play it locally
async fn say(persona: Option<&Path>, text: &str) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let synthesizer = synthesizer_from_config(&config)?;

    println!("Synthesizing with voice '{}'...", config.voice.voice);
    let path = synthesizer
        .synthesize_to_file(text, &config.voice.voice)
        .await?;
    println!("Playing {}...", path.display());

    let played = AudioPlayback::new().play_file(&path).await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(path = %path.display(), error = %e, "failed to delete audio file");
    }
    played?;

    Ok(())
}

/// Transcribe a file or a short microphone recording
#[allow(clippy::future_not_send)]
async fn transcribe(
    persona: Option<&Path>,
    file: Option<&Path>,
    duration: u64,
) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let transcriber = transcriber_from_config(&config)?;

    let text = if let Some(path) = file {
        transcriber.transcribe_file(path).await?
    } else {
        println!("Recording for {duration} seconds... speak now!");
        let mut capture = AudioCapture::new()?;
        let samples = capture.record_for(Duration::from_secs(duration)).await?;
        let wav = audio::samples_to_wav(&samples, capture.sample_rate())?;
        transcriber.transcribe(&wav).await?
    };

    if text.is_empty() {
        println!("(no speech recognized)");
    } else {
        println!("{text}");
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.device_sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    AudioPlayback::new()
        .play(DecodedAudio {
            samples,
            sample_rate,
        })
        .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// List espeak voices and the logical names that map onto them
async fn voices(persona: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let espeak = EspeakTts::new(config.audio_dir.clone()).with_voices(&config.voice.espeak_voices);

    let mut map = VoiceMap::espeak();
    map.extend(&config.voice.espeak_voices);
    println!(
        "Persona voice '{}' -> espeak '{}'",
        config.voice.voice,
        map.resolve(&config.voice.voice)
    );

    if !espeak.is_available() {
        anyhow::bail!("espeak is not installed");
    }

    println!("\nInstalled espeak voices:");
    for voice in espeak.list_voices().await? {
        println!("  {voice}");
    }

    println!("\nTesting default voice...");
    espeak
        .speak_aloud(&format!("Hello! I am {}.", config.persona.name), &config.voice.voice)
        .await?;

    Ok(())
}
