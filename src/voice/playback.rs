//! Audio playback
//!
//! [`Playback`] is the seam the pipeline speaks through: a Discord voice
//! connection in bot mode, the local speakers from the CLI.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::audio;
use crate::{Error, Result};

/// Plays a synthesized audio file somewhere a listener can hear it
#[async_trait]
pub trait Playback: Send + Sync {
    /// Play the file and return once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or played
    async fn play_file(&self, path: &Path) -> Result<()>;
}

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a new audio playback instance
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Play mono samples at the given rate
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    pub async fn play(&self, decoded: DecodedAudio) -> Result<()> {
        tokio::task::spawn_blocking(move || play_samples_blocking(decoded))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

#[async_trait]
impl Playback for AudioPlayback {
    async fn play_file(&self, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let decoded = decode_file(path, &bytes)?;
        tracing::debug!(
            path = %path.display(),
            samples = decoded.samples.len(),
            sample_rate = decoded.sample_rate,
            "playing file"
        );
        self.play(decoded).await
    }
}

/// Decode a WAV or MP3 file chosen by extension
///
/// # Errors
///
/// Returns error if the format is unknown or decoding fails
pub fn decode_file(path: &Path, bytes: &[u8]) -> Result<DecodedAudio> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => decode_wav(bytes),
        Some(ext) if ext.eq_ignore_ascii_case("mp3") => decode_mp3(bytes),
        _ => Err(Error::Audio(format!(
            "unsupported audio file: {}",
            path.display()
        ))),
    }
}

/// Decode WAV bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the WAV is malformed
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Int => {
            let pcm = reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?;
            audio::downmix(&pcm, spec.channels)
        }
        hound::SampleFormat::Float => {
            let raw = reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?;
            let channels = usize::from(spec.channels.max(1));
            #[allow(clippy::cast_precision_loss)]
            raw.chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if a frame cannot be decoded
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }
                let channels = u16::try_from(frame.channels).unwrap_or(1);
                samples.extend(audio::downmix(&frame.data, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Pick an output config for the rate, resampling when the device can't do it
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<(StreamConfig, u32)> {
    let rate = SampleRate(sample_rate);
    let matching = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(cpal::SupportedStreamConfigRange::channels);

    if let Some(range) = matching {
        return Ok((range.with_sample_rate(rate).config(), sample_rate));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    let device_rate = fallback.sample_rate().0;
    Ok((fallback.config(), device_rate))
}

fn play_samples_blocking(decoded: DecodedAudio) -> Result<()> {
    if decoded.samples.is_empty() || decoded.sample_rate == 0 {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let (config, device_rate) = output_config(&device, decoded.sample_rate)?;
    let samples = if device_rate == decoded.sample_rate {
        decoded.samples
    } else {
        audio::resample(&decoded.samples, decoded.sample_rate, device_rate)?
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = device_rate,
        channels = config.channels,
        "audio playback initialized"
    );

    let channels = usize::from(config.channels);
    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = position.load(Ordering::Relaxed);
                        let sample = if let Some(&s) = samples.get(pos) {
                            position.store(pos + 1, Ordering::Relaxed);
                            s
                        } else {
                            finished.store(true, Ordering::Relaxed);
                            0.0
                        };
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(device_rate);
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Let the device drain its buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}
