//! Microphone capture for the CLI
//!
//! Records from the default input device. Speech recognizers want 16kHz
//! mono, so when the device can't open at that rate it is opened at its own
//! rate and converted when the samples are taken.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::audio::{self, SPEECH_SAMPLE_RATE};
use crate::{Error, Result};

/// Records mono speech from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no input device is usable
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let config = input_config(&device)?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            samples: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Begin recording; a no-op while already recording
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));
        let samples = Arc::clone(&self.samples);

        #[allow(clippy::cast_precision_loss)]
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut samples) = samples.lock() else {
                        return;
                    };
                    if channels == 1 {
                        samples.extend_from_slice(data);
                    } else {
                        samples.extend(
                            data.chunks(channels)
                                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                        );
                    }
                },
                |err| tracing::error!(error = %err, "microphone error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        tracing::debug!("recording started");
        Ok(())
    }

    /// Stop recording, keeping what was captured
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("recording stopped");
        }
    }

    /// Whether the microphone is recording
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate of the samples returned by [`Self::take_speech`]
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SPEECH_SAMPLE_RATE
    }

    /// Rate the microphone was opened at
    #[must_use]
    pub const fn device_sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Device-rate mono samples captured so far, leaving them in place
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    /// Drop everything captured so far
    pub fn clear_buffer(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
    }

    /// Take the captured audio as 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns error if resampling fails
    pub fn take_speech(&self) -> Result<Vec<f32>> {
        let raw = self
            .samples
            .lock()
            .map(|mut samples| std::mem::take(&mut *samples))
            .unwrap_or_default();
        audio::resample(&raw, self.config.sample_rate.0, SPEECH_SAMPLE_RATE)
    }

    /// Record for a fixed duration and return 16kHz mono samples
    ///
    /// # Errors
    ///
    /// Returns error if recording cannot start or resampling fails
    #[allow(clippy::future_not_send)]
    pub async fn record_for(&mut self, duration: Duration) -> Result<Vec<f32>> {
        self.clear_buffer();
        self.start()?;
        tracing::info!(secs = duration.as_secs_f32(), "recording from microphone");

        tokio::time::sleep(duration).await;

        self.stop();
        let speech = self.take_speech()?;
        tracing::debug!(samples = speech.len(), "recording finished");
        Ok(speech)
    }
}

/// 16kHz mono when the device supports it, otherwise its default config
fn input_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SPEECH_SAMPLE_RATE);
    let speech = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate);

    if let Some(range) = speech {
        return Ok(range.with_sample_rate(rate).config());
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    if fallback.sample_format() != cpal::SampleFormat::F32 {
        return Err(Error::Audio(format!(
            "unsupported input sample format {:?}",
            fallback.sample_format()
        )));
    }
    Ok(fallback.config())
}

/// Root-mean-square energy of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
