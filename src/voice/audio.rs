//! PCM and WAV helpers
//!
//! Discord delivers interleaved 16-bit stereo at 48kHz. Speech APIs accept
//! that as a WAV file, but a 16kHz mono upload is a third of the size.

use crate::{Error, Result};

/// Discord voice sample rate
pub const DISCORD_SAMPLE_RATE: u32 = 48_000;

/// Discord voice channel count
pub const DISCORD_CHANNELS: u16 = 2;

/// Sample rate preferred by speech recognizers
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Encode interleaved 16-bit PCM as WAV bytes
///
/// # Errors
///
/// Returns error if encoding fails
pub fn pcm_to_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Encode mono f32 samples in [-1.0, 1.0] as 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    #[allow(clippy::cast_possible_truncation)]
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect();
    pcm_to_wav(&pcm, 1, sample_rate)
}

/// Average interleaved 16-bit channels into mono f32 samples
#[must_use]
pub fn downmix(samples: &[i16], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    #[allow(clippy::cast_precision_loss)]
    let scale = channels as f32 * 32768.0;

    samples
        .chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from(s)).sum::<f32>() / scale)
        .collect()
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize);

    for chunk in samples.chunks(chunk_size) {
        let input = [chunk];
        let result = if chunk.len() == chunk_size {
            resampler.process(&input[..], None)
        } else {
            resampler.process_partial(Some(&input[..]), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}

/// WAV bytes ready for a speech recognizer
///
/// With `resample_audio` set the audio is downmixed and converted to 16kHz mono,
/// otherwise it's wrapped as-is.
///
/// # Errors
///
/// Returns error if conversion fails
pub fn wav_for_speech(
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
    resample_audio: bool,
) -> Result<Vec<u8>> {
    if !resample_audio {
        return pcm_to_wav(samples, channels, sample_rate);
    }

    let mono = downmix(samples, channels);
    let converted = resample(&mono, sample_rate, SPEECH_SAMPLE_RATE)?;
    samples_to_wav(&converted, SPEECH_SAMPLE_RATE)
}

/// Duration in seconds of interleaved PCM
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_secs(sample_count: usize, channels: u16, sample_rate: u32) -> f32 {
    let frames = sample_count / usize::from(channels.max(1));
    frames as f32 / sample_rate as f32
}
