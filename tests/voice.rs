//! Voice component integration tests
//!
//! Tests voice components without requiring audio hardware or API keys

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use chatterbox::voice::{
    EspeakTts, Synthesizer, Transcriber, VoiceMap, audio, audio_file_name, decode_file,
};

mod common;

/// Generate interleaved stereo sine wave samples at the Discord rate
fn generate_stereo_sine(frequency: f32, duration_secs: f32) -> Vec<i16> {
    let rate = audio::DISCORD_SAMPLE_RATE as f32;
    let frames = (rate * duration_secs) as usize;
    (0..frames)
        .flat_map(|i| {
            let t = i as f32 / rate;
            let s = ((2.0 * std::f32::consts::PI * frequency * t).sin() * 8000.0) as i16;
            [s, s]
        })
        .collect()
}

#[test]
fn test_discord_pcm_to_wav() {
    let pcm = generate_stereo_sine(440.0, 0.25);
    let wav = audio::pcm_to_wav(&pcm, audio::DISCORD_CHANNELS, audio::DISCORD_SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, pcm.len());
}

#[test]
fn test_speech_wav_keeps_duration() {
    let pcm = generate_stereo_sine(440.0, 1.0);
    let wav = audio::wav_for_speech(&pcm, audio::DISCORD_CHANNELS, audio::DISCORD_SAMPLE_RATE, true)
        .unwrap();

    let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let secs = reader.len() as f32 / reader.spec().sample_rate as f32;
    assert!((secs - 1.0).abs() < 0.1, "duration was {secs}");
}

#[test]
fn test_synthesized_wav_decodes_for_playback() {
    let samples: Vec<f32> = (0..1600).map(|i| if i % 2 == 0 { 0.25 } else { -0.25 }).collect();
    let wav = audio::samples_to_wav(&samples, audio::SPEECH_SAMPLE_RATE).unwrap();

    let decoded = decode_file(&PathBuf::from("___Msg0123456789abcdef.wav"), &wav).unwrap();
    assert_eq!(decoded.sample_rate, audio::SPEECH_SAMPLE_RATE);
    assert_eq!(decoded.samples.len(), samples.len());
    assert!((decoded.samples[0] - 0.25).abs() < 0.001);
}

#[test]
fn test_voice_map_fallback() {
    let mut map = VoiceMap::espeak();
    map.extend(&HashMap::from([(
        "Pajama Sam".to_string(),
        "en-us+m2".to_string(),
    )]));

    assert_eq!(map.resolve("Pajama Sam"), "en-us+m2");
    assert_eq!(map.resolve("Pointboat"), "en+m4");
    assert_eq!(map.resolve("Nobody In Particular"), "en");
}

#[test]
fn test_audio_file_names_differ_by_text_and_format() {
    assert_ne!(audio_file_name("hi", "wav"), audio_file_name("hi", "mp3"));
    assert_ne!(audio_file_name("hi", "wav"), audio_file_name("ho", "wav"));
}

#[tokio::test]
async fn test_concurrent_same_text_gets_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let synthesizer = common::MockSynthesizer::new(dir.path());

    let (first, second) = tokio::join!(
        synthesizer.synthesize_to_file("Poggies!", "default"),
        synthesizer.synthesize_to_file("Poggies!", "default"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first, second);
    std::fs::remove_file(&first).unwrap();
    assert!(second.exists(), "removing one reply's audio must not remove the other");
}

#[tokio::test]
async fn test_espeak_missing_reports_tts_error() {
    let dir = tempfile::tempdir().unwrap();
    let tts = EspeakTts::with_binary(None, dir.path().to_path_buf());

    let err = tts.synthesize_to_file("hello", "default").await.unwrap_err();
    assert!(matches!(err, chatterbox::Error::Tts(_)));
    assert!(tts.list_voices().await.is_err());
}

#[tokio::test]
async fn test_transcribe_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("question.wav");
    let wav = audio::samples_to_wav(&[0.0; 320], audio::SPEECH_SAMPLE_RATE).unwrap();
    std::fs::write(&path, &wav).unwrap();

    let transcriber = common::MockTranscriber::hearing("what is darkness");
    let text = transcriber.transcribe_file(&path).await.unwrap();

    assert_eq!(text, "what is darkness");
    assert_eq!(transcriber.calls.lock().unwrap()[0], wav.len());
}

#[tokio::test]
async fn test_transcribe_missing_file_is_io_error() {
    let transcriber = common::MockTranscriber::hearing("unused");
    let err = transcriber
        .transcribe_file(&PathBuf::from("/nonexistent/question.wav"))
        .await
        .unwrap_err();
    assert!(matches!(err, chatterbox::Error::Io(_)));
}
