//! Shared test utilities
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatterbox::voice::{Playback, Synthesizer, Transcriber};
use chatterbox::{ChatCompletion, Error, Overlay, Result, Turn};

/// Chat backend that replays scripted replies and records what it was sent
#[derive(Default)]
pub struct MockChat {
    replies: Mutex<Vec<Result<String>>>,
    pub requests: Mutex<Vec<Vec<Turn>>>,
}

impl MockChat {
    /// Backend answering with each reply in order
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| Ok((*r).to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Backend whose every call fails
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatCompletion for MockChat {
    async fn complete(&self, turns: &[Turn]) -> Result<Turn> {
        self.requests.lock().unwrap().push(turns.to_vec());
        match self.replies.lock().unwrap().pop() {
            Some(Ok(text)) => Ok(Turn::assistant(text)),
            Some(Err(e)) => Err(e),
            None => Err(Error::Llm("backend unavailable".to_string())),
        }
    }
}

/// Transcriber returning a fixed result
pub struct MockTranscriber {
    result: std::result::Result<String, String>,
    pub calls: Mutex<Vec<usize>>,
}

impl MockTranscriber {
    pub fn hearing(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err("speech service down".to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        self.calls.lock().unwrap().push(wav.len());
        self.result.clone().map_err(Error::Stt)
    }
}

/// Synthesizer writing a placeholder file into a directory
pub struct MockSynthesizer {
    dir: PathBuf,
    fail: bool,
    pub spoken: Mutex<Vec<(String, String)>>,
}

impl MockSynthesizer {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: false,
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: true,
            spoken: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize_to_file(&self, text: &str, voice: &str) -> Result<PathBuf> {
        if self.fail {
            return Err(Error::Tts("espeak not available".to_string()));
        }
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));

        let path = self.dir.join(chatterbox::voice::audio_file_name(text, "wav"));
        std::fs::write(&path, b"RIFF")?;
        Ok(path)
    }
}

/// Playback that records the files it was asked to play
#[derive(Default)]
pub struct MockPlayback {
    pub played: Mutex<Vec<PathBuf>>,
    pub existed: Mutex<Vec<bool>>,
    pub fail: bool,
}

#[async_trait]
impl Playback for MockPlayback {
    async fn play_file(&self, path: &Path) -> Result<()> {
        self.played.lock().unwrap().push(path.to_path_buf());
        self.existed.lock().unwrap().push(path.exists());
        if self.fail {
            return Err(Error::Voice("not connected".to_string()));
        }
        Ok(())
    }
}

/// Overlay that records every visibility change
#[derive(Default)]
pub struct MockOverlay {
    pub changes: Mutex<Vec<(String, String, bool)>>,
    pub fail: bool,
}

#[async_trait]
impl Overlay for MockOverlay {
    async fn set_source_visibility(&self, scene: &str, source: &str, visible: bool) -> Result<()> {
        self.changes
            .lock()
            .unwrap()
            .push((scene.to_string(), source.to_string(), visible));
        if self.fail {
            return Err(Error::Overlay("OBS not running".to_string()));
        }
        Ok(())
    }
}
