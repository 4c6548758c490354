//! Voice receive for `listen` / `stop`
//!
//! Songbird hands us decoded 20ms frames per SSRC. While a recording is
//! active those frames are buffered; speaking-state updates tell us which
//! SSRC belongs to which Discord user so the command author's voice can be
//! picked out afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use songbird::events::context_data::VoiceTick;
use songbird::{Event, EventContext, EventHandler};
use tokio::sync::Mutex;

use crate::voice::audio::{DISCORD_CHANNELS, DISCORD_SAMPLE_RATE};

/// Longest recording kept, in seconds
pub const MAX_RECORDING_SECS: usize = 120;

const MAX_SAMPLES: usize =
    MAX_RECORDING_SECS * DISCORD_SAMPLE_RATE as usize * DISCORD_CHANNELS as usize;

/// Buffered audio for one recording
#[derive(Debug, Default)]
pub struct Recording {
    speaker: Option<u64>,
    listening: bool,
    ssrc_users: HashMap<u32, u64>,
    buffers: HashMap<u32, Vec<i16>>,
}

impl Recording {
    /// Begin recording, keeping `speaker`'s voice when it can be identified
    ///
    /// Returns `false` if a recording is already running.
    pub fn start(&mut self, speaker: Option<u64>) -> bool {
        if self.listening {
            return false;
        }
        self.listening = true;
        self.speaker = speaker;
        self.buffers.clear();
        true
    }

    /// Whether a recording is running
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Remember which user an SSRC belongs to
    pub fn map_speaker(&mut self, ssrc: u32, user: u64) {
        self.ssrc_users.insert(ssrc, user);
    }

    /// Append decoded interleaved stereo samples for an SSRC
    pub fn push(&mut self, ssrc: u32, samples: &[i16]) {
        if !self.listening || samples.is_empty() {
            return;
        }
        let buffer = self.buffers.entry(ssrc).or_default();
        let room = MAX_SAMPLES.saturating_sub(buffer.len());
        buffer.extend_from_slice(&samples[..samples.len().min(room)]);
    }

    /// End the recording and return the chosen speaker's audio
    ///
    /// Prefers the SSRCs mapped to the speaker; if none of them spoke, the
    /// longest buffer wins. `None` if not listening or nothing was heard.
    pub fn stop(&mut self) -> Option<Vec<i16>> {
        if !self.listening {
            return None;
        }
        self.listening = false;
        let mut buffers = std::mem::take(&mut self.buffers);

        if let Some(speaker) = self.speaker {
            let mut ssrcs: Vec<u32> = self
                .ssrc_users
                .iter()
                .filter(|&(_, &user)| user == speaker)
                .map(|(&ssrc, _)| ssrc)
                .collect();
            ssrcs.sort_unstable();

            let audio: Vec<i16> = ssrcs
                .iter()
                .filter_map(|ssrc| buffers.remove(ssrc))
                .flatten()
                .collect();
            if !audio.is_empty() {
                return Some(audio);
            }
        }

        buffers
            .into_values()
            .filter(|b| !b.is_empty())
            .max_by_key(Vec::len)
    }
}

/// Songbird event handler feeding a shared [`Recording`]
#[derive(Clone, Default)]
pub struct VoiceRecorder {
    recording: Arc<Mutex<Recording>>,
}

impl VoiceRecorder {
    /// Create an idle recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin recording; `false` if one is already running
    pub async fn start(&self, speaker: Option<u64>) -> bool {
        self.recording.lock().await.start(speaker)
    }

    /// Whether a recording is running
    pub async fn is_listening(&self) -> bool {
        self.recording.lock().await.is_listening()
    }

    /// End the recording and return the speaker's audio
    pub async fn stop(&self) -> Option<Vec<i16>> {
        self.recording.lock().await.stop()
    }
}

#[async_trait]
impl EventHandler for VoiceRecorder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(speaking) => {
                if let Some(user) = speaking.user_id {
                    tracing::debug!(ssrc = speaking.ssrc, user = user.0, "speaker mapped");
                    self.recording.lock().await.map_speaker(speaking.ssrc, user.0);
                }
            }
            EventContext::VoiceTick(VoiceTick { speaking, .. }) => {
                let mut recording = self.recording.lock().await;
                if !recording.is_listening() {
                    return None;
                }
                for (&ssrc, data) in speaking {
                    if let Some(decoded) = &data.decoded_voice {
                        recording.push(ssrc, decoded);
                    }
                }
            }
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_recording_ignores_audio() {
        let mut rec = Recording::default();
        rec.push(1, &[1, 2, 3]);
        assert_eq!(rec.stop(), None);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut rec = Recording::default();
        assert!(rec.start(None));
        assert!(!rec.start(None));
        assert!(rec.is_listening());
    }

    #[test]
    fn speaker_audio_preferred() {
        let mut rec = Recording::default();
        rec.map_speaker(10, 111);
        rec.map_speaker(20, 222);
        rec.start(Some(222));

        rec.push(10, &[1; 100]);
        rec.push(20, &[2; 4]);
        rec.push(20, &[3; 4]);

        assert_eq!(rec.stop(), Some(vec![2, 2, 2, 2, 3, 3, 3, 3]));
        assert!(!rec.is_listening());
    }

    #[test]
    fn unknown_speaker_falls_back_to_longest() {
        let mut rec = Recording::default();
        rec.start(Some(999));
        rec.push(1, &[1; 4]);
        rec.push(2, &[2; 8]);

        assert_eq!(rec.stop(), Some(vec![2; 8]));
    }

    #[test]
    fn nothing_heard_is_none() {
        let mut rec = Recording::default();
        rec.start(Some(1));
        assert_eq!(rec.stop(), None);
    }

    #[test]
    fn restart_clears_previous_audio() {
        let mut rec = Recording::default();
        rec.start(None);
        rec.push(1, &[1; 4]);
        rec.stop();

        rec.start(None);
        rec.push(1, &[7; 2]);
        assert_eq!(rec.stop(), Some(vec![7; 2]));
    }

    #[tokio::test]
    async fn recorder_shares_state() {
        let recorder = VoiceRecorder::new();
        let clone = recorder.clone();

        assert!(recorder.start(None).await);
        assert!(clone.is_listening().await);
        assert!(!clone.start(None).await);
        assert_eq!(clone.stop().await, None);
        assert!(!recorder.is_listening().await);
    }
}
