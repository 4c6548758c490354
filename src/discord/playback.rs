//! Playback into a Discord voice call

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::input::File as FileInput;
use songbird::{Call, Event, EventContext, EventHandler, TrackEvent};
use tokio::sync::{Mutex, Notify};

use crate::voice::Playback;
use crate::{Error, Result};

/// Give up waiting for a track after this long
const MAX_PLAYBACK: Duration = Duration::from_secs(300);

/// Plays files into a songbird call
pub struct SongbirdPlayback {
    call: Arc<Mutex<Call>>,
}

impl SongbirdPlayback {
    /// Play into an existing call
    #[must_use]
    pub const fn new(call: Arc<Mutex<Call>>) -> Self {
        Self { call }
    }
}

/// Wakes the waiting speaker when the track ends
struct TrackDone(Arc<Notify>);

#[async_trait]
impl EventHandler for TrackDone {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in *tracks {
                tracing::debug!(playing = ?state.playing, "voice track finished");
            }
        }
        self.0.notify_one();
        None
    }
}

#[async_trait]
impl Playback for SongbirdPlayback {
    async fn play_file(&self, path: &Path) -> Result<()> {
        let done = Arc::new(Notify::new());

        {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(Error::Voice("not connected to a voice channel".to_string()));
            }

            let handle = call.play_input(FileInput::new(path.to_path_buf()).into());
            for event in [TrackEvent::End, TrackEvent::Error] {
                handle
                    .add_event(Event::Track(event), TrackDone(Arc::clone(&done)))
                    .map_err(|e| Error::Voice(format!("track event registration failed: {e}")))?;
            }
        }

        tracing::debug!(path = %path.display(), "playing in voice channel");
        tokio::time::timeout(MAX_PLAYBACK, done.notified())
            .await
            .map_err(|_| Error::Voice("playback did not finish".to_string()))
    }
}
