//! The audio autoplay gate.

use {
    crate::{audio::AudioOutput, session::PlayToken},
    tracing::{debug, warn},
};

/// Input events that count as a user gesture for autoplay purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// A story was opened.
    OpenStory,
    /// Click, tap or scroll.
    PointerDown,
    /// Touch on the fullscreen story.
    SurfaceTouch,
    /// Key press.
    Key,
}

/// Tracks the autoplay gate and the single pending playback retry.
#[derive(Debug, Default)]
pub struct UnlockManager {
    unlocked: bool,
    pending: Option<PlayToken>,
}

impl UnlockManager {
    /// Whether audio has been unlocked.
    pub const fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Session waiting to replay its rejected playback.
    pub const fn pending_retry(&self) -> Option<PlayToken> {
        self.pending
    }

    /// Remembers that playback for `token` was rejected. Only the latest
    /// rejection is kept.
    pub fn register_retry(&mut self, token: PlayToken) {
        if let Some(previous) = self.pending.replace(token) {
            debug!(previous = previous.get(), token = token.get(), "replacing pending playback retry");
        }
    }

    /// Handles a user gesture: unlocks the output the first time it succeeds,
    /// then hands back the pending retry, if any, for the caller to replay.
    /// The retry is consumed whether or not it is still current.
    pub fn on_gesture<A>(&mut self, gesture: Gesture, audio: &mut A) -> Option<PlayToken>
    where
        A: AudioOutput + ?Sized,
    {
        if !self.unlocked {
            match audio.unlock() {
                Ok(()) => {
                    debug!(?gesture, "audio unlocked");
                    self.unlocked = true;
                }
                Err(err) => warn!(?gesture, "audio unlock failed: {err}"),
            }
        }
        self.pending.take()
    }
}
