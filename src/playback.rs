//! One narrated story at a time.
//!
//! Starting a story supersedes whatever was playing: the previous speech
//! request is cancelled, its highlight timers are aborted and the audio is
//! stopped before a new token is minted. Completions come back as
//! [`PlayerEvent`]s and are dropped unless they carry the current token.

use {
    crate::{
        audio::{AudioClip, AudioOutput, AudioSignal},
        config::{PlaybackConfig, SubtitleConfig, TimingPolicy},
        error::Result,
        event::PlayerEvent,
        library::Library,
        service::StoryService,
        session::{CancelHandle, PlayToken, TimerSet, TokenSource, cancel_pair},
        subtitle::SubtitleView,
        types::{Speech, StoryId, Timepoint},
        unlock::{Gesture, UnlockManager},
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::mpsc::UnboundedSender,
    tracing::{debug, info, warn},
};

/// Where the current session is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Nothing narrating.
    #[default]
    Idle,
    /// Waiting for the narration of `id`.
    Loading {
        /// Story being narrated.
        id: StoryId,
        /// Session the narration belongs to.
        token: PlayToken,
    },
    /// Narration is loaded and the subtitles are up.
    Playing {
        /// Story being narrated.
        id: StoryId,
        /// Session the narration belongs to.
        token: PlayToken,
    },
}

impl Phase {
    /// The story this session narrates. Library positions move when a batch
    /// is prepended, so sessions hold on to the id.
    pub const fn story(&self) -> Option<StoryId> {
        match *self {
            Self::Idle => None,
            Self::Loading { id, .. } | Self::Playing { id, .. } => Some(id),
        }
    }
}

/// Offsets at which each of `words` words is highlighted.
///
/// Literal service timepoints are only used when asked for and when there is
/// at least one per word; otherwise `duration` is split evenly.
pub fn highlight_offsets(
    policy: TimingPolicy,
    timepoints: &[Timepoint],
    duration: Duration,
    words: usize,
) -> Vec<Duration> {
    if policy == TimingPolicy::Timepoints && timepoints.len() >= words {
        return timepoints.iter().take(words).map(Timepoint::offset).collect();
    }

    let Ok(count) = u32::try_from(words) else {
        return Vec::new();
    };
    let per_word = duration.checked_div(count).unwrap_or_default();
    (0..count).map(|i| per_word.saturating_mul(i)).collect()
}

/// Owns the narration session, its subtitles and its timers.
pub struct PlaybackController {
    tokens: TokenSource,
    phase: Phase,
    speech: Option<CancelHandle>,
    timers: TimerSet,
    subtitle: Option<SubtitleView>,
    subtitle_visible: bool,
    surface_visible: bool,
    audio: Box<dyn AudioOutput>,
    /// Session whose clip is loaded in `audio`.
    audio_token: Option<PlayToken>,
    /// Session that still needs its highlights scheduled once the clip
    /// reports its duration.
    awaiting_metadata: Option<PlayToken>,
    unlock: UnlockManager,
    service: Arc<dyn StoryService>,
    events: UnboundedSender<PlayerEvent>,
    subtitles: SubtitleConfig,
    playback: PlaybackConfig,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("token", &self.tokens.current())
            .field("phase", &self.phase)
            .field("surface_visible", &self.surface_visible)
            .field("subtitle_visible", &self.subtitle_visible)
            .field("timers", &self.timers.pending())
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// A controller with nothing playing.
    pub fn new(
        service: Arc<dyn StoryService>,
        events: UnboundedSender<PlayerEvent>,
        audio: Box<dyn AudioOutput>,
        subtitles: SubtitleConfig,
        playback: PlaybackConfig,
    ) -> Self {
        Self {
            tokens: TokenSource::default(),
            phase: Phase::Idle,
            speech: None,
            timers: TimerSet::default(),
            subtitle: None,
            subtitle_visible: false,
            surface_visible: false,
            audio,
            audio_token: None,
            awaiting_metadata: None,
            unlock: UnlockManager::default(),
            service,
            events,
            subtitles,
            playback,
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Token of the latest session.
    pub const fn current_token(&self) -> PlayToken {
        self.tokens.current()
    }

    /// The fullscreen story is shown.
    pub const fn surface_visible(&self) -> bool {
        self.surface_visible
    }

    /// Subtitles are shown.
    pub const fn subtitle_visible(&self) -> bool {
        self.subtitle_visible
    }

    /// Narration is being fetched.
    pub const fn story_loader_visible(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    /// The subtitle units of the latest session, shown or not.
    pub const fn subtitle(&self) -> Option<&SubtitleView> {
        self.subtitle.as_ref()
    }

    /// Highlight timers still pending.
    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    /// The audio unlock state.
    pub const fn unlock(&self) -> &UnlockManager {
        &self.unlock
    }

    /// Shows the story `id` fullscreen and starts narrating it.
    pub fn open_story(&mut self, library: &mut Library, id: StoryId) -> bool {
        let Some(index) = library.position(id) else {
            debug!(%id, "cannot open unknown story");
            return false;
        };
        library.set_current(index);
        self.surface_visible = true;
        // the story being left must not pick up the gesture's retry
        self.stop();
        self.gesture(Gesture::OpenStory);
        self.request_current(library);
        true
    }

    /// Narrates the current story, or the first playable one after it.
    pub fn play_current(&mut self, library: &mut Library) {
        self.stop();
        self.request_current(library);
    }

    fn request_current(&mut self, library: &mut Library) {
        let Some(index) = library.first_playable_from(library.current()) else {
            warn!("no playable story left, closing");
            self.close();
            return;
        };
        library.set_current(index);

        let Some(record) = library.get(index) else {
            return;
        };
        let id = record.id;
        let text = record.story.clone();
        let token = self.tokens.mint();
        let (handle, signal) = cancel_pair();
        self.speech = Some(handle);
        self.phase = Phase::Loading { id, token };
        debug!(token = token.get(), index, %id, "requesting narration");

        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = signal.guard(service.generate_speech(&text)).await;
            let _ = events.send(PlayerEvent::Speech { token, result });
        });
    }

    /// Applies a finished speech request.
    pub fn handle_speech(&mut self, library: &mut Library, token: PlayToken, result: Result<Speech>) {
        if !self.tokens.is_current(token) {
            debug!(token = token.get(), "discarding superseded narration");
            return;
        }
        let Phase::Loading { id, .. } = self.phase else {
            return;
        };
        self.speech = None;

        match result {
            Ok(speech) => self.begin(library, id, token, speech),
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                warn!(%id, "narration failed: {err}");
                self.recover(library, id);
            }
        }
    }

    fn begin(&mut self, library: &mut Library, id: StoryId, token: PlayToken, speech: Speech) {
        let Some(record) = library.position(id).and_then(|index| library.get(index)) else {
            warn!(%id, "narrated story is no longer loaded");
            self.stop();
            return;
        };
        let subtitle = SubtitleView::build(token, &record.story, &self.subtitles);

        if let Err(err) = self.audio.load(AudioClip { bytes: speech.audio }) {
            warn!(%id, "cannot load narration: {err}");
            self.recover(library, id);
            return;
        }
        debug!(token = token.get(), %id, words = subtitle.word_count(), cached = speech.cached, "narration ready");

        self.audio_token = Some(token);
        self.subtitle = Some(subtitle);
        self.subtitle_visible = true;
        self.phase = Phase::Playing { id, token };
        self.start_audio(token);

        if speech.timepoints.is_empty() {
            self.awaiting_metadata = Some(token);
        } else {
            let duration = self.audio.duration();
            self.schedule(token, &speech.timepoints, duration);
        }
    }

    /// Marks `id` unplayable and moves on to the first playable story,
    /// closing when there is none.
    fn recover(&mut self, library: &mut Library, id: StoryId) {
        if let Some(index) = library.position(id) {
            library.mark_unplayable(index);
        }
        match library.first_playable_from(0) {
            Some(next) => {
                library.set_current(next);
                self.play_current(library);
            }
            None => {
                warn!("no playable story left, closing");
                self.close();
            }
        }
    }

    fn start_audio(&mut self, token: PlayToken) {
        match self.audio.play() {
            Ok(()) => debug!(token = token.get(), "narration started"),
            Err(rejected) => {
                info!(token = token.get(), "playback rejected ({rejected}), waiting for a gesture");
                self.unlock.register_retry(token);
            }
        }
    }

    fn schedule(&mut self, token: PlayToken, timepoints: &[Timepoint], duration: Option<Duration>) {
        let Some(subtitle) = &self.subtitle else {
            return;
        };
        let duration = duration.unwrap_or_else(|| self.playback.fallback_duration());
        let offsets = highlight_offsets(self.playback.timing, timepoints, duration, subtitle.word_count());

        for (word, delay) in offsets.into_iter().enumerate() {
            self.timers.schedule(delay, &self.events, PlayerEvent::Highlight { token, word });
        }
    }

    /// Applies a highlight timer. Returns whether anything changed.
    pub fn handle_highlight(&mut self, token: PlayToken, word: usize) -> bool {
        if !self.tokens.is_current(token) {
            return false;
        }
        self.subtitle
            .as_mut()
            .is_some_and(|subtitle| subtitle.highlight_word(token, word))
    }

    /// Drains lifecycle signals from the audio output.
    pub fn tick(&mut self) {
        while let Some(signal) = self.audio.poll() {
            let Some(token) = self.audio_token.filter(|t| self.tokens.is_current(*t)) else {
                continue;
            };
            match signal {
                AudioSignal::MetadataLoaded(duration) => {
                    if self.awaiting_metadata.take() == Some(token) {
                        self.schedule(token, &[], duration);
                    }
                }
                AudioSignal::Ended => self.finish(),
            }
        }
    }

    /// Narration reached its end: the subtitles go away, the story stays.
    fn finish(&mut self) {
        debug!(token = self.tokens.current().get(), "narration ended");
        self.timers.clear();
        if let Some(subtitle) = &mut self.subtitle {
            subtitle.reset();
        }
        self.subtitle_visible = false;
        self.audio_token = None;
        self.awaiting_metadata = None;
        self.phase = Phase::Idle;
    }

    /// Feeds a user gesture to the unlock gate and replays a rejected
    /// playback if it still belongs to the current session.
    pub fn gesture(&mut self, gesture: Gesture) {
        let Some(token) = self.unlock.on_gesture(gesture, self.audio.as_mut()) else {
            return;
        };
        if self.tokens.is_current(token) && self.audio_token == Some(token) {
            debug!(token = token.get(), "retrying playback");
            self.start_audio(token);
        } else {
            debug!(token = token.get(), "dropping superseded playback retry");
        }
    }

    /// Aborts the current session. Anything still in flight for it becomes
    /// stale.
    pub fn stop(&mut self) {
        if let Some(handle) = self.speech.take() {
            handle.cancel();
        }
        self.timers.clear();
        self.audio.stop();
        self.audio_token = None;
        self.awaiting_metadata = None;
        if let Some(subtitle) = &mut self.subtitle {
            subtitle.reset();
        }
        self.subtitle_visible = false;
        self.phase = Phase::Idle;
        self.tokens.mint();
    }

    /// Stops and leaves fullscreen.
    pub fn close(&mut self) {
        self.stop();
        self.surface_visible = false;
    }
}
