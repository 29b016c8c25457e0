//! The story player: gallery, library, playback and navigation behind one
//! owner.
//!
//! Background work (batch loads, speech requests, highlight timers) runs on
//! tokio tasks that report back through the channel returned by
//! [`Player::new`]. The front-end forwards every received event to
//! [`Player::handle`] and calls [`Player::tick`] once per frame.

use {
    crate::{
        audio::AudioOutput,
        config::{Config, EndOfListPolicy},
        event::{BatchOutcome, ChannelGallery, GalleryUpdate, PlayerEvent},
        feed::{Feed, LOAD_FAILED_MESSAGE, LoadStatus},
        library::Library,
        loader::{self, GallerySink, InsertMode, LoadRequest, UsedPrompts},
        navigation::{NavIntent, NavKey, NavThrottle, SwipeTracker, is_batch_tail, key_intent, wheel_intent},
        playback::PlaybackController,
        service::StoryService,
        types::{IdSource, StoryId},
        unlock::Gesture,
    },
    std::{sync::Arc, time::Instant},
    tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    tracing::{debug, info, warn},
};

/// Raw input, already translated out of the front-end's event types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// A navigation key.
    Key(NavKey),
    /// Scroll; positive is down.
    Wheel {
        /// Vertical scroll delta.
        delta_y: f32,
    },
    /// Start of a touch or drag.
    TouchStart {
        /// Vertical position, in pixels.
        y: f32,
    },
    /// End of a touch or drag.
    TouchEnd {
        /// Vertical position, in pixels.
        y: f32,
    },
    /// Click or tap anywhere.
    PointerDown,
}

/// Prompt bookkeeping is lent to a load task for as long as it runs, which
/// makes loading single-flight.
#[derive(Debug)]
enum Loader {
    Ready { used: UsedPrompts, ids: IdSource },
    Busy,
}

/// Gallery, library and playback behind a single owner.
pub struct Player {
    config: Config,
    service: Arc<dyn StoryService>,
    events: UnboundedSender<PlayerEvent>,
    library: Library,
    feed: Feed,
    loader: Loader,
    /// An advance is waiting for the batch it triggered.
    pending_advance: bool,
    playback: PlaybackController,
    throttle: NavThrottle,
    swipe: SwipeTracker,
}

impl Player {
    /// Returns the player and the receiver its background work reports to.
    pub fn new(
        config: Config,
        service: Arc<dyn StoryService>,
        audio: Box<dyn AudioOutput>,
    ) -> (Self, UnboundedReceiver<PlayerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let playback = PlaybackController::new(
            Arc::clone(&service),
            events.clone(),
            audio,
            config.subtitles.clone(),
            config.playback.clone(),
        );

        let player = Self {
            throttle: NavThrottle::new(config.navigation.cooldown()),
            swipe: SwipeTracker::new(config.navigation.swipe_threshold),
            config,
            service,
            events,
            library: Library::default(),
            feed: Feed::default(),
            loader: Loader::Ready {
                used: UsedPrompts::default(),
                ids: IdSource::default(),
            },
            pending_advance: false,
            playback,
        };
        (player, rx)
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Loaded stories in playback order.
    pub const fn library(&self) -> &Library {
        &self.library
    }

    /// Gallery state.
    pub const fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Narration state.
    pub const fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// Whether a batch load is running.
    pub const fn is_loading(&self) -> bool {
        matches!(self.loader, Loader::Busy)
    }

    /// Prompts shown so far, unless a load currently holds them.
    pub const fn used_prompts(&self) -> Option<&UsedPrompts> {
        match &self.loader {
            Loader::Ready { used, .. } => Some(used),
            Loader::Busy => None,
        }
    }

    /// Starts loading a batch in the background. Returns `false` if a load is
    /// already running.
    pub fn load_batch(&mut self, request: LoadRequest) -> bool {
        let Loader::Ready { mut used, mut ids } = std::mem::replace(&mut self.loader, Loader::Busy) else {
            debug!("batch load already in flight");
            return false;
        };
        info!(insert = ?request.insert, refresh = request.force_refresh, "loading story batch");
        self.feed.set_status(LoadStatus::Loading);

        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let limits = self.config.batch.clone();
        tokio::spawn(async move {
            let mut gallery = ChannelGallery(events.clone());
            let result = loader::load_batch(service.as_ref(), &mut used, &mut ids, &mut gallery, request, &limits).await;
            let _ = events.send(PlayerEvent::BatchFinished(Box::new(BatchOutcome { used, ids, result })));
        });
        true
    }

    /// Appends a batch when the gallery selection reaches the last tile.
    pub fn prefetch_if_at_end(&mut self, selected: usize) -> bool {
        if self.is_loading() || selected.saturating_add(1) < self.feed.len() {
            return false;
        }
        self.load_batch(LoadRequest::append())
    }

    /// Applies a background completion.
    pub fn handle(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Speech { token, result } => self.playback.handle_speech(&mut self.library, token, result),
            PlayerEvent::Highlight { token, word } => {
                self.playback.handle_highlight(token, word);
            }
            PlayerEvent::Gallery(update) => self.apply_gallery(update),
            PlayerEvent::BatchFinished(outcome) => self.finish_load(*outcome),
        }
    }

    fn apply_gallery(&mut self, update: GalleryUpdate) {
        match update {
            GalleryUpdate::Started(insert) => self.feed.batch_started(insert),
            GalleryUpdate::Created(record, insert) => self.feed.placeholder_created(&record, insert),
            GalleryUpdate::Ready(record) => self.feed.placeholder_ready(&record),
            GalleryUpdate::Removed(id) => self.feed.placeholder_removed(id),
        }
    }

    fn finish_load(&mut self, outcome: BatchOutcome) {
        let BatchOutcome { used, ids, result } = outcome;
        self.loader = Loader::Ready { used, ids };

        match result {
            Ok(batch) => {
                self.feed.set_last_batch(batch.ids());
                self.feed.set_status(LoadStatus::Idle);
                self.library.extend(batch);
            }
            Err(err) => {
                warn!("story batch failed: {err}");
                self.feed.set_status(LoadStatus::Failed(LOAD_FAILED_MESSAGE.to_string()));
            }
        }

        if std::mem::take(&mut self.pending_advance) && self.playback.surface_visible() {
            self.step_forward();
        }
    }

    /// Opens `id` fullscreen and narrates it.
    pub fn open_story(&mut self, id: StoryId) -> bool {
        self.playback.open_story(&mut self.library, id)
    }

    /// Leaves fullscreen and moves the latest batch to the top of the gallery.
    pub fn close_story(&mut self) {
        self.playback.close();
        self.pending_advance = false;
        self.feed.promote_last_batch();
    }

    /// Moves to the next story. On the last story of a batch, the next batch
    /// is loaded first.
    pub fn advance(&mut self) {
        if !self.playback.surface_visible() {
            return;
        }
        let index = self.library.current();
        if is_batch_tail(index, self.config.batch.size) && self.load_batch(LoadRequest::refresh(InsertMode::Append)) {
            debug!(index, "end of batch, loading the next one before advancing");
            self.pending_advance = true;
            return;
        }
        self.step_forward();
    }

    fn step_forward(&mut self) {
        let next = self.library.current().saturating_add(1);
        if self.library.set_current(next) {
            self.playback.play_current(&mut self.library);
            return;
        }

        match self.config.playback.end_of_list {
            EndOfListPolicy::Stay => debug!("already at the last story"),
            EndOfListPolicy::Wrap => {
                if let Some(first) = self.library.first_playable_from(0) {
                    self.library.set_current(first);
                    self.playback.play_current(&mut self.library);
                }
            }
        }
    }

    /// Moves to the previous story, stopping at the first.
    pub fn retreat(&mut self) {
        if !self.playback.surface_visible() {
            return;
        }
        let current = self.library.current();
        if current > 0 && self.library.set_current(current.saturating_sub(1)) {
            self.playback.play_current(&mut self.library);
        }
    }

    /// Routes raw input: every input counts as a gesture for the audio
    /// unlock, navigation only applies while a story is open and is
    /// throttled.
    pub fn input(&mut self, input: Input, now: Instant) -> Option<NavIntent> {
        let visible = self.playback.surface_visible();
        let touch = if visible {
            Gesture::SurfaceTouch
        } else {
            Gesture::PointerDown
        };
        let intent = match input {
            Input::PointerDown => {
                self.playback.gesture(Gesture::PointerDown);
                None
            }
            Input::Key(key) => {
                self.playback.gesture(Gesture::Key);
                Some(key_intent(key))
            }
            Input::Wheel { delta_y } => {
                self.playback.gesture(Gesture::PointerDown);
                wheel_intent(delta_y)
            }
            Input::TouchStart { y } => {
                self.playback.gesture(touch);
                self.swipe.start(y);
                None
            }
            Input::TouchEnd { y } => {
                self.playback.gesture(touch);
                self.swipe.end(y)
            }
        }?;

        if !visible {
            return None;
        }
        match intent {
            NavIntent::Close => self.close_story(),
            NavIntent::Advance | NavIntent::Retreat => {
                if !self.throttle.try_acquire(now) {
                    debug!(?intent, "navigation throttled");
                    return None;
                }
                if intent == NavIntent::Advance {
                    self.advance();
                } else {
                    self.retreat();
                }
            }
        }
        Some(intent)
    }

    /// Drains audio signals. Call once per frame.
    pub fn tick(&mut self) {
        self.playback.tick();
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {
        super::*,
        crate::{
            playback::Phase,
            testing::{FakeAudio, FakeService, SharedAudio, SpeechMode},
        },
        assert2::check as assert,
        std::time::Duration,
    };

    struct Harness {
        player: Player,
        rx: UnboundedReceiver<PlayerEvent>,
        service: Arc<FakeService>,
        audio: SharedAudio,
    }

    impl Harness {
        fn new(config: Config, service: FakeService) -> Self {
            let service = Arc::new(service);
            let audio = SharedAudio::default();
            audio.0.borrow_mut().duration = Some(Duration::from_secs(7));
            let (player, rx) = Player::new(config, service.clone(), Box::new(audio.clone()));
            Self {
                player,
                rx,
                service,
                audio,
            }
        }

        /// Handles events until one matching `stop` has been handled.
        async fn until(&mut self, stop: impl Fn(&PlayerEvent) -> bool) {
            loop {
                let event = self.rx.recv().await.unwrap();
                let done = stop(&event);
                self.player.handle(event);
                if done {
                    return;
                }
            }
        }

        async fn until_loaded(&mut self) {
            self.until(|e| matches!(e, PlayerEvent::BatchFinished(_))).await;
        }

        async fn until_speech(&mut self) {
            self.until(|e| matches!(e, PlayerEvent::Speech { .. })).await;
        }

        /// Finishes the running load, then hands over any narration that
        /// completed while it ran.
        async fn until_loaded_then_speech(&mut self) {
            let mut held = Vec::new();
            loop {
                match self.rx.recv().await.unwrap() {
                    event @ PlayerEvent::Speech { .. } => held.push(event),
                    event @ PlayerEvent::BatchFinished(_) => {
                        self.player.handle(event);
                        break;
                    }
                    event => self.player.handle(event),
                }
            }
            if held.is_empty() {
                self.until_speech().await;
            }
            for event in held {
                self.player.handle(event);
            }
        }

        fn open(&mut self, index: usize) {
            let id = self.player.library().get(index).unwrap().id;
            assert!(self.player.open_story(id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_fills_feed_and_library() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        assert!(h.player.load_batch(LoadRequest::append()));
        assert!(h.player.is_loading());
        assert!(h.player.feed().status() == &LoadStatus::Loading);
        assert!(!h.player.load_batch(LoadRequest::append()));

        h.until_loaded().await;

        assert!(!h.player.is_loading());
        assert!(h.player.library().len() == 4);
        assert!(h.player.used_prompts().unwrap().len() == 4);
        assert!(h.player.feed().status() == &LoadStatus::Idle);
        let library_ids: Vec<_> = h.player.library().stories().iter().map(|s| s.id).collect();
        assert!(h.player.feed().ids() == library_ids);
        assert!(h.player.feed().last_batch() == library_ids);
        assert!(FakeService::count(&h.service.idea_calls) == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_shows_message() {
        let mut h = Harness::new(Config::default(), FakeService::failing_images());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;

        assert!(h.player.feed().status() == &LoadStatus::Failed(LOAD_FAILED_MESSAGE.to_string()));
        assert!(h.player.feed().is_empty());
        assert!(h.player.library().is_empty());
        assert!(!h.player.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_tail_loads_before_advancing() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.open(3);
        h.until_speech().await;
        let refreshes = FakeService::count(&h.service.refresh_calls);

        h.player.advance();
        assert!(h.player.is_loading());
        assert!(h.player.library().current() == 3);

        h.until_loaded().await;
        assert!(h.player.library().len() == 8);
        assert!(h.player.library().current() == 4);
        assert!(FakeService::count(&h.service.refresh_calls) == refreshes + 1);
        assert!(matches!(h.player.playback().phase(), Phase::Loading { .. }));
        assert!(h.player.playback().phase().story() == h.player.library().get(4).map(|s| s.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_narration_follows_story_across_prepend() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;

        assert!(h.player.load_batch(LoadRequest::refresh(InsertMode::Prepend)));
        h.open(0);
        let opened = h.player.library().get(0).unwrap().id;
        h.until_loaded_then_speech().await;

        assert!(h.player.library().len() == 8);
        assert!(h.player.library().current() == 4);
        assert!(h.player.library().current_record().unwrap().id == opened);
        assert!(matches!(h.player.playback().phase(), Phase::Playing { .. }));
        assert!(h.player.playback().phase().story() == Some(opened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_narration_marks_opened_story_across_prepend() {
        let mut h = Harness::new(Config::default(), FakeService {
            speech: SpeechMode::Fail,
            ..FakeService::default()
        });
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;

        h.player.load_batch(LoadRequest::refresh(InsertMode::Prepend));
        h.open(0);
        let opened = h.player.library().get(0).unwrap().id;
        h.until_loaded_then_speech().await;

        let failed: Vec<_> = h.player.library().stories().iter().filter(|s| s.failed).map(|s| s.id).collect();
        assert!(failed == [opened]);
        assert!(h.player.playback().phase().story() == h.player.library().get(0).map(|s| s.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_inside_a_batch_is_immediate() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.open(1);

        h.player.advance();
        assert!(!h.player.is_loading());
        assert!(h.player.library().current() == 2);

        h.player.retreat();
        h.player.retreat();
        h.player.retreat();
        assert!(h.player.library().current() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_promotes_last_batch() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        let second = h.player.feed().last_batch().to_vec();
        assert!(h.player.feed().ids()[4..] == second[..]);

        h.open(0);
        h.player.close_story();

        assert!(!h.player.playback().surface_visible());
        assert!(h.player.feed().ids()[..4] == second[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_is_throttled() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.open(0);

        let t0 = Instant::now();
        assert!(h.player.input(Input::Key(NavKey::Down), t0) == Some(NavIntent::Advance));
        assert!(h.player.input(Input::Wheel { delta_y: 1.0 }, t0 + Duration::from_millis(50)).is_none());
        assert!(h.player.library().current() == 1);

        let later = t0 + Duration::from_millis(300);
        assert!(h.player.input(Input::Wheel { delta_y: -1.0 }, later) == Some(NavIntent::Retreat));
        assert!(h.player.library().current() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swipe_and_escape() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.open(0);
        let t0 = Instant::now();

        h.player.input(Input::TouchStart { y: 400.0 }, t0);
        assert!(h.player.input(Input::TouchEnd { y: 300.0 }, t0) == Some(NavIntent::Advance));
        assert!(h.player.library().current() == 1);

        assert!(h.player.input(Input::Key(NavKey::Escape), t0) == Some(NavIntent::Close));
        assert!(!h.player.playback().surface_visible());

        // closed: navigation does nothing
        assert!(h.player.input(Input::Key(NavKey::Down), t0 + Duration::from_secs(1)).is_none());
        assert!(h.player.library().current() == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gallery_input_unlocks_audio() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        assert!(h.player.input(Input::PointerDown, Instant::now()).is_none());
        assert!(h.player.playback().unlock().is_unlocked());
        assert!(h.audio.0.borrow().unlock_calls == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_replays_rejected_narration() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.audio.0.borrow_mut().reject_plays = 1;
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;
        h.open(0);
        h.until_speech().await;
        assert!(!h.audio.0.borrow().playing);

        // nothing before the first story; the scroll still counts as a gesture
        assert!(h.player.input(Input::Wheel { delta_y: -1.0 }, Instant::now()) == Some(NavIntent::Retreat));
        assert!(h.player.library().current() == 0);
        assert!(h.audio.0.borrow().play_calls == 2);
        assert!(h.audio.0.borrow().playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swipe_end_unlocks_audio() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.audio.0.borrow_mut().fail_unlock = true;
        h.player.input(Input::TouchStart { y: 300.0 }, Instant::now());
        assert!(!h.player.playback().unlock().is_unlocked());

        h.audio.0.borrow_mut().fail_unlock = false;
        assert!(h.player.input(Input::TouchEnd { y: 100.0 }, Instant::now()).is_none());
        assert!(h.player.playback().unlock().is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_list_policy() {
        let service = || FakeService {
            ideas_per_round: 3,
            ..FakeService::default()
        };
        let mut config = Config::default();
        config.batch.max_rounds = 1;

        let mut stay = Harness::new(config.clone(), service());
        stay.player.load_batch(LoadRequest::append());
        stay.until_loaded().await;
        stay.open(2);
        stay.player.advance();
        assert!(stay.player.library().current() == 2);
        assert!(!stay.player.is_loading());

        config.playback.end_of_list = EndOfListPolicy::Wrap;
        let mut wrap = Harness::new(config, service());
        wrap.player.load_batch(LoadRequest::append());
        wrap.until_loaded().await;
        wrap.open(2);
        wrap.player.advance();
        assert!(wrap.player.library().current() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_at_gallery_end() {
        let mut h = Harness::new(Config::default(), FakeService::default());
        h.player.load_batch(LoadRequest::append());
        h.until_loaded().await;

        assert!(!h.player.prefetch_if_at_end(1));
        assert!(h.player.prefetch_if_at_end(3));
        assert!(!h.player.prefetch_if_at_end(3));
        h.until_loaded().await;
        assert!(h.player.library().len() == 8);
    }
}
