//! The single audio output the player narrates through.

use {
    crate::error::Result,
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    tokio::time::Instant,
};

/// Encoded narration audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Encoded audio, MP3 from the speech service.
    pub bytes: Arc<[u8]>,
}

/// Why the platform refused to start playback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayRejected {
    /// Output is locked until the user interacts.
    #[error("playback needs a user gesture first")]
    GestureRequired,
    /// No clip to play.
    #[error("nothing is loaded")]
    NothingLoaded,
    /// The device refused.
    #[error("audio device unavailable: {0}")]
    Device(String),
}

/// Lifecycle notifications reported by [`AudioOutput::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSignal {
    /// The clip's metadata is known; the duration is `None` if the decoder could not tell.
    MetadataLoaded(Option<Duration>),
    /// Playback reached the end of the clip.
    Ended,
}

/// Where narration is played.
pub trait AudioOutput {
    /// Replaces whatever is loaded. Does not start playback.
    fn load(&mut self, clip: AudioClip) -> Result<()>;

    /// Starts the loaded clip from the beginning.
    fn play(&mut self) -> std::result::Result<(), PlayRejected>;

    /// Stops playback and drops the loaded clip.
    fn stop(&mut self);

    /// Length of the loaded clip, if known.
    fn duration(&self) -> Option<Duration>;

    /// One-time unlock performed inside a user gesture.
    fn unlock(&mut self) -> Result<()>;

    /// Next pending lifecycle signal, if any.
    fn poll(&mut self) -> Option<AudioSignal>;
}

/// Output that plays nothing but keeps time, so narration-driven subtitles run
/// without an audio device.
#[derive(Debug)]
pub struct SilentOutput {
    gated: bool,
    unlocked: bool,
    loaded: bool,
    metadata_sent: bool,
    duration: Option<Duration>,
    fallback: Duration,
    started: Option<Instant>,
}

impl SilentOutput {
    /// `fallback` is how long a clip of unknown length "plays".
    pub const fn new(fallback: Duration) -> Self {
        Self {
            gated: false,
            unlocked: false,
            loaded: false,
            metadata_sent: false,
            duration: None,
            fallback,
            started: None,
        }
    }

    /// Refuse to play until [`AudioOutput::unlock`] has run, like a browser
    /// with an autoplay policy.
    pub const fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Report a fixed duration for every clip.
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Whether a clip is running.
    pub const fn is_playing(&self) -> bool {
        self.started.is_some()
    }
}

impl AudioOutput for SilentOutput {
    fn load(&mut self, _clip: AudioClip) -> Result<()> {
        self.stop();
        self.loaded = true;
        Ok(())
    }

    fn play(&mut self) -> std::result::Result<(), PlayRejected> {
        if !self.loaded {
            return Err(PlayRejected::NothingLoaded);
        }
        if self.gated && !self.unlocked {
            return Err(PlayRejected::GestureRequired);
        }
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn stop(&mut self) {
        self.loaded = false;
        self.metadata_sent = false;
        self.started = None;
    }

    fn duration(&self) -> Option<Duration> {
        self.loaded.then_some(self.duration).flatten()
    }

    fn unlock(&mut self) -> Result<()> {
        self.unlocked = true;
        Ok(())
    }

    fn poll(&mut self) -> Option<AudioSignal> {
        if self.loaded && !self.metadata_sent {
            self.metadata_sent = true;
            return Some(AudioSignal::MetadataLoaded(self.duration));
        }

        let started = self.started?;
        if started.elapsed() >= self.duration.unwrap_or(self.fallback) {
            self.started = None;
            self.loaded = false;
            return Some(AudioSignal::Ended);
        }
        None
    }
}

#[cfg(feature = "audio")]
pub use device::RodioOutput;

#[cfg(feature = "audio")]
mod device {
    use {
        super::{AudioClip, AudioOutput, AudioSignal, PlayRejected},
        crate::error::{Result, StoryError},
        rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source, source::SineWave},
        std::{io::Cursor, time::Duration},
    };

    /// Output on the default audio device.
    ///
    /// The device stream is opened by [`AudioOutput::unlock`]; until then
    /// playback is rejected the way a browser rejects autoplay.
    #[derive(Default)]
    pub struct RodioOutput {
        stream: Option<OutputStream>,
        sink: Option<Sink>,
        clip: Option<AudioClip>,
        duration: Option<Duration>,
        metadata_sent: bool,
    }

    impl RodioOutput {
        /// Plays through the default output device, opened on first use.
        pub fn new() -> Self {
            Self::default()
        }

        fn decoder(clip: &AudioClip) -> Result<Decoder<Cursor<Vec<u8>>>> {
            Decoder::new(Cursor::new(clip.bytes.to_vec()))
                .map_err(|e| StoryError::Audio(format!("cannot decode narration: {e}")))
        }
    }

    impl AudioOutput for RodioOutput {
        fn load(&mut self, clip: AudioClip) -> Result<()> {
            self.stop();
            self.duration = Self::decoder(&clip)?.total_duration();
            self.clip = Some(clip);
            Ok(())
        }

        fn play(&mut self) -> std::result::Result<(), PlayRejected> {
            let Some(stream) = &self.stream else {
                return Err(PlayRejected::GestureRequired);
            };
            let Some(clip) = &self.clip else {
                return Err(PlayRejected::NothingLoaded);
            };
            if let Some(sink) = &self.sink {
                sink.play();
                return Ok(());
            }

            let source = Self::decoder(clip).map_err(|e| PlayRejected::Device(e.to_string()))?;
            let sink = Sink::connect_new(stream.mixer());
            sink.append(source);
            sink.play();
            self.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
            self.clip = None;
            self.duration = None;
            self.metadata_sent = false;
        }

        fn duration(&self) -> Option<Duration> {
            self.duration
        }

        fn unlock(&mut self) -> Result<()> {
            if self.stream.is_some() {
                return Ok(());
            }
            let stream = OutputStreamBuilder::open_default_stream()
                .map_err(|e| StoryError::Audio(e.to_string()))?;

            let primer = Sink::connect_new(stream.mixer());
            primer.append(
                SineWave::new(440.0)
                    .take_duration(Duration::from_millis(10))
                    .amplify(0.0),
            );
            primer.detach();

            self.stream = Some(stream);
            Ok(())
        }

        fn poll(&mut self) -> Option<AudioSignal> {
            if self.clip.is_some() && !self.metadata_sent {
                self.metadata_sent = true;
                return Some(AudioSignal::MetadataLoaded(self.duration));
            }
            if self.sink.as_ref().is_some_and(Sink::empty) {
                self.sink = None;
                self.clip = None;
                return Some(AudioSignal::Ended);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {super::*, assert2::check as assert};

    fn clip() -> AudioClip {
        AudioClip {
            bytes: Arc::from(&b"mp3"[..]),
        }
    }

    #[test]
    fn test_gated_output_rejects_until_unlocked() {
        let mut out = SilentOutput::new(Duration::from_secs(1)).gated();
        out.load(clip()).unwrap();
        assert!(out.play() == Err(PlayRejected::GestureRequired));
        out.unlock().unwrap();
        assert!(out.play().is_ok());
        assert!(out.is_playing());
    }

    #[test]
    fn test_play_without_clip_is_rejected() {
        let mut out = SilentOutput::new(Duration::from_secs(1));
        assert!(out.play() == Err(PlayRejected::NothingLoaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_metadata_then_end() {
        let mut out = SilentOutput::new(Duration::from_secs(15)).with_duration(Duration::from_secs(2));
        out.load(clip()).unwrap();
        assert!(out.poll() == Some(AudioSignal::MetadataLoaded(Some(Duration::from_secs(2)))));
        assert!(out.poll().is_none());

        out.play().unwrap();
        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(out.poll().is_none());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(out.poll() == Some(AudioSignal::Ended));
        assert!(out.poll().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_duration_uses_fallback() {
        let mut out = SilentOutput::new(Duration::from_secs(15));
        out.load(clip()).unwrap();
        assert!(out.poll() == Some(AudioSignal::MetadataLoaded(None)));
        out.play().unwrap();
        tokio::time::advance(Duration::from_secs(14)).await;
        assert!(out.poll().is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(out.poll() == Some(AudioSignal::Ended));
    }

    #[test]
    fn test_stop_drops_the_clip() {
        let mut out = SilentOutput::new(Duration::from_secs(1)).with_duration(Duration::from_secs(3));
        out.load(clip()).unwrap();
        assert!(out.duration() == Some(Duration::from_secs(3)));
        out.stop();
        assert!(out.duration().is_none());
        assert!(out.poll().is_none());
    }
}
