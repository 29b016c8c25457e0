#![allow(clippy::arithmetic_side_effects, clippy::missing_panics_doc, missing_docs)]
//! In-memory stand-ins for the story backend and the audio device.

use {
    crate::{
        audio::{AudioClip, AudioOutput, AudioSignal, PlayRejected},
        error::{Result, Service, StoryError},
        service::StoryService,
        types::{Speech, StoryIdea, StoryImage, Timepoint},
    },
    async_trait::async_trait,
    std::{
        cell::RefCell,
        collections::VecDeque,
        rc::Rc,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    },
};

pub type PromptFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub enum SpeechMode {
    Succeed { timepoints: bool },
    Fail,
    Hang,
}

/// Story backend that makes up a fresh idea for every slot unless told
/// otherwise.
pub struct FakeService {
    pub ideas_per_round: usize,
    /// Returned verbatim by every idea request instead of generated ideas.
    pub fixed_ideas: Option<Vec<StoryIdea>>,
    pub fail_ideas: bool,
    pub image_fails: Option<PromptFilter>,
    pub speech: SpeechMode,
    pub story_text: String,
    pub idea_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub speech_calls: AtomicUsize,
    pub spoken: Mutex<Vec<String>>,
    pub counter: AtomicUsize,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            ideas_per_round: 6,
            fixed_ideas: None,
            fail_ideas: false,
            image_fails: None,
            speech: SpeechMode::Succeed { timepoints: true },
            story_text: "The cat sat. It ran so fast!".to_string(),
            idea_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            speech_calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }
}

impl FakeService {
    pub fn failing_images() -> Self {
        Self {
            image_fails: Some(Box::new(|_| true)),
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub fn idea(prompt: &str, story: &str) -> StoryIdea {
    StoryIdea {
        prompt: prompt.to_string(),
        story: story.to_string(),
    }
}

pub fn png() -> StoryImage {
    StoryImage {
        data: Arc::from(&b"\x89PNG"[..]),
        cached: false,
    }
}

#[async_trait]
impl StoryService for FakeService {
    async fn story_ideas(&self, refresh: bool) -> Result<Vec<StoryIdea>> {
        self.idea_calls.fetch_add(1, Ordering::SeqCst);
        if refresh {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_ideas {
            return Err(StoryError::upstream(Service::Ideas, "offline"));
        }
        if let Some(ideas) = &self.fixed_ideas {
            return Ok(ideas.clone());
        }

        Ok((0..self.ideas_per_round)
            .map(|_| {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                idea(&format!("prompt {n}"), &self.story_text)
            })
            .collect())
    }

    async fn generate_image(&self, prompt: &str) -> Result<StoryImage> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.image_fails.as_ref().is_some_and(|fails| fails(prompt)) {
            return Err(StoryError::upstream(Service::Image, "no image"));
        }
        Ok(png())
    }

    async fn generate_speech(&self, text: &str) -> Result<Speech> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }

        match self.speech {
            SpeechMode::Succeed { timepoints } => Ok(Speech {
                audio: Arc::from(&b"ID3"[..]),
                timepoints: if timepoints {
                    vec![Timepoint {
                        mark_name: "0".into(),
                        time_seconds: 0.0,
                    }]
                } else {
                    Vec::new()
                },
                cached: false,
            }),
            SpeechMode::Fail => Err(StoryError::upstream(Service::Speech, "tts down")),
            SpeechMode::Hang => std::future::pending().await,
        }
    }
}

/// Audio output that records what it was asked to do.
#[derive(Debug, Default)]
pub struct FakeAudio {
    pub unlock_calls: usize,
    pub fail_unlock: bool,
    /// Number of upcoming `play` calls to reject.
    pub reject_plays: usize,
    pub play_calls: usize,
    pub stop_calls: usize,
    pub loads: usize,
    pub playing: bool,
    pub duration: Option<Duration>,
    pub signals: VecDeque<AudioSignal>,
}

impl AudioOutput for FakeAudio {
    fn load(&mut self, _clip: AudioClip) -> Result<()> {
        self.loads += 1;
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> std::result::Result<(), PlayRejected> {
        self.play_calls += 1;
        if self.reject_plays > 0 {
            self.reject_plays -= 1;
            return Err(PlayRejected::GestureRequired);
        }
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
        self.playing = false;
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn unlock(&mut self) -> Result<()> {
        self.unlock_calls += 1;
        if self.fail_unlock {
            return Err(StoryError::Audio("blocked".into()));
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<AudioSignal> {
        self.signals.pop_front()
    }
}

/// A [`FakeAudio`] the test keeps a handle to after giving it to the player.
#[derive(Debug, Clone, Default)]
pub struct SharedAudio(pub Rc<RefCell<FakeAudio>>);

impl AudioOutput for SharedAudio {
    fn load(&mut self, clip: AudioClip) -> Result<()> {
        self.0.borrow_mut().load(clip)
    }

    fn play(&mut self) -> std::result::Result<(), PlayRejected> {
        self.0.borrow_mut().play()
    }

    fn stop(&mut self) {
        self.0.borrow_mut().stop();
    }

    fn duration(&self) -> Option<Duration> {
        self.0.borrow().duration()
    }

    fn unlock(&mut self) -> Result<()> {
        self.0.borrow_mut().unlock()
    }

    fn poll(&mut self) -> Option<AudioSignal> {
        self.0.borrow_mut().poll()
    }
}
