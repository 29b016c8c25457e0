//! Story data as it moves between the service, the gallery and playback.

use {
    crate::error::{Result, StoryError},
    serde::{Deserialize, Serialize},
    std::{cell::OnceCell, fmt, sync::Arc, time::Duration},
    xxhash_rust::xxh3::xxh3_64,
};

/// Stable identifier assigned to a story when its placeholder is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoryId(u64);

impl StoryId {
    /// Wraps a raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hands out story ids. The sequence number makes ids unique within a session,
/// the prompt hash keeps them recognisable in logs.
#[derive(Debug, Default)]
pub struct IdSource {
    sequence: u32,
}

impl IdSource {
    /// A fresh id for a story with `prompt`.
    pub fn next_id(&mut self, prompt: &str) -> StoryId {
        self.sequence = self.sequence.wrapping_add(1);
        let hash = xxh3_64(prompt.as_bytes()) & 0xffff_ffff;
        StoryId((u64::from(self.sequence) << 32) | hash)
    }
}

/// One story idea returned by the idea service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryIdea {
    /// Illustration prompt.
    #[serde(default)]
    pub prompt: String,
    /// Story text.
    #[serde(default)]
    pub story: String,
}

/// A decoded illustration together with the service's cache flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryImage {
    /// PNG bytes.
    pub data: Arc<[u8]>,
    /// Served from the server cache.
    pub cached: bool,
}

/// Per-word timing hint returned by the speech service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timepoint {
    /// Mark name, as sent by the service.
    #[serde(rename = "markName", default)]
    pub mark_name: String,
    /// Seconds from the start of the clip.
    #[serde(rename = "timeSeconds", default)]
    pub time_seconds: f64,
}

impl Timepoint {
    /// The mark as a [`Duration`], clamped at zero.
    pub fn offset(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_seconds).unwrap_or_default()
    }
}

/// Narration audio for one story.
#[derive(Debug, Clone, PartialEq)]
pub struct Speech {
    /// MP3 bytes.
    pub audio: Arc<[u8]>,
    /// Word marks, possibly empty.
    pub timepoints: Vec<Timepoint>,
    /// Served from the server cache.
    pub cached: bool,
}

/// A story in the library or in flight as a gallery placeholder.
#[derive(Debug, Clone)]
pub struct StoryRecord {
    /// Identity.
    pub id: StoryId,
    /// Illustration prompt.
    pub prompt: String,
    /// Narrated text.
    pub story: String,
    image: OnceCell<StoryImage>,
    /// Narration failed for this story.
    pub failed: bool,
}

impl StoryRecord {
    /// A record still waiting for its illustration.
    pub fn placeholder(id: StoryId, idea: StoryIdea) -> Self {
        Self {
            id,
            prompt: idea.prompt,
            story: idea.story,
            image: OnceCell::new(),
            failed: false,
        }
    }

    /// A record with its illustration.
    pub fn with_image(id: StoryId, idea: StoryIdea, image: StoryImage) -> Self {
        Self {
            image: OnceCell::from(image),
            ..Self::placeholder(id, idea)
        }
    }

    /// Attaches the illustration. An image is set at most once.
    pub fn attach_image(&mut self, image: StoryImage) -> Result<()> {
        self.image
            .set(image)
            .map_err(|_| StoryError::Other(format!("story {} already has an image", self.id)))
    }

    /// The illustration, once set.
    pub fn image(&self) -> Option<&StoryImage> {
        self.image.get()
    }

    /// Whether the illustration came from the cache.
    pub fn is_cached(&self) -> bool {
        self.image().is_some_and(|image| image.cached)
    }

    /// A record can be played when it has an illustration and has not failed.
    pub fn is_playable(&self) -> bool {
        !self.failed && self.image().is_some_and(|image| !image.data.is_empty())
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {super::*, assert2::check as assert};

    fn image() -> StoryImage {
        StoryImage {
            data: Arc::from(&b"png"[..]),
            cached: true,
        }
    }

    #[test]
    fn test_ids_are_unique_for_the_same_prompt() {
        let mut ids = IdSource::default();
        let a = ids.next_id("a fox");
        let b = ids.next_id("a fox");
        assert!(a != b);
        assert!(a.to_string().len() == 16);
    }

    #[test]
    fn test_image_is_set_once() {
        let mut record = StoryRecord::placeholder(StoryId::from_raw(1), StoryIdea::default());
        assert!(!record.is_playable());
        assert!(record.attach_image(image()).is_ok());
        assert!(record.attach_image(image()).is_err());
        assert!(record.is_playable());
        assert!(record.is_cached());
    }

    #[test]
    fn test_failed_record_is_not_playable() {
        let mut record =
            StoryRecord::with_image(StoryId::from_raw(2), StoryIdea::default(), image());
        record.failed = true;
        assert!(!record.is_playable());
    }

    #[test]
    fn test_timepoint_deserializes_service_names() {
        let tp: Timepoint =
            serde_json::from_str(r#"{"markName":"w3","timeSeconds":1.25}"#).unwrap();
        assert!(tp.mark_name == "w3");
        assert!(tp.offset() == Duration::from_millis(1250));
    }
}
