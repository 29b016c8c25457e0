//! Stories in playback order.

use crate::{
    loader::{Batch, InsertMode},
    types::{StoryId, StoryRecord},
};

/// The loaded stories, in playback order, and the current position.
#[derive(Debug, Default)]
pub struct Library {
    stories: Vec<StoryRecord>,
    current: usize,
}

impl Library {
    /// Number of stories.
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Whether nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Stories in playback order.
    pub fn stories(&self) -> &[StoryRecord] {
        &self.stories
    }

    /// Story at `index`.
    pub fn get(&self, index: usize) -> Option<&StoryRecord> {
        self.stories.get(index)
    }

    /// Index of the story fullscreen, or last shown.
    pub const fn current(&self) -> usize {
        self.current
    }

    /// The current story.
    pub fn current_record(&self) -> Option<&StoryRecord> {
        self.stories.get(self.current)
    }

    /// Moves to `index`; out-of-range indices are ignored.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.stories.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Index of `id`.
    pub fn position(&self, id: StoryId) -> Option<usize> {
        self.stories.iter().position(|s| s.id == id)
    }

    /// First playable story at or after `start`, wrapping around to the front.
    pub fn first_playable_from(&self, start: usize) -> Option<usize> {
        let len = self.stories.len();
        (0..len)
            .filter_map(|offset| start.saturating_add(offset).checked_rem(len))
            .find(|&index| self.stories[index].is_playable())
    }

    /// Skips the story from now on.
    pub fn mark_unplayable(&mut self, index: usize) {
        if let Some(story) = self.stories.get_mut(index) {
            story.failed = true;
        }
    }

    /// Adds a loaded batch. Prepending shifts the current position so it keeps
    /// pointing at the same story.
    pub fn extend(&mut self, batch: Batch) {
        let added = batch.records.len();
        match batch.insert {
            InsertMode::Append => self.stories.extend(batch.records),
            InsertMode::Prepend => {
                let rest = std::mem::replace(&mut self.stories, batch.records);
                self.stories.extend(rest);
                if self.stories.len() > added {
                    self.current = self.current.saturating_add(added);
                }
            }
        }
    }
}
