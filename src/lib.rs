//! storyreel - narrated picture stories with word-synchronised subtitles.
//!
//! Stories come from an HTTP backend in batches: an idea (prompt and text),
//! an illustration per idea and a narration on demand. The [`Player`] keeps
//! the gallery, the playback order and exactly one narrating story; front-ends
//! feed it input and background events and draw what it exposes.

pub mod audio;
pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod library;
pub mod loader;
pub mod navigation;
pub mod playback;
pub mod player;
pub mod segment;
pub mod service;
pub mod session;
pub mod subtitle;
pub mod types;
pub mod unlock;

#[cfg(test)]
mod testing;

pub use {
    config::Config,
    error::{Result, StoryError},
    event::PlayerEvent,
    player::{Input, Player},
    service::{HttpStoryService, StoryService},
};
