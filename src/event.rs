//! Messages from background tasks to the player.

use {
    crate::{
        error::Result,
        loader::{Batch, GallerySink, InsertMode, UsedPrompts},
        session::PlayToken,
        types::{IdSource, Speech, StoryId, StoryRecord},
    },
    tokio::sync::mpsc::UnboundedSender,
};

/// Placeholder lifecycle forwarded from a running batch load.
#[derive(Debug, Clone)]
pub enum GalleryUpdate {
    /// A batch started loading.
    Started(InsertMode),
    /// A placeholder tile for a new idea.
    Created(StoryRecord, InsertMode),
    /// The placeholder's illustration arrived.
    Ready(StoryRecord),
    /// The placeholder's illustration failed; the tile goes away.
    Removed(StoryId),
}

/// What a background load hands back: the prompt bookkeeping it borrowed and
/// the batch or the reason there is none.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Prompts seen so far, including this batch.
    pub used: UsedPrompts,
    /// Id source, advanced past this batch.
    pub ids: IdSource,
    /// The stories that made it, in order.
    pub result: Result<Batch>,
}

/// Completions of background work, consumed by the task that owns the player.
#[derive(Debug)]
pub enum PlayerEvent {
    /// A narration request finished, was cancelled or failed.
    Speech {
        /// Session that asked for it.
        token: PlayToken,
        /// The narration or why there is none.
        result: Result<Speech>,
    },
    /// A highlight timer fired.
    Highlight {
        /// Session that scheduled it.
        token: PlayToken,
        /// Index of the word to highlight.
        word: usize,
    },
    /// Placeholder progress of the running load.
    Gallery(GalleryUpdate),
    /// The running load is over.
    BatchFinished(Box<BatchOutcome>),
}

/// Forwards gallery updates from a load task to the player.
#[derive(Debug, Clone)]
pub struct ChannelGallery(pub UnboundedSender<PlayerEvent>);

impl ChannelGallery {
    fn send(&self, update: GalleryUpdate) {
        let _ = self.0.send(PlayerEvent::Gallery(update));
    }
}

impl GallerySink for ChannelGallery {
    fn batch_started(&mut self, insert: InsertMode) {
        self.send(GalleryUpdate::Started(insert));
    }

    fn placeholder_created(&mut self, record: &StoryRecord, insert: InsertMode) {
        self.send(GalleryUpdate::Created(record.clone(), insert));
    }

    fn placeholder_ready(&mut self, record: &StoryRecord) {
        self.send(GalleryUpdate::Ready(record.clone()));
    }

    fn placeholder_removed(&mut self, id: StoryId) {
        self.send(GalleryUpdate::Removed(id));
    }
}
