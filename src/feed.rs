//! Gallery ordering.
//!
//! The feed is the single source of truth for which tiles exist and in which
//! order; front-ends only draw it.

use crate::{
    loader::{GallerySink, InsertMode},
    types::{StoryId, StoryImage, StoryRecord},
};

/// Whether a tile has its illustration yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileState {
    /// Waiting for the illustration.
    Pending,
    /// Illustration loaded.
    Ready(StoryImage),
}

/// A gallery entry.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Story the tile opens.
    pub id: StoryId,
    /// Shown as the tile caption.
    pub prompt: String,
    /// Load state.
    pub state: TileState,
}

impl Tile {
    /// Whether the illustration arrived.
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, TileState::Ready(_))
    }

    /// The illustration, once it arrived.
    pub const fn image(&self) -> Option<&StoryImage> {
        match &self.state {
            TileState::Ready(image) => Some(image),
            TileState::Pending => None,
        }
    }

    /// The illustration came from the server cache.
    pub fn is_cached(&self) -> bool {
        self.image().is_some_and(|image| image.cached)
    }
}

/// State of the gallery's loading indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing loading.
    #[default]
    Idle,
    /// A batch is loading.
    Loading,
    /// Shown until the next load starts.
    Failed(String),
}

/// Shown in the gallery when a batch load fails.
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load stories, please retry.";

/// The gallery: tiles in display order and the load status.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    tiles: Vec<Tile>,
    last_batch: Vec<StoryId>,
    status: LoadStatus,
    /// Where the next prepended tile goes, so a prepended batch keeps its order.
    prepend_at: usize,
}

impl Feed {
    /// Tiles in display order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Story ids in display order.
    pub fn ids(&self) -> Vec<StoryId> {
        self.tiles.iter().map(|t| t.id).collect()
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether there are no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile of `id`.
    pub fn get(&self, id: StoryId) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.id == id)
    }

    /// Display position of `id`.
    pub fn position(&self, id: StoryId) -> Option<usize> {
        self.tiles.iter().position(|t| t.id == id)
    }

    /// Current load status.
    pub const fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Replaces the load status.
    pub fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }

    /// Ids of the most recent batch, in load order.
    pub fn last_batch(&self) -> &[StoryId] {
        &self.last_batch
    }

    /// Remembers the batch that just finished.
    pub fn set_last_batch(&mut self, ids: Vec<StoryId>) {
        self.last_batch = ids;
    }

    /// Moves the most recent batch's tiles to the front, first of the batch
    /// first. Ids no longer in the feed are ignored.
    pub fn promote_last_batch(&mut self) {
        let mut promoted = Vec::with_capacity(self.last_batch.len());
        for id in &self.last_batch {
            if let Some(at) = self.tiles.iter().position(|t| t.id == *id) {
                promoted.push(self.tiles.remove(at));
            }
        }
        promoted.append(&mut self.tiles);
        self.tiles = promoted;
    }

    fn insert(&mut self, tile: Tile, insert: InsertMode) {
        match insert {
            InsertMode::Append => self.tiles.push(tile),
            InsertMode::Prepend => {
                let at = self.prepend_at.min(self.tiles.len());
                self.tiles.insert(at, tile);
                self.prepend_at = at.saturating_add(1);
            }
        }
    }
}

impl GallerySink for Feed {
    fn batch_started(&mut self, _insert: InsertMode) {
        self.prepend_at = 0;
    }

    fn placeholder_created(&mut self, record: &StoryRecord, insert: InsertMode) {
        self.insert(
            Tile {
                id: record.id,
                prompt: record.prompt.clone(),
                state: TileState::Pending,
            },
            insert,
        );
    }

    fn placeholder_ready(&mut self, record: &StoryRecord) {
        let image = record.image().cloned();
        if let (Some(tile), Some(image)) = (self.tiles.iter_mut().find(|t| t.id == record.id), image) {
            tile.state = TileState::Ready(image);
        }
    }

    fn placeholder_removed(&mut self, id: StoryId) {
        if let Some(at) = self.position(id) {
            self.tiles.remove(at);
            if at < self.prepend_at {
                self.prepend_at = self.prepend_at.saturating_sub(1);
            }
        }
    }
}
