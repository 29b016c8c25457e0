//! Batched story loading with prompt deduplication.

use {
    crate::{
        config::BatchConfig,
        error::{Result, StoryError},
        service::StoryService,
        types::{IdSource, StoryId, StoryRecord},
    },
    futures::stream::{FuturesUnordered, StreamExt},
    hashbrown::HashSet,
    tracing::{debug, info, warn},
};

/// Where a batch goes relative to the stories already shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    /// After everything loaded so far.
    #[default]
    Append,
    /// Before everything loaded so far.
    Prepend,
}

/// Parameters of one batch load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadRequest {
    /// Where the batch goes.
    pub insert: InsertMode,
    /// Ask for fresh ideas even on the first round.
    pub force_refresh: bool,
}

impl LoadRequest {
    /// Appends from the server cache.
    pub const fn append() -> Self {
        Self {
            insert: InsertMode::Append,
            force_refresh: false,
        }
    }

    /// Asks the server for fresh ideas.
    pub const fn refresh(insert: InsertMode) -> Self {
        Self {
            insert,
            force_refresh: true,
        }
    }
}

/// Prompts shown during this session. Only ever grows.
#[derive(Debug, Clone, Default)]
pub struct UsedPrompts(HashSet<String>);

impl UsedPrompts {
    /// Whether `prompt` was used.
    pub fn contains(&self, prompt: &str) -> bool {
        self.0.contains(prompt)
    }

    /// Returns `false` if the prompt was already used.
    pub fn insert(&mut self, prompt: &str) -> bool {
        self.0.insert(prompt.to_string())
    }

    /// Number of prompts used.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no prompt was used.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Receives the placeholder lifecycle while a batch loads.
pub trait GallerySink {
    /// A batch load begins.
    fn batch_started(&mut self, _insert: InsertMode) {}

    /// A tile for `record` appears immediately, before its image exists.
    fn placeholder_created(&mut self, record: &StoryRecord, insert: InsertMode);

    /// The image arrived and the tile becomes clickable.
    fn placeholder_ready(&mut self, record: &StoryRecord);

    /// The image failed or the story did not make the batch.
    fn placeholder_removed(&mut self, id: StoryId);
}

/// A finished load: records in gallery order, every one with an image.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Where the batch goes.
    pub insert: InsertMode,
    /// Playable records, at most the batch size.
    pub records: Vec<StoryRecord>,
    /// Idea rounds it took.
    pub rounds: u32,
}

impl Batch {
    /// Ids of the records, in order.
    pub fn ids(&self) -> Vec<StoryId> {
        self.records.iter().map(|r| r.id).collect()
    }
}

/// Loads up to `limits.size` new stories in at most `limits.max_rounds` rounds.
///
/// Every round asks for ideas (fresh ones when forced or after the first
/// round), drops prompts already used, shows a placeholder per idea and
/// requests all images at once. Stories whose image arrives are counted in
/// placeholder order until the batch is full; the rest are removed. A counted
/// story's prompt is marked used immediately.
///
/// Fails with [`StoryError::Exhausted`] when no story could be loaded.
pub async fn load_batch<S, G>(
    service: &S,
    used: &mut UsedPrompts,
    ids: &mut IdSource,
    gallery: &mut G,
    request: LoadRequest,
    limits: &BatchConfig,
) -> Result<Batch>
where
    S: StoryService + ?Sized,
    G: GallerySink + ?Sized,
{
    let mut records: Vec<StoryRecord> = Vec::with_capacity(limits.size);
    let mut round = 0u32;
    gallery.batch_started(request.insert);

    while records.len() < limits.size && round < limits.max_rounds {
        round = round.saturating_add(1);
        let refresh = request.force_refresh || round > 1;

        let ideas = match service.story_ideas(refresh).await {
            Ok(ideas) => ideas,
            Err(err) => {
                warn!(round, "story idea request failed: {err}");
                continue;
            }
        };

        let mut seen = HashSet::new();
        let mut placeholders: Vec<StoryRecord> = ideas
            .into_iter()
            .filter(|idea| !used.contains(&idea.prompt) && seen.insert(idea.prompt.clone()))
            .map(|idea| StoryRecord::placeholder(ids.next_id(&idea.prompt), idea))
            .collect();

        debug!(round, refresh, fresh = placeholders.len(), "received story ideas");
        if placeholders.is_empty() {
            continue;
        }

        for record in &placeholders {
            gallery.placeholder_created(record, request.insert);
        }

        let mut pending = placeholders
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let prompt = record.prompt.clone();
                async move { (index, service.generate_image(&prompt).await) }
            })
            .collect::<FuturesUnordered<_>>();

        while let Some((index, result)) = pending.next().await {
            let Some(record) = placeholders.get_mut(index) else {
                continue;
            };
            match result {
                Ok(image) if !image.data.is_empty() => {
                    if record.attach_image(image).is_ok() {
                        gallery.placeholder_ready(record);
                    }
                }
                Ok(_) => {
                    warn!(id = %record.id, "image service returned an empty image");
                    record.failed = true;
                    gallery.placeholder_removed(record.id);
                }
                Err(err) => {
                    warn!(id = %record.id, "image generation failed: {err}");
                    record.failed = true;
                    gallery.placeholder_removed(record.id);
                }
            }
        }
        drop(pending);

        for record in placeholders.into_iter().filter(|r| r.is_playable()) {
            if records.len() < limits.size {
                used.insert(&record.prompt);
                records.push(record);
            } else {
                gallery.placeholder_removed(record.id);
            }
        }
    }

    if records.is_empty() {
        warn!(rounds = round, "no stories could be loaded");
        return Err(StoryError::Exhausted { rounds: round });
    }

    info!(stories = records.len(), rounds = round, "story batch loaded");
    Ok(Batch {
        insert: request.insert,
        records,
        rounds: round,
    })
}
