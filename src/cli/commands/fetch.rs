use {
    super::config::ConfigSource,
    clap::Args,
    indicatif::{ProgressBar, ProgressStyle},
    miette::{Context, IntoDiagnostic},
    serde::Serialize,
    std::{fs, path::PathBuf, time::Duration},
    storyreel::{
        HttpStoryService,
        feed::Feed,
        loader::{self, GallerySink, InsertMode, LoadRequest, UsedPrompts},
        types::{IdSource, StoryId, StoryRecord},
    },
};

#[derive(Args)]
pub struct FetchArgs {
    /// Story service base URL
    #[arg(long)]
    url: Option<String>,

    /// Language for story ideas
    #[arg(long)]
    lang: Option<String>,

    /// Ask the service for fresh ideas instead of cached ones
    #[arg(long)]
    refresh: bool,

    /// Number of stories to load
    #[arg(long, short)]
    count: Option<usize>,

    /// Write every illustration to this directory as `<id>.png`
    #[arg(long, value_name = "DIR")]
    images: Option<PathBuf>,

    /// Print the batch as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    source: ConfigSource,
}

#[derive(Serialize)]
struct FetchedStory<'a> {
    id: String,
    prompt: &'a str,
    story: &'a str,
    cached: bool,
    image_bytes: usize,
}

/// Keeps a spinner in sync with the placeholder tiles of a loading batch.
struct SpinnerGallery {
    feed: Feed,
    spinner: ProgressBar,
}

impl SpinnerGallery {
    fn update(&self) {
        let ready = self.feed.tiles().iter().filter(|t| t.is_ready()).count();
        self.spinner
            .set_message(format!("Loading stories... {ready}/{} illustrated", self.feed.len()));
    }
}

impl GallerySink for SpinnerGallery {
    fn batch_started(&mut self, insert: InsertMode) {
        self.feed.batch_started(insert);
    }

    fn placeholder_created(&mut self, record: &StoryRecord, insert: InsertMode) {
        self.feed.placeholder_created(record, insert);
        self.update();
    }

    fn placeholder_ready(&mut self, record: &StoryRecord) {
        self.feed.placeholder_ready(record);
        self.update();
    }

    fn placeholder_removed(&mut self, id: StoryId) {
        self.feed.placeholder_removed(id);
        self.update();
    }
}

pub fn execute(args: FetchArgs) -> miette::Result<()> {
    let mut config = args.source.load()?;
    if let Some(url) = args.url {
        config.service.base_url = url;
    }
    if let Some(lang) = args.lang {
        config.service.language = lang;
    }
    if let Some(count) = args.count {
        config.batch.size = count;
    }

    let service = HttpStoryService::new(&config.service)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .into_diagnostic()?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut gallery = SpinnerGallery {
        feed: Feed::default(),
        spinner,
    };
    let request = if args.refresh {
        LoadRequest::refresh(InsertMode::Append)
    } else {
        LoadRequest::append()
    };

    let result = runtime.block_on(loader::load_batch(
        &service,
        &mut UsedPrompts::default(),
        &mut IdSource::default(),
        &mut gallery,
        request,
        &config.batch,
    ));
    gallery.spinner.finish_and_clear();
    let batch = result.wrap_err("Failed to load stories, please retry.")?;

    if let Some(dir) = &args.images {
        fs::create_dir_all(dir).into_diagnostic()?;
        for record in &batch.records {
            let Some(image) = record.image() else {
                continue;
            };
            let path = dir.join(format!("{}.png", record.id));
            fs::write(&path, &image.data[..])
                .into_diagnostic()
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    if args.json {
        let stories: Vec<_> = batch
            .records
            .iter()
            .map(|r| FetchedStory {
                id: r.id.to_string(),
                prompt: &r.prompt,
                story: &r.story,
                cached: r.is_cached(),
                image_bytes: r.image().map_or(0, |i| i.data.len()),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&stories).into_diagnostic()?);
        return Ok(());
    }

    println!("--- {} stories in {} round(s)", batch.records.len(), batch.rounds);
    for record in &batch.records {
        let cached = if record.is_cached() { " (cached)" } else { "" };
        println!();
        println!("[{}]{cached} {}", record.id, record.prompt);
        println!("    {}", record.story);
    }

    Ok(())
}
