mod tui;

use {
    super::config::ConfigSource,
    clap::Args,
    miette::IntoDiagnostic,
    std::sync::Arc,
    storyreel::{
        Config, HttpStoryService, Player,
        audio::{AudioOutput, SilentOutput},
        config::{EndOfListPolicy, TimingPolicy},
    },
    tracing::info,
    tui::TuiApp,
};

#[derive(Args)]
pub struct PlayArgs {
    /// Story service base URL
    #[arg(long)]
    url: Option<String>,

    /// Language for story ideas
    #[arg(long)]
    lang: Option<String>,

    /// How subtitle highlights are timed
    #[arg(long, value_enum)]
    timing: Option<TimingPolicy>,

    /// What advancing past the last story does
    #[arg(long, value_enum)]
    end_of_list: Option<EndOfListPolicy>,

    /// Do not open an audio device; subtitles still run on the narration's timing
    #[arg(long)]
    mute: bool,

    #[command(flatten)]
    source: ConfigSource,
}

impl PlayArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.service.base_url.clone_from(url);
        }
        if let Some(lang) = &self.lang {
            config.service.language.clone_from(lang);
        }
        if let Some(timing) = self.timing {
            config.playback.timing = timing;
        }
        if let Some(policy) = self.end_of_list {
            config.playback.end_of_list = policy;
        }
    }
}

fn audio_output(mute: bool, config: &Config) -> Box<dyn AudioOutput> {
    #[cfg(feature = "audio")]
    if !mute {
        return Box::new(storyreel::audio::RodioOutput::new());
    }
    #[cfg(not(feature = "audio"))]
    let _ = mute;

    Box::new(SilentOutput::new(config.playback.fallback_duration()))
}

pub fn execute(args: PlayArgs) -> miette::Result<()> {
    let mut config = args.source.load()?;
    args.apply(&mut config);

    let service = Arc::new(HttpStoryService::new(&config.service)?);
    let audio = audio_output(args.mute, &config);
    info!(url = %config.service.base_url, lang = %config.service.language, "starting player");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async move {
        let (player, events) = Player::new(config, service, audio);
        let mut app = TuiApp::new(player, events);
        app.run().await
    })
}
