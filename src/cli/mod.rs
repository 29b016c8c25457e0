mod commands;
mod logging;

#[derive(clap::Parser)]
#[command(name = "storyreel", version, about = "Narrated picture stories in the terminal", long_about = None)]
pub struct Cli {
    /// Log filter, e.g. `storyreel=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print help
    Docs,

    /// Browse and play stories in the terminal
    Play(commands::play::PlayArgs),

    /// Load one batch of stories and list it
    Fetch(commands::fetch::FetchArgs),

    /// Show how a story text is split into subtitle lines and words
    Segment(commands::segment::SegmentArgs),

    /// Show or create the configuration file
    Config(commands::config::ConfigArgs),

    /// Generate CLI completions
    Complete(commands::complete::CompleteArgs),
}

pub fn app() -> miette::Result<()> {
    let argv = <Cli as clap::Parser>::parse();

    let sink = match argv.command {
        Commands::Play(_) => logging::Sink::File,
        _ => logging::Sink::Stderr,
    };
    let _log_guard = logging::init(sink, argv.log.as_deref());

    match argv.command {
        Commands::Docs => {
            clap_markdown::print_help_markdown::<Cli>();
            Ok(())
        }

        Commands::Play(args) => commands::play::execute(args),
        Commands::Fetch(args) => commands::fetch::execute(args),
        Commands::Segment(args) => commands::segment::execute(args),
        Commands::Config(args) => commands::config::execute(args),
        Commands::Complete(args) => commands::complete::execute(args),
    }
}
