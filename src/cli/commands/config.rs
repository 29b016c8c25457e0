use {
    clap::Args,
    miette::{Context, IntoDiagnostic, miette},
    std::path::PathBuf,
    storyreel::config::{self, Config},
};

/// `--config` option shared by every command that reads the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigSource {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigSource {
    pub fn path(&self) -> miette::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::default_path().ok_or_else(|| miette!("Could not determine config directory")),
        }
    }

    pub fn load(&self) -> miette::Result<Config> {
        let path = self.path()?;
        Config::load(&path)
            .into_diagnostic()
            .with_context(|| format!("Failed to read config: {}", path.display()))
    }
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    source: ConfigSource,

    /// Write the defaults to the config file if it does not exist yet
    #[arg(long)]
    init: bool,

    /// Only print the config file location
    #[arg(long, conflicts_with = "init")]
    path: bool,
}

pub fn execute(args: ConfigArgs) -> miette::Result<()> {
    let path = args.source.path()?;

    if args.path {
        println!("{}", path.display());
        return Ok(());
    }

    if args.init {
        if path.exists() {
            println!("--- Config already exists: {}", path.display());
        } else {
            Config::default()
                .save(&path)
                .into_diagnostic()
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            println!("--- Wrote default config: {}", path.display());
        }
        return Ok(());
    }

    let config = args.source.load()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
    Ok(())
}
