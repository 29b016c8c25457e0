//! Settings loaded from `config.toml`.

use {
    crate::{error::Result, segment::DEFAULT_MAX_LINE_CHARS},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// How highlight times are derived for the words of a story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TimingPolicy {
    /// Divide the audio duration evenly across all words.
    #[default]
    Uniform,
    /// Use the speech service's per-word timepoints when it returns one per word.
    Timepoints,
}

/// What advancing past the last story does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum EndOfListPolicy {
    /// Stay on the last story.
    #[default]
    Stay,
    /// Jump back to the first playable story.
    Wrap,
}

/// Story server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Server root, without a trailing slash.
    pub base_url: String,
    /// Language asked of the idea endpoint.
    pub language: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            language: "en".to_string(),
            timeout_secs: 90,
        }
    }
}

/// How many stories a load collects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Stories per batch. The batch-tail prefetch rule uses the same number.
    pub size: usize,
    /// Idea requests a load may spend before giving up.
    pub max_rounds: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 4,
            max_rounds: 5,
        }
    }
}

/// Subtitle layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// Latin lines are packed up to this many characters.
    pub max_line_chars: usize,
    /// Lines kept in view at once.
    pub visible_lines: usize,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            max_line_chars: DEFAULT_MAX_LINE_CHARS,
            visible_lines: 2,
        }
    }
}

/// Narration and highlight timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Assumed narration length when the audio duration is unknown.
    pub fallback_duration_ms: u64,
    /// How highlights are timed.
    pub timing: TimingPolicy,
    /// What advancing past the last story does.
    pub end_of_list: EndOfListPolicy,
}

impl PlaybackConfig {
    /// Narration length assumed when the output cannot tell.
    pub const fn fallback_duration(&self) -> Duration {
        Duration::from_millis(self.fallback_duration_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fallback_duration_ms: 15_000,
            timing: TimingPolicy::default(),
            end_of_list: EndOfListPolicy::default(),
        }
    }
}

/// Fullscreen navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Minimum time between two navigations.
    pub cooldown_ms: u64,
    /// Minimum vertical travel, in logical pixels, for a swipe to count.
    pub swipe_threshold: f32,
}

impl NavigationConfig {
    /// The cooldown as a [`Duration`].
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 250,
            swipe_threshold: 50.0,
        }
    }
}

/// Player configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Story server.
    pub service: ServiceConfig,
    /// Batch loading.
    pub batch: BatchConfig,
    /// Subtitle layout.
    pub subtitles: SubtitleConfig,
    /// Narration.
    pub playback: PlaybackConfig,
    /// Navigation.
    pub navigation: NavigationConfig,
}

/// `<config dir>/storyreel`
pub fn config_directory() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("storyreel"))
}

/// Where the config file lives unless `--config` says otherwise.
pub fn default_path() -> Option<PathBuf> {
    config_directory().map(|dir| dir.join("config.toml"))
}

impl Config {
    /// Reads the config at `path`. A missing file yields the defaults, a
    /// malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Reads the config from the default location, if there is one.
    pub fn load_default() -> Result<Self> {
        match default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
