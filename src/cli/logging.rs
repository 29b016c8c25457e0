use {
    std::{
        fs,
        path::{Path, PathBuf},
    },
    tracing_appender::non_blocking::WorkerGuard,
    tracing_subscriber::EnvFilter,
};

const DEFAULT_FILTER: &str = "storyreel=info";

/// Where log lines go. The player owns the terminal, so it logs to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Stderr,
    File,
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Stderr,
    File(PathBuf),
    /// The terminal is taken and no log file could be opened.
    Discard,
}

fn log_directory() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("storyreel").join("logs"))
}

fn target(sink: Sink, dir: Option<&Path>) -> Target {
    match (sink, dir) {
        (Sink::Stderr, _) => Target::Stderr,
        (Sink::File, Some(dir)) if fs::create_dir_all(dir).is_ok() => Target::File(dir.to_path_buf()),
        (Sink::File, _) => Target::Discard,
    }
}

fn filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output gets flushed.
pub fn init(sink: Sink, directive: Option<&str>) -> Option<WorkerGuard> {
    let filter = filter(directive);

    match target(sink, log_directory().as_deref()) {
        Target::File(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "storyreel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_writer(writer)
                .with_env_filter(filter)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        Target::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
            None
        }
        Target::Discard => None,
    }
}
